use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cogctl::audit::AuditTrail;
use cogctl::cli::{Cli, Commands};
use cogctl::config::CogctlConfig;
use cogctl::controller::{LoopController, LoopOutcome, LoopReport};
use cogctl::domain::{Decision, DecisionKey, DecisionKind, LoopIntent, OperatorDecision, SummaryStatus};
use cogctl::gate::GateDecision;
use cogctl::governor::{ProposalOutcome, SchemaChangeGovernor};
use cogctl::ledger::{ComplexityLedger, ScopeKey};
use cogctl::operator::{JsonlDecisionInbox, OperatorDesk};
use cogctl::registry::InMemoryRegistry;
use cogctl::storage::JsonlStorage;

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cogctl")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("cogctl.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Shared handles every command is built from
struct App {
    config: CogctlConfig,
    storage: Arc<JsonlStorage>,
    audit: AuditTrail,
}

impl App {
    fn open(config: CogctlConfig) -> Result<Self> {
        let storage = Arc::new(
            JsonlStorage::new(&config.storage.data_dir)
                .with_context(|| format!("Failed to open data dir {}", config.storage.data_dir.display()))?,
        );
        let audit = AuditTrail::new(storage.clone());
        Ok(Self { config, storage, audit })
    }

    fn ledger(&self) -> Result<Arc<ComplexityLedger>> {
        let ledger = ComplexityLedger::open(self.storage.clone(), self.config.budget.clone())
            .context("Failed to open complexity ledger")?;
        Ok(Arc::new(ledger))
    }

    fn inbox(&self) -> JsonlDecisionInbox {
        JsonlDecisionInbox::new(self.storage.clone())
    }

    fn desk(&self) -> Arc<OperatorDesk> {
        Arc::new(OperatorDesk::new(Arc::new(self.inbox()), self.audit.clone()))
    }

    fn governor(&self) -> Arc<SchemaChangeGovernor> {
        Arc::new(SchemaChangeGovernor::new(
            self.storage.clone(),
            self.desk(),
            self.config.governor.clone(),
        ))
    }

    fn controller(&self) -> Result<LoopController> {
        let registry = Arc::new(InMemoryRegistry::from_profiles(&self.config.agents));
        Ok(LoopController::new(
            self.ledger()?,
            registry,
            self.audit.clone(),
            self.desk(),
            self.config.controller_settings(),
        ))
    }
}

fn format_ts(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn colored_status(status: SummaryStatus) -> ColoredString {
    match status {
        SummaryStatus::Accepted => status.as_str().green(),
        SummaryStatus::Rejected => status.as_str().red(),
        SummaryStatus::PendingReview => status.as_str().yellow(),
    }
}

async fn run_application(cli: &Cli, app: &App) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run {
            description,
            domain,
            cost,
            loop_id,
            with_proposals,
        } => handle_run_command(app, description, domain, *cost, loop_id.as_deref(), *with_proposals).await,
        Commands::Budget => handle_budget_command(app),
        Commands::Reconcile { scope, remaining } => handle_reconcile_command(app, scope, *remaining),
        Commands::Decide {
            subject,
            loop_id,
            kind,
            approve,
            reject: _,
            reason,
            operator,
        } => handle_decide_command(app, subject, loop_id.as_deref(), kind, *approve, reason.as_deref(), operator),
        Commands::Review { loop_id, timeout_ms } => handle_review_command(app, loop_id, *timeout_ms).await,
        Commands::Propose {
            schema,
            description,
            justification,
            loop_id,
        } => handle_propose_command(app, schema, description, justification, loop_id.as_deref()),
        Commands::Proposals { pending } => handle_proposals_command(app, *pending),
        Commands::Apply { id } => handle_apply_command(app, id).await,
        Commands::ProcessProposals { loop_id, timeout_ms } => {
            handle_process_proposals_command(app, loop_id, *timeout_ms).await
        }
        Commands::Summaries { loop_id } => handle_summaries_command(app, loop_id.as_deref()),
        Commands::Rejections { loop_id } => handle_rejections_command(app, loop_id.as_deref()),
        Commands::Drift => handle_drift_command(app),
    }
}

fn print_report(report: &LoopReport) {
    println!(
        "{} {} ({}, {})",
        "Loop".bold(),
        report.loop_id,
        report.archetype,
        report.summary.domain
    );
    let gate = match &report.gate {
        GateDecision::Proceed => "proceed".green(),
        GateDecision::Escalate { .. } if report.overridden => "escalate (overridden)".yellow(),
        GateDecision::Escalate { .. } => "escalate".yellow(),
        GateDecision::Reject { .. } => "reject".red(),
    };
    println!("  gate:     {}", gate);
    println!("  charged:  {}", report.charged());
    if report.overridden {
        println!(
            "  deducted: global={} archetype={} domain={}",
            report.charged_to(&ScopeKey::Global),
            report.charged_to(&ScopeKey::Archetype(report.archetype)),
            report.charged_to(&ScopeKey::Domain(report.summary.domain.clone()))
        );
    }
    println!("  cost:     {}", report.summary.accumulated_cost);
    println!("  summary:  {}", colored_status(report.summary_status()));
    if let Some(signals) = &report.signals {
        println!(
            "  signals:  trust={:.2} drift={:.2} contradictions={}",
            signals.trust_score, signals.drift_score, signals.unresolved_contradictions
        );
    }
    for artifact in &report.summary.artifacts {
        println!("  artifact: {}", artifact);
    }
    for error in &report.summary.errors {
        println!("  {} {}", "error:".red(), error);
    }
    match &report.outcome {
        LoopOutcome::Accepted => {}
        LoopOutcome::PendingReview => {
            println!("{}", "Summary held for operator review (cogctl review <loop-id>)".yellow());
        }
        LoopOutcome::Rejected { stage, reason } => {
            println!("{} {:?}: {}", "Rejected at".red(), stage, reason);
        }
    }
    for outcome in &report.proposals {
        println!("  proposal {}: {}{}", outcome.proposal_id, outcome.status, outcome_note(outcome));
    }
}

fn outcome_note(outcome: &ProposalOutcome) -> String {
    if let Some(error) = &outcome.error {
        format!(" ({} {})", "failed:".red(), error)
    } else if outcome.settled_elsewhere {
        " (settled by another review)".to_string()
    } else if outcome.timed_out {
        " (no decision in time)".to_string()
    } else {
        String::new()
    }
}

async fn handle_run_command(
    app: &App,
    description: &str,
    domain: &str,
    cost: u64,
    loop_id: Option<&str>,
    with_proposals: bool,
) -> Result<()> {
    let intent = match loop_id {
        Some(id) => LoopIntent::with_id(id, description, domain, cost),
        None => LoopIntent::new(description, domain, cost),
    };
    info!("Running loop {}", intent.loop_id());

    let mut controller = app.controller()?;
    if with_proposals {
        controller = controller.with_governor(app.governor());
    }
    let report = controller.run_loop(&intent).await.context("Loop failed")?;
    print_report(&report);
    Ok(())
}

fn handle_budget_command(app: &App) -> Result<()> {
    let ledger = app.ledger()?;
    let budget = ledger.snapshot()?;
    let halted = ledger.halted_scopes()?;

    let show = |scope: ScopeKey, remaining: i64| {
        let line = format!("  {:<32} {}", scope.to_string(), remaining);
        if halted.contains(&scope) {
            println!("{} {}", line.red(), "(halted)".red());
        } else {
            println!("{}", line);
        }
    };

    println!("{}", "Complexity budget".bold());
    show(ScopeKey::Global, budget.global_remaining);
    let mut archetypes: Vec<_> = budget.per_archetype_remaining.iter().collect();
    archetypes.sort();
    for (archetype, remaining) in archetypes {
        show(ScopeKey::Archetype(*archetype), *remaining);
    }
    let mut domains: Vec<_> = budget.per_domain_remaining.iter().collect();
    domains.sort();
    for (domain, remaining) in domains {
        show(ScopeKey::Domain(domain.clone()), *remaining);
    }
    Ok(())
}

fn handle_reconcile_command(app: &App, scope: &str, remaining: i64) -> Result<()> {
    let scope: ScopeKey = scope.parse().context("Invalid scope")?;
    app.ledger()?.reconcile(&scope, remaining)?;
    println!("{} {} set to {}", "Reconciled:".green(), scope, remaining);
    Ok(())
}

fn handle_decide_command(
    app: &App,
    subject: &str,
    loop_id: Option<&str>,
    kind: &str,
    approve: bool,
    reason: Option<&str>,
    operator: &str,
) -> Result<()> {
    let kind: DecisionKind = kind.parse().context("Invalid decision kind")?;
    let key = DecisionKey::new(loop_id.unwrap_or(subject), subject);
    let verdict = if approve { Decision::Approve } else { Decision::Reject };
    let mut decision = OperatorDecision::new(&key, kind, verdict, operator);
    if let Some(reason) = reason {
        decision = decision.with_justification(reason);
    }
    app.inbox().submit(&decision)?;

    let label = if approve { "Approved:".green() } else { "Rejected:".red() };
    println!("{} {} {} ({})", label, kind, key, decision.id);
    Ok(())
}

async fn handle_review_command(app: &App, loop_id: &str, timeout_ms: u64) -> Result<()> {
    let controller = app.controller()?;
    println!("Waiting up to {}ms for a summary_review decision on {}", timeout_ms, loop_id);
    let summary = controller
        .resolve_pending_review(loop_id, Duration::from_millis(timeout_ms))
        .await?;
    println!("{} {}", loop_id, colored_status(summary.summary_status));
    Ok(())
}

fn handle_propose_command(
    app: &App,
    schema: &str,
    description: &str,
    justification: &str,
    loop_id: Option<&str>,
) -> Result<()> {
    let proposal = app.governor().propose(schema, description, justification, loop_id)?;
    println!("{} {} -> {}", "Proposed:".green(), proposal.proposal_id, proposal.target_schema);
    Ok(())
}

fn handle_proposals_command(app: &App, pending: bool) -> Result<()> {
    let governor = app.governor();
    let proposals = if pending { governor.detect_pending()? } else { governor.list()? };
    if proposals.is_empty() {
        println!("No proposals");
        return Ok(());
    }
    for p in proposals {
        println!(
            "{}  {:<18} {}  {}",
            p.proposal_id,
            p.status.to_string(),
            p.target_schema,
            format_ts(p.created_at)
        );
        println!("    {}", p.description);
    }
    Ok(())
}

async fn handle_apply_command(app: &App, id: &str) -> Result<()> {
    let result = app.governor().apply(id).await?;
    if result.success {
        println!("{} {} ({})", "Applied (simulated):".green(), id, result.status);
    } else {
        println!(
            "{} {}: {}",
            "Simulation failed:".red(),
            id,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    for action in &result.simulated_actions {
        println!("  {:?} {}: {}", action.kind, action.target, action.detail);
    }
    println!("  digest: {}", result.digest);
    Ok(())
}

async fn handle_process_proposals_command(app: &App, loop_id: &str, timeout_ms: Option<u64>) -> Result<()> {
    let governor = app.governor();
    let timeout = timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| governor.policy().decision_timeout());
    let outcomes = governor.process_pending(loop_id, timeout).await?;
    if outcomes.is_empty() {
        println!("No pending proposals");
    }
    for outcome in &outcomes {
        println!("{}: {}{}", outcome.proposal_id, outcome.status, outcome_note(outcome));
    }
    Ok(())
}

fn handle_summaries_command(app: &App, loop_id: Option<&str>) -> Result<()> {
    let summaries = app.audit.summaries()?;
    for s in summaries.iter().filter(|s| loop_id.is_none_or(|id| s.loop_id == id)) {
        println!(
            "{}  {}  {:<16} {:<10} {:<14} cost={}",
            format_ts(s.timestamp_end),
            s.loop_id,
            s.archetype.to_string(),
            s.domain,
            colored_status(s.summary_status),
            s.accumulated_cost
        );
    }
    Ok(())
}

fn handle_rejections_command(app: &App, loop_id: Option<&str>) -> Result<()> {
    let rejections = match loop_id {
        Some(id) => app.audit.rejections_for(id)?,
        None => app.audit.rejections()?,
    };
    for r in rejections {
        println!(
            "{}  {}  {}  {}",
            format_ts(r.timestamp),
            r.loop_id,
            r.validator_id.red(),
            r.reason
        );
    }
    Ok(())
}

fn handle_drift_command(app: &App) -> Result<()> {
    for event in app.audit.drift_events()? {
        println!(
            "{}  {}  {}",
            format_ts(event.timestamp),
            event.agent_key.yellow(),
            event.attempting_context
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = CogctlConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    let app = App::open(config)?;

    // Run the main application logic
    run_application(&cli, &app).await.context("Application failed")?;

    Ok(())
}
