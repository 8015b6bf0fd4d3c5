//! Loop controller
//!
//! Runs one loop through the control plane:
//! classify -> gate -> (operator override) -> spend -> execute -> validate ->
//! (pending schema proposals). A controller runs one loop at a time; several
//! controllers can share the same ledger, audit trail and registry.

mod report;
mod settings;

pub use report::{LoopOutcome, LoopReport, RejectionStage};
pub use settings::{ControllerSettings, RosterPolicy};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::audit::AuditTrail;
use crate::classifier;
use crate::domain::{
    Archetype, DecisionKey, DecisionKind, DriftEvent, LoopIntent, LoopStatus, LoopSummary, RejectionRecord,
    SummaryStatus,
};
use crate::error::{CogctlError, Result};
use crate::gate::{BUDGET_GATE_ID, BudgetGate, GateDecision};
use crate::governor::SchemaChangeGovernor;
use crate::id::{generate_record_id, now_ms};
use crate::ledger::{ComplexityLedger, ScopeKey, SpendRecord};
use crate::operator::{DecisionOutcome, OperatorDesk};
use crate::registry::{AgentContext, AgentRegistry};
use crate::validation::{GatheredSignals, LoopResult, SummaryValidator};

/// Validator id recorded when an operator rejects a summary under review
pub const OPERATOR_REVIEW_ID: &str = "operator";

/// Gate decisions followed after a lost spend race before giving up
const ADMISSION_ATTEMPTS: usize = 3;

/// How a loop came out of the gate
enum Admission {
    Charged {
        /// Final gate decision, after any re-evaluation
        gate: GateDecision,
        record: SpendRecord,
        overridden: bool,
    },
    Refused(LoopReport),
}

/// What execution produced before validation
struct Execution {
    status: LoopStatus,
    artifacts: Vec<String>,
    errors: Vec<String>,
    executed: Vec<String>,
}

pub struct LoopController {
    ledger: Arc<ComplexityLedger>,
    gate: BudgetGate,
    registry: Arc<dyn AgentRegistry>,
    validator: SummaryValidator,
    audit: AuditTrail,
    desk: Arc<OperatorDesk>,
    governor: Option<Arc<SchemaChangeGovernor>>,
    settings: ControllerSettings,
    running: Mutex<()>,
}

impl LoopController {
    pub fn new(
        ledger: Arc<ComplexityLedger>,
        registry: Arc<dyn AgentRegistry>,
        audit: AuditTrail,
        desk: Arc<OperatorDesk>,
        settings: ControllerSettings,
    ) -> Self {
        let validator = SummaryValidator::new(registry.clone(), audit.clone(), settings.validation.clone());
        Self {
            gate: BudgetGate::new(ledger.clone()),
            ledger,
            registry,
            validator,
            audit,
            desk,
            governor: None,
            settings,
            running: Mutex::new(()),
        }
    }

    /// Review pending schema proposals at the end of every admitted loop
    pub fn with_governor(mut self, governor: Arc<SchemaChangeGovernor>) -> Self {
        self.governor = Some(governor);
        self
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Run one loop to a final or pending-review summary
    pub async fn run_loop(&self, intent: &LoopIntent) -> Result<LoopReport> {
        let _running = self.running.lock().await;
        let started = now_ms();
        let loop_id = intent.loop_id();
        let domain = intent.declared_domain();
        let cost = intent.estimated_cost();

        let archetype = classifier::classify(intent);
        log::info!(
            "Loop {} classified as {} (domain={}, cost={})",
            loop_id,
            archetype,
            domain,
            cost
        );

        let gate = self.gate.evaluate(intent, archetype, cost)?;
        let (gate, admitted, overridden) = match self.admit(intent, archetype, started, gate).await? {
            Admission::Charged {
                gate,
                record,
                overridden,
            } => (gate, record, overridden),
            Admission::Refused(report) => return Ok(report),
        };
        let mut spends = vec![admitted];

        let mut execution = self.execute(intent, archetype).await;
        let accumulated_cost = self
            .settings
            .costs
            .accumulate(execution.executed.iter().map(String::as_str));
        if let Some(record) = self.settle_overrun(loop_id, archetype, domain, cost, accumulated_cost, &mut execution.errors)? {
            spends.push(record);
        }

        let result = LoopResult {
            loop_id: loop_id.to_string(),
            archetype,
            domain: domain.to_string(),
            status: execution.status,
            accumulated_cost,
            artifacts: execution.artifacts,
            errors: execution.errors,
        };
        let gathered = if result.succeeded() {
            self.validator.gather_signals(&result).await
        } else {
            GatheredSignals::default()
        };
        let verdict = self.validator.evaluate(&result, &gathered)?;

        let summary = LoopSummary {
            id: generate_record_id("sum"),
            loop_id: loop_id.to_string(),
            archetype,
            domain: domain.to_string(),
            timestamp_start: started,
            timestamp_end: now_ms(),
            status: result.status,
            summary_status: verdict.status,
            accumulated_cost,
            artifacts: result.artifacts,
            errors: result.errors,
        };
        self.audit.record_summary(&summary)?;

        let outcome = match verdict.status {
            SummaryStatus::Accepted => LoopOutcome::Accepted,
            SummaryStatus::PendingReview => LoopOutcome::PendingReview,
            SummaryStatus::Rejected => LoopOutcome::Rejected {
                stage: RejectionStage::Validation,
                reason: verdict.reason.clone().unwrap_or_default(),
            },
        };
        if verdict.needs_operator_attention() {
            log::warn!(
                "Loop {} needs operator attention: {} ({})",
                loop_id,
                verdict.status.as_str(),
                verdict.reason.as_deref().unwrap_or("no reason")
            );
        }

        let proposals = match &self.governor {
            Some(governor) => {
                governor
                    .process_pending(loop_id, governor.policy().decision_timeout())
                    .await?
            }
            None => Vec::new(),
        };

        Ok(LoopReport {
            loop_id: loop_id.to_string(),
            archetype,
            gate,
            overridden,
            outcome,
            summary,
            verdict: Some(verdict),
            signals: Some(gathered.signals),
            spends,
            proposals,
        })
    }

    /// Charge the estimate according to the gate's decision.
    ///
    /// A loop the gate let through can still lose its budget to a concurrent
    /// spend; the gate is then consulted again, which escalates it.
    async fn admit(
        &self,
        intent: &LoopIntent,
        archetype: Archetype,
        started: i64,
        mut gate: GateDecision,
    ) -> Result<Admission> {
        let loop_id = intent.loop_id();
        let domain = intent.declared_domain();
        let cost = intent.estimated_cost();

        for _ in 0..ADMISSION_ATTEMPTS {
            match gate.clone() {
                GateDecision::Proceed => match self.ledger.spend(loop_id, archetype, domain, cost) {
                    Ok(record) => {
                        return Ok(Admission::Charged {
                            gate,
                            record,
                            overridden: false,
                        });
                    }
                    Err(CogctlError::BudgetExceeded(reason)) => {
                        log::warn!("Loop {} lost its budget before spending ({}); re-evaluating", loop_id, reason);
                        gate = self.gate.evaluate(intent, archetype, cost)?;
                    }
                    Err(e @ CogctlError::LedgerHalted(_)) => {
                        return self
                            .reject_at_gate(intent, archetype, started, gate, e.to_string())
                            .map(Admission::Refused);
                    }
                    Err(e) => return Err(e),
                },
                GateDecision::Escalate { short } => {
                    return self.escalate(intent, archetype, started, gate, &short).await;
                }
                GateDecision::Reject { reason } => {
                    return self
                        .reject_at_gate(intent, archetype, started, gate, reason)
                        .map(Admission::Refused);
                }
            }
        }

        let reason = format!(
            "budget kept changing during admission; gave up after {} attempts",
            ADMISSION_ATTEMPTS
        );
        self.reject_at_gate(intent, archetype, started, gate, reason)
            .map(Admission::Refused)
    }

    /// Ask an operator to override the budget for a loop short on `short`
    async fn escalate(
        &self,
        intent: &LoopIntent,
        archetype: Archetype,
        started: i64,
        gate: GateDecision,
        short: &[ScopeKey],
    ) -> Result<Admission> {
        let loop_id = intent.loop_id();
        let cost = intent.estimated_cost();
        let scopes: Vec<String> = short.iter().map(ToString::to_string).collect();
        log::warn!(
            "Loop {} needs {} but is short on {}; escalating to operator",
            loop_id,
            cost,
            scopes.join(", ")
        );

        let key = DecisionKey::new(loop_id, loop_id);
        let timeout = self.settings.gate.override_timeout();
        let reason = match self
            .desk
            .await_decision(&key, DecisionKind::BudgetOverride, timeout)
            .await?
        {
            DecisionOutcome::Decided(d) if d.is_approved() => {
                return match self
                    .ledger
                    .spend_overridden(loop_id, archetype, intent.declared_domain(), cost)
                {
                    Ok(record) => Ok(Admission::Charged {
                        gate,
                        record,
                        overridden: true,
                    }),
                    Err(e @ CogctlError::LedgerHalted(_)) => self
                        .reject_at_gate(intent, archetype, started, gate, e.to_string())
                        .map(Admission::Refused),
                    Err(e) => Err(e),
                };
            }
            DecisionOutcome::Decided(d) => format!(
                "budget override rejected by {} (short on {}){}",
                d.operator_id,
                scopes.join(", "),
                justification_suffix(&d.justification)
            ),
            DecisionOutcome::TimedOut => format!(
                "no budget override decision within {}ms (short on {})",
                timeout.as_millis(),
                scopes.join(", ")
            ),
        };
        self.reject_at_gate(intent, archetype, started, gate, reason)
            .map(Admission::Refused)
    }

    /// Run the roster for `archetype` in order, stopping at the first failure
    async fn execute(&self, intent: &LoopIntent, archetype: Archetype) -> Execution {
        let mut execution = Execution {
            status: LoopStatus::Success,
            artifacts: Vec::new(),
            errors: Vec::new(),
            executed: Vec::new(),
        };

        for (step, key) in self.settings.roster.agents_for(archetype).iter().enumerate() {
            let Some(agent) = self.registry.resolve(key) else {
                let context = format!("loop {} / execute step {}", intent.loop_id(), step);
                let event = DriftEvent::agent_not_found(key, context);
                execution.errors.push(event.reason.clone());
                if let Err(e) = self.audit.record_drift(&event) {
                    log::error!("Failed to record drift for {}: {}", key, e);
                }
                execution.status = LoopStatus::Failure;
                break;
            };

            let ctx = AgentContext {
                intent: intent.clone(),
                archetype,
                step,
                prior_artifacts: execution.artifacts.clone(),
            };
            execution.executed.push(key.clone());
            match agent.run(&ctx).await {
                Ok(report) => {
                    log::debug!(
                        "Loop {} step {} ({}) produced {} artifacts",
                        intent.loop_id(),
                        step,
                        key,
                        report.artifacts.len()
                    );
                    execution.artifacts.extend(report.artifacts);
                }
                Err(e) => {
                    log::warn!("Loop {} step {} ({}) failed: {}", intent.loop_id(), step, key, e);
                    execution.errors.push(e.to_string());
                    execution.status = LoopStatus::Failure;
                    break;
                }
            }
        }
        execution
    }

    /// Charge whatever the agents cost beyond the admitted estimate, if the
    /// budget allows. Never refunds.
    fn settle_overrun(
        &self,
        loop_id: &str,
        archetype: Archetype,
        domain: &str,
        estimated: u64,
        accumulated: u64,
        errors: &mut Vec<String>,
    ) -> Result<Option<SpendRecord>> {
        if accumulated <= estimated {
            return Ok(None);
        }
        let overrun = accumulated - estimated;
        match self.ledger.spend(loop_id, archetype, domain, overrun) {
            Ok(record) => Ok(Some(record)),
            Err(e @ (CogctlError::BudgetExceeded(_) | CogctlError::LedgerHalted(_))) => {
                log::warn!("Loop {} overran its estimate by {}: {}", loop_id, overrun, e);
                errors.push(format!("budget overrun of {} not charged", overrun));
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn reject_at_gate(
        &self,
        intent: &LoopIntent,
        archetype: Archetype,
        started: i64,
        gate: GateDecision,
        reason: String,
    ) -> Result<LoopReport> {
        let loop_id = intent.loop_id();
        self.audit
            .record_rejection(&RejectionRecord::new(loop_id, reason.clone(), BUDGET_GATE_ID))?;

        let summary = LoopSummary {
            id: generate_record_id("sum"),
            loop_id: loop_id.to_string(),
            archetype,
            domain: intent.declared_domain().to_string(),
            timestamp_start: started,
            timestamp_end: now_ms(),
            status: LoopStatus::Rejected,
            summary_status: SummaryStatus::Rejected,
            accumulated_cost: 0,
            artifacts: Vec::new(),
            errors: vec![reason.clone()],
        };
        self.audit.record_summary(&summary)?;

        Ok(LoopReport {
            loop_id: loop_id.to_string(),
            archetype,
            gate,
            overridden: false,
            outcome: LoopOutcome::Rejected {
                stage: RejectionStage::Gate,
                reason,
            },
            summary,
            verdict: None,
            signals: None,
            spends: Vec::new(),
            proposals: Vec::new(),
        })
    }

    /// Wait for an operator to finalize a summary held in pending review.
    ///
    /// Approval appends an accepted summary; rejection or timeout appends a
    /// rejected one with a rejection record.
    pub async fn resolve_pending_review(&self, loop_id: &str, timeout: Duration) -> Result<LoopSummary> {
        let current = self
            .audit
            .latest_summary(loop_id)?
            .ok_or_else(|| CogctlError::InvalidTransition(format!("no summary recorded for loop {}", loop_id)))?;
        match current.summary_status {
            SummaryStatus::PendingReview => {}
            SummaryStatus::Rejected => return Err(CogctlError::SummaryRejected(loop_id.to_string())),
            SummaryStatus::Accepted => {
                return Err(CogctlError::InvalidTransition(format!(
                    "summary for loop {} is already accepted",
                    loop_id
                )));
            }
        }

        let key = DecisionKey::new(loop_id, loop_id);
        let outcome = self
            .desk
            .await_decision(&key, DecisionKind::SummaryReview, timeout)
            .await?;

        let finalized = match outcome {
            DecisionOutcome::Decided(d) if d.is_approved() => current.superseded(SummaryStatus::Accepted),
            other => {
                let reason = match other.decision() {
                    Some(d) => format!(
                        "summary rejected by {}{}",
                        d.operator_id,
                        justification_suffix(&d.justification)
                    ),
                    None => format!("no summary review decision within {}ms", timeout.as_millis()),
                };
                self.audit
                    .record_rejection(&RejectionRecord::new(loop_id, reason, OPERATOR_REVIEW_ID))?;
                current.superseded(SummaryStatus::Rejected)
            }
        };
        self.audit.record_summary(&finalized)?;
        Ok(finalized)
    }
}

fn justification_suffix(justification: &str) -> String {
    if justification.is_empty() {
        String::new()
    } else {
        format!(": {}", justification)
    }
}
