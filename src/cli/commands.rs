//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: run one loop through the control plane with configured agents
//! - budget / reconcile: inspect and repair the complexity ledger
//! - decide: queue an operator decision for a waiting controller
//! - review: finalize a summary held in pending review
//! - propose / proposals / apply / process-proposals: schema change governance
//! - summaries / rejections / drift: read the audit logs

use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

/// cogctl - operator-governed control plane for cognition loops
#[derive(Parser, Debug)]
#[command(name = "cogctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one loop: classify, gate, execute, validate
    Run {
        /// What the loop should do
        #[arg(short, long)]
        description: String,

        /// Declared domain, e.g. coding
        #[arg(long)]
        domain: String,

        /// Estimated complexity cost
        #[arg(long)]
        cost: u64,

        /// Use this loop id instead of generating one
        #[arg(long)]
        loop_id: Option<String>,

        /// Also review pending schema proposals after the loop
        #[arg(long)]
        with_proposals: bool,
    },

    /// Show remaining budget per scope
    Budget,

    /// Set a scope's balance and lift its halt
    Reconcile {
        /// Scope: global, archetype:<name> or domain:<name>
        scope: String,

        /// New remaining balance
        remaining: i64,
    },

    /// Queue an operator decision
    #[command(group(ArgGroup::new("verdict").required(true).args(["approve", "reject"])))]
    Decide {
        /// Loop id or proposal id the decision is about
        subject: String,

        /// Loop the decision is addressed to; defaults to the subject
        #[arg(short, long = "loop")]
        loop_id: Option<String>,

        /// budget_override, summary_review or schema_change
        #[arg(short, long)]
        kind: String,

        #[arg(long)]
        approve: bool,

        #[arg(long)]
        reject: bool,

        /// Justification recorded with the decision
        #[arg(short, long)]
        reason: Option<String>,

        /// Operator id
        #[arg(short, long, default_value = "operator")]
        operator: String,
    },

    /// Wait for a summary_review decision on a loop held in pending review
    Review {
        /// Loop id
        loop_id: String,

        /// How long to wait for the decision
        #[arg(short, long, default_value_t = 30_000)]
        timeout_ms: u64,
    },

    /// File a schema change proposal
    Propose {
        /// Schema the change targets
        #[arg(short, long)]
        schema: String,

        #[arg(short, long)]
        description: String,

        #[arg(short, long)]
        justification: String,

        /// Loop that raised the proposal
        #[arg(long)]
        loop_id: Option<String>,
    },

    /// List schema change proposals
    Proposals {
        /// Only proposals awaiting review
        #[arg(short, long)]
        pending: bool,
    },

    /// Simulate applying an approved proposal
    Apply {
        /// Proposal id
        id: String,
    },

    /// Review every pending proposal on behalf of a loop
    ProcessProposals {
        /// Loop the decisions are addressed to
        #[arg(short, long = "loop")]
        loop_id: String,

        /// Per-proposal wait; defaults to governor.decision-timeout-ms
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },

    /// List loop summaries
    Summaries {
        /// Only summaries for this loop
        #[arg(short, long = "loop")]
        loop_id: Option<String>,
    },

    /// List rejection records
    Rejections {
        /// Only rejections for this loop
        #[arg(short, long = "loop")]
        loop_id: Option<String>,
    },

    /// List drift events
    Drift,
}
