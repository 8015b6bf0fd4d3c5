//! What a loop run returns to its caller.

use crate::domain::{Archetype, LoopSummary, SummaryStatus};
use crate::gate::GateDecision;
use crate::governor::ProposalOutcome;
use crate::ledger::{ScopeKey, SpendRecord};
use crate::validation::{SummaryVerdict, ValidationSignals};

/// Where a rejected loop was stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionStage {
    /// Refused admission; never executed and never charged
    Gate,
    /// Executed, but the summary was rejected
    Validation,
}

/// Final disposition of one loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    Accepted,
    /// Waiting on an operator to finalize the summary
    PendingReview,
    Rejected { stage: RejectionStage, reason: String },
}

#[derive(Debug, Clone)]
pub struct LoopReport {
    pub loop_id: String,
    pub archetype: Archetype,
    pub gate: GateDecision,
    /// An operator approved a budget override for this loop
    pub overridden: bool,
    pub outcome: LoopOutcome,
    pub summary: LoopSummary,
    /// Absent when the loop never got past the gate
    pub verdict: Option<SummaryVerdict>,
    pub signals: Option<ValidationSignals>,
    pub spends: Vec<SpendRecord>,
    pub proposals: Vec<ProposalOutcome>,
}

impl LoopReport {
    pub fn summary_status(&self) -> SummaryStatus {
        self.summary.summary_status
    }

    /// Rejected and pending loops are surfaced to operators
    pub fn needs_operator_attention(&self) -> bool {
        !matches!(self.outcome, LoopOutcome::Accepted)
    }

    /// Total cost charged for this loop. An overridden spend floors scopes at
    /// zero, so a scope may have lost less; see `charged_to`.
    pub fn charged(&self) -> u64 {
        self.spends.iter().map(|s| s.cost).sum()
    }

    /// What this loop actually took from one budget scope
    pub fn charged_to(&self, scope: &ScopeKey) -> u64 {
        self.spends.iter().map(|s| s.deducted_from(scope)).sum()
    }
}
