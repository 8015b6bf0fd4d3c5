//! Schema change proposals and their state machine.
//!
//! ```text
//! pending_review ──approve──> approved ──apply──> applied_simulated
//!       │                         └──────apply──> failed_simulation
//!       └────────reject───> rejected
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use super::OperatorDecision;
use crate::error::{CogctlError, Result};
use crate::id::{generate_proposal_id, now_ms};
use crate::storage::HasId;

/// Lifecycle status of a schema change proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    PendingReview,
    Approved,
    Rejected,
    AppliedSimulated,
    FailedSimulation,
}

impl ProposalStatus {
    /// Returns true if no further transition is allowed
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Rejected | ProposalStatus::AppliedSimulated | ProposalStatus::FailedSimulation
        )
    }

    pub fn can_transition_to(&self, next: ProposalStatus) -> bool {
        use ProposalStatus::*;
        matches!(
            (*self, next),
            (PendingReview, Approved)
                | (PendingReview, Rejected)
                | (Approved, AppliedSimulated)
                | (Approved, FailedSimulation)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::PendingReview => "pending_review",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::AppliedSimulated => "applied_simulated",
            ProposalStatus::FailedSimulation => "failed_simulation",
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of step a simulated application would perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Capture the current schema so the change can be reverted
    Snapshot,
    /// Write the changed schema
    Write,
    /// Restore from the snapshot
    Revert,
}

/// One action the governor would take to apply a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedAction {
    pub kind: ActionKind,
    pub target: String,
    pub detail: String,
}

/// A proposed change to one of the system's schemas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaChangeProposal {
    #[serde(rename = "id")]
    pub proposal_id: String,
    pub target_schema: String,
    pub description: String,
    pub justification: String,
    pub status: ProposalStatus,
    pub loop_id_proposed: Option<String>,
    pub loop_id_reviewed: Option<String>,
    pub operator_decision: Option<OperatorDecision>,
    #[serde(default)]
    pub simulated_actions: Vec<SimulatedAction>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SchemaChangeProposal {
    pub fn new(
        target_schema: impl Into<String>,
        description: impl Into<String>,
        justification: impl Into<String>,
        loop_id_proposed: Option<String>,
    ) -> Self {
        let now = now_ms();
        Self {
            proposal_id: generate_proposal_id(),
            target_schema: target_schema.into(),
            description: description.into(),
            justification: justification.into(),
            status: ProposalStatus::PendingReview,
            loop_id_proposed,
            loop_id_reviewed: None,
            operator_decision: None,
            simulated_actions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, refusing anything the state machine does not allow
    pub fn transition(&mut self, next: ProposalStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CogctlError::InvalidTransition(format!(
                "proposal {}: {} -> {}",
                self.proposal_id, self.status, next
            )));
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Update the timestamp
    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }
}

impl HasId for SchemaChangeProposal {
    fn id(&self) -> &str {
        &self.proposal_id
    }
}
