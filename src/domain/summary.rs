//! Loop summaries and rejection records.
//!
//! Both live in append-only logs. A summary in `pending_review` can be
//! superseded by a later entry for the same loop once an operator decides;
//! the latest entry per loop is authoritative.

use serde::{Deserialize, Serialize};

use super::Archetype;
use crate::id::{generate_record_id, now_ms};
use crate::storage::HasId;

/// Execution outcome of a loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    /// All agent steps ran
    Success,
    /// An agent step failed or could not be resolved
    Failure,
    /// Terminated at the budget gate; never executed
    Rejected,
}

/// Acceptance status assigned by the summary validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    Accepted,
    Rejected,
    /// No authoritative verdict could be obtained; awaiting an operator
    PendingReview,
}

impl SummaryStatus {
    /// Returns true once the status can no longer change
    pub fn is_final(&self) -> bool {
        matches!(self, SummaryStatus::Accepted | SummaryStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStatus::Accepted => "accepted",
            SummaryStatus::Rejected => "rejected",
            SummaryStatus::PendingReview => "pending_review",
        }
    }
}

/// One loop's completion record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSummary {
    pub id: String,
    pub loop_id: String,
    pub archetype: Archetype,
    pub domain: String,
    pub timestamp_start: i64,
    pub timestamp_end: i64,
    pub status: LoopStatus,
    pub summary_status: SummaryStatus,
    pub accumulated_cost: u64,
    pub artifacts: Vec<String>,
    pub errors: Vec<String>,
}

impl LoopSummary {
    /// Copy of this summary finalized with a new status, stamped now
    pub fn superseded(&self, summary_status: SummaryStatus) -> Self {
        Self {
            id: generate_record_id("sum"),
            summary_status,
            timestamp_end: now_ms(),
            ..self.clone()
        }
    }
}

impl HasId for LoopSummary {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Audit entry written whenever a loop is rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub id: String,
    pub loop_id: String,
    pub timestamp: i64,
    pub reason: String,
    /// Which validator (agent key, "budget_gate", "operator") rejected it
    pub validator_id: String,
}

impl RejectionRecord {
    pub fn new(loop_id: &str, reason: impl Into<String>, validator_id: impl Into<String>) -> Self {
        Self {
            id: generate_record_id("rej"),
            loop_id: loop_id.to_string(),
            timestamp: now_ms(),
            reason: reason.into(),
            validator_id: validator_id.into(),
        }
    }
}

impl HasId for RejectionRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(status: SummaryStatus) -> LoopSummary {
        LoopSummary {
            id: "sum-1".to_string(),
            loop_id: "loop-1".to_string(),
            archetype: Archetype::Implement,
            domain: "coding".to_string(),
            timestamp_start: 1,
            timestamp_end: 2,
            status: LoopStatus::Success,
            summary_status: status,
            accumulated_cost: 10,
            artifacts: vec!["diff.patch".to_string()],
            errors: vec![],
        }
    }

    #[test]
    fn test_summary_status_is_final() {
        assert!(SummaryStatus::Accepted.is_final());
        assert!(SummaryStatus::Rejected.is_final());
        assert!(!SummaryStatus::PendingReview.is_final());
    }

    #[test]
    fn test_summary_status_serialization() {
        assert_eq!(
            serde_json::to_string(&SummaryStatus::PendingReview).unwrap(),
            "\"pending_review\""
        );
        assert_eq!(serde_json::to_string(&LoopStatus::Failure).unwrap(), "\"failure\"");
    }

    #[test]
    fn test_superseded_keeps_loop_fields() {
        let original = summary(SummaryStatus::PendingReview);
        let finalized = original.superseded(SummaryStatus::Accepted);

        assert_ne!(finalized.id, original.id);
        assert_eq!(finalized.loop_id, original.loop_id);
        assert_eq!(finalized.accumulated_cost, 10);
        assert_eq!(finalized.summary_status, SummaryStatus::Accepted);
    }

    #[test]
    fn test_rejection_record_new() {
        let record = RejectionRecord::new("loop-1", "trust 0.2 below minimum 0.6", "critic");
        assert!(record.id.starts_with("rej-"));
        assert_eq!(record.loop_id, "loop-1");
        assert_eq!(record.validator_id, "critic");
    }
}
