//! Append-only audit trail
//!
//! The four durable logs downstream dashboards read: loop summaries, rejection
//! records, drift events and consumed operator decisions. Every write is also
//! logged, but the JSONL files are the record of truth.

use std::sync::Arc;

use crate::domain::{DriftEvent, LoopSummary, OperatorDecision, OverrideLogEntry, RejectionRecord};
use crate::error::Result;
use crate::storage::{Filter, JsonlStorage, Storage, collections};

/// Writer and reader for the append-only control-plane logs
#[derive(Debug, Clone)]
pub struct AuditTrail {
    storage: Arc<JsonlStorage>,
}

impl AuditTrail {
    pub fn new(storage: Arc<JsonlStorage>) -> Self {
        Self { storage }
    }

    pub fn record_summary(&self, summary: &LoopSummary) -> Result<()> {
        log::info!(
            "Loop {} summary: status={:?} summary_status={} cost={}",
            summary.loop_id,
            summary.status,
            summary.summary_status.as_str(),
            summary.accumulated_cost
        );
        self.storage.append(collections::LOOP_SUMMARIES, summary)
    }

    pub fn record_rejection(&self, record: &RejectionRecord) -> Result<()> {
        log::warn!(
            "Loop {} rejected by {}: {}",
            record.loop_id,
            record.validator_id,
            record.reason
        );
        self.storage.append(collections::REJECTIONS, record)
    }

    pub fn record_drift(&self, event: &DriftEvent) -> Result<()> {
        log::warn!("Drift: {} ({})", event.reason, event.attempting_context);
        self.storage.append(collections::DRIFT_EVENTS, event)
    }

    /// Append a consumed operator decision to the override log
    pub fn record_override(&self, decision: &OperatorDecision) -> Result<OverrideLogEntry> {
        let entry = OverrideLogEntry::from(decision);
        log::info!(
            "Operator {} {:?} {} for {}/{}",
            entry.operator_id,
            entry.decision,
            entry.kind,
            entry.loop_id,
            entry.subject_id
        );
        self.storage.append(collections::OPERATOR_OVERRIDES, &entry)?;
        Ok(entry)
    }

    /// Whether a decision has already been consumed
    pub fn is_consumed(&self, decision_id: &str) -> Result<bool> {
        let hits: Vec<OverrideLogEntry> = self
            .storage
            .query(collections::OPERATOR_OVERRIDES, &[Filter::eq("decision_id", decision_id)])?;
        Ok(!hits.is_empty())
    }

    pub fn summaries(&self) -> Result<Vec<LoopSummary>> {
        self.storage.list(collections::LOOP_SUMMARIES)
    }

    /// Authoritative summary for a loop: the latest entry written for it
    pub fn latest_summary(&self, loop_id: &str) -> Result<Option<LoopSummary>> {
        let entries: Vec<LoopSummary> = self
            .storage
            .query(collections::LOOP_SUMMARIES, &[Filter::eq("loop_id", loop_id)])?;
        Ok(entries.into_iter().last())
    }

    pub fn rejections(&self) -> Result<Vec<RejectionRecord>> {
        self.storage.list(collections::REJECTIONS)
    }

    pub fn rejections_for(&self, loop_id: &str) -> Result<Vec<RejectionRecord>> {
        self.storage
            .query(collections::REJECTIONS, &[Filter::eq("loop_id", loop_id)])
    }

    pub fn drift_events(&self) -> Result<Vec<DriftEvent>> {
        self.storage.list(collections::DRIFT_EVENTS)
    }

    pub fn overrides(&self) -> Result<Vec<OverrideLogEntry>> {
        self.storage.list(collections::OPERATOR_OVERRIDES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Archetype, DecisionKey, DecisionKind, LoopStatus, SummaryStatus};
    use tempfile::TempDir;

    fn trail() -> (AuditTrail, TempDir) {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(JsonlStorage::new(temp.path()).unwrap());
        (AuditTrail::new(storage), temp)
    }

    fn summary(loop_id: &str, status: SummaryStatus) -> LoopSummary {
        LoopSummary {
            id: crate::id::generate_record_id("sum"),
            loop_id: loop_id.to_string(),
            archetype: Archetype::Explore,
            domain: "research".to_string(),
            timestamp_start: 1,
            timestamp_end: 2,
            status: LoopStatus::Success,
            summary_status: status,
            accumulated_cost: 3,
            artifacts: vec![],
            errors: vec![],
        }
    }

    #[test]
    fn test_latest_summary_prefers_newest_entry() {
        let (audit, _temp) = trail();
        let pending = summary("loop-1", SummaryStatus::PendingReview);
        audit.record_summary(&pending).unwrap();
        audit.record_summary(&summary("loop-2", SummaryStatus::Accepted)).unwrap();
        audit
            .record_summary(&pending.superseded(SummaryStatus::Accepted))
            .unwrap();

        let latest = audit.latest_summary("loop-1").unwrap().unwrap();
        assert_eq!(latest.summary_status, SummaryStatus::Accepted);
        assert_eq!(audit.summaries().unwrap().len(), 3);
        assert!(audit.latest_summary("loop-9").unwrap().is_none());
    }

    #[test]
    fn test_rejections_for_loop() {
        let (audit, _temp) = trail();
        audit.record_rejection(&RejectionRecord::new("loop-1", "low trust", "critic")).unwrap();
        audit.record_rejection(&RejectionRecord::new("loop-2", "contradictions", "critic")).unwrap();

        let for_one = audit.rejections_for("loop-1").unwrap();
        assert_eq!(for_one.len(), 1);
        assert_eq!(for_one[0].reason, "low trust");
        assert_eq!(audit.rejections().unwrap().len(), 2);
    }

    #[test]
    fn test_drift_log_is_append_only() {
        let (audit, _temp) = trail();
        audit.record_drift(&DriftEvent::agent_not_found("critic", "loop-1 / validate")).unwrap();
        audit.record_drift(&DriftEvent::agent_not_found("critic", "loop-2 / validate")).unwrap();

        let events = audit.drift_events().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.agent_key == "critic"));
    }

    #[test]
    fn test_override_marks_decision_consumed() {
        let (audit, _temp) = trail();
        let key = DecisionKey::new("loop-1", "loop-1");
        let decision = OperatorDecision::approve(&key, DecisionKind::BudgetOverride, "ops");

        assert!(!audit.is_consumed(&decision.id).unwrap());
        let entry = audit.record_override(&decision).unwrap();

        assert_eq!(entry.decision_id, decision.id);
        assert!(audit.is_consumed(&decision.id).unwrap());
        assert_eq!(audit.overrides().unwrap().len(), 1);
    }
}
