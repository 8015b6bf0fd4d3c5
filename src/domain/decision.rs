//! Operator decisions and the override audit log.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CogctlError;
use crate::id::{generate_record_id, now_ms};
use crate::storage::HasId;

/// Verdict carried by an operator decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

/// What an operator decision is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Let one loop bypass an insufficient budget
    BudgetOverride,
    /// Finalize a summary left in pending review
    SummaryReview,
    /// Approve or reject a schema change proposal
    SchemaChange,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::BudgetOverride => "budget_override",
            DecisionKind::SummaryReview => "summary_review",
            DecisionKind::SchemaChange => "schema_change",
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionKind {
    type Err = CogctlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "budget_override" => Ok(DecisionKind::BudgetOverride),
            "summary_review" => Ok(DecisionKind::SummaryReview),
            "schema_change" => Ok(DecisionKind::SchemaChange),
            other => Err(CogctlError::Config(format!("unknown decision kind: {}", other))),
        }
    }
}

/// Scope an operator decision is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    pub loop_id: String,
    /// Loop id or proposal id
    pub subject_id: String,
}

impl DecisionKey {
    pub fn new(loop_id: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            loop_id: loop_id.into(),
            subject_id: subject_id.into(),
        }
    }
}

impl fmt::Display for DecisionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.loop_id, self.subject_id)
    }
}

/// An external operator verdict on a loop or proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorDecision {
    pub id: String,
    pub loop_id: String,
    pub subject_id: String,
    pub kind: DecisionKind,
    pub decision: Decision,
    pub operator_id: String,
    pub justification: String,
    pub timestamp: i64,
}

impl OperatorDecision {
    pub fn new(key: &DecisionKey, kind: DecisionKind, decision: Decision, operator_id: impl Into<String>) -> Self {
        Self {
            id: generate_record_id("dec"),
            loop_id: key.loop_id.clone(),
            subject_id: key.subject_id.clone(),
            kind,
            decision,
            operator_id: operator_id.into(),
            justification: String::new(),
            timestamp: now_ms(),
        }
    }

    pub fn approve(key: &DecisionKey, kind: DecisionKind, operator_id: impl Into<String>) -> Self {
        Self::new(key, kind, Decision::Approve, operator_id)
    }

    pub fn reject(key: &DecisionKey, kind: DecisionKind, operator_id: impl Into<String>) -> Self {
        Self::new(key, kind, Decision::Reject, operator_id)
    }

    pub fn with_justification(mut self, justification: impl Into<String>) -> Self {
        self.justification = justification.into();
        self
    }

    pub fn key(&self) -> DecisionKey {
        DecisionKey::new(&self.loop_id, &self.subject_id)
    }

    pub fn is_approved(&self) -> bool {
        self.decision == Decision::Approve
    }
}

impl HasId for OperatorDecision {
    fn id(&self) -> &str {
        &self.id
    }
}

/// One consumed operator decision, kept so it is never processed twice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideLogEntry {
    pub id: String,
    pub decision_id: String,
    pub loop_id: String,
    pub subject_id: String,
    pub kind: DecisionKind,
    pub decision: Decision,
    pub operator_id: String,
    pub justification: String,
    pub consumed_at: i64,
}

impl From<&OperatorDecision> for OverrideLogEntry {
    fn from(d: &OperatorDecision) -> Self {
        Self {
            id: generate_record_id("ovr"),
            decision_id: d.id.clone(),
            loop_id: d.loop_id.clone(),
            subject_id: d.subject_id.clone(),
            kind: d.kind,
            decision: d.decision,
            operator_id: d.operator_id.clone(),
            justification: d.justification.clone(),
            consumed_at: now_ms(),
        }
    }
}

impl HasId for OverrideLogEntry {
    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_builders() {
        let key = DecisionKey::new("loop-1", "P1");
        let d = OperatorDecision::approve(&key, DecisionKind::SchemaChange, "ops")
            .with_justification("reviewed diff");

        assert!(d.is_approved());
        assert_eq!(d.key(), key);
        assert_eq!(d.justification, "reviewed diff");
        assert!(!OperatorDecision::reject(&key, DecisionKind::SchemaChange, "ops").is_approved());
    }

    #[test]
    fn test_decision_kind_round_trip_through_str() {
        assert_eq!("budget-override".parse::<DecisionKind>().unwrap(), DecisionKind::BudgetOverride);
        assert_eq!(DecisionKind::SummaryReview.to_string(), "summary_review");
        assert!("veto".parse::<DecisionKind>().is_err());
    }

    #[test]
    fn test_override_entry_from_decision() {
        let key = DecisionKey::new("loop-1", "loop-1");
        let d = OperatorDecision::reject(&key, DecisionKind::BudgetOverride, "alice");
        let entry = OverrideLogEntry::from(&d);

        assert_eq!(entry.decision_id, d.id);
        assert_eq!(entry.decision, Decision::Reject);
        assert_eq!(entry.operator_id, "alice");
    }

    #[test]
    fn test_decision_serialization() {
        assert_eq!(serde_json::to_string(&Decision::Approve).unwrap(), "\"approve\"");
        assert_eq!(
            serde_json::to_string(&DecisionKind::BudgetOverride).unwrap(),
            "\"budget_override\""
        );
    }
}
