//! Budget gate
//!
//! Admission check run before any agent executes. Reads the ledger, never
//! writes it: the controller spends only after the gate (or an operator) lets
//! the loop through.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{Archetype, LoopIntent};
use crate::error::Result;
use crate::ledger::{ComplexityLedger, ScopeKey};

/// Validator id recorded on rejections issued at admission
pub const BUDGET_GATE_ID: &str = "budget_gate";

/// How long an escalated loop waits for an operator
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GatePolicy {
    #[serde(rename = "override-timeout-ms")]
    pub override_timeout_ms: u64,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            override_timeout_ms: 30_000,
        }
    }
}

impl GatePolicy {
    pub fn override_timeout(&self) -> Duration {
        Duration::from_millis(self.override_timeout_ms)
    }
}

/// Admission verdict for one loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Every scope can cover the cost
    Proceed,
    /// At least one scope is short; an operator must decide
    Escalate { short: Vec<ScopeKey> },
    /// Refused outright
    Reject { reason: String },
}

impl GateDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateDecision::Proceed => "proceed",
            GateDecision::Escalate { .. } => "escalate",
            GateDecision::Reject { .. } => "reject",
        }
    }
}

pub struct BudgetGate {
    ledger: Arc<ComplexityLedger>,
}

impl BudgetGate {
    pub fn new(ledger: Arc<ComplexityLedger>) -> Self {
        Self { ledger }
    }

    /// Decide whether a loop may start at `cost`
    pub fn evaluate(&self, intent: &LoopIntent, archetype: Archetype, cost: u64) -> Result<GateDecision> {
        let domain = intent.declared_domain();

        let halted = self.ledger.halted_for(archetype, domain)?;
        let decision = if !halted.is_empty() {
            let scopes: Vec<String> = halted.iter().map(ToString::to_string).collect();
            GateDecision::Reject {
                reason: format!("ledger halted for {}; manual reconciliation required", scopes.join(", ")),
            }
        } else {
            let affordability = self.ledger.query(archetype, domain, cost)?;
            if affordability.all_ok() {
                GateDecision::Proceed
            } else {
                GateDecision::Escalate {
                    short: affordability.short_scopes(archetype, domain),
                }
            }
        };

        tracing::info!(
            loop_id = %intent.loop_id(),
            archetype = %archetype,
            domain = %domain,
            cost,
            decision = decision.as_str(),
            "Budget gate evaluated"
        );
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::BudgetPolicy;
    use crate::storage::JsonlStorage;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn gate(policy: BudgetPolicy) -> (BudgetGate, Arc<ComplexityLedger>, TempDir) {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(JsonlStorage::new(temp.path()).unwrap());
        let ledger = Arc::new(ComplexityLedger::open(storage, policy).unwrap());
        (BudgetGate::new(ledger.clone()), ledger, temp)
    }

    fn uniform(amount: i64) -> BudgetPolicy {
        BudgetPolicy {
            global: amount,
            per_archetype: HashMap::new(),
            per_domain: HashMap::new(),
            default_archetype_allotment: amount,
            default_domain_allotment: amount,
        }
    }

    #[test]
    fn test_proceed_when_affordable() {
        let (gate, _ledger, _temp) = gate(BudgetPolicy::default());
        let intent = LoopIntent::new("implement feature X", "coding", 10);
        assert_eq!(gate.evaluate(&intent, Archetype::Implement, 10).unwrap(), GateDecision::Proceed);
    }

    #[test]
    fn test_boundary_cost_proceeds() {
        let (gate, _ledger, _temp) = gate(uniform(100));
        let intent = LoopIntent::new("implement feature X", "coding", 100);
        assert_eq!(gate.evaluate(&intent, Archetype::Implement, 100).unwrap(), GateDecision::Proceed);
    }

    #[test]
    fn test_escalate_names_short_scopes() {
        let mut policy = uniform(1000);
        policy.per_domain.insert("coding".to_string(), 50);
        let (gate, _ledger, _temp) = gate(policy);
        let intent = LoopIntent::new("refactor module Y", "coding", 200);

        match gate.evaluate(&intent, Archetype::Refactor, 200).unwrap() {
            GateDecision::Escalate { short } => {
                assert_eq!(short, vec![ScopeKey::Domain("coding".to_string())]);
            }
            other => panic!("expected escalate, got {:?}", other),
        }
    }

    #[test]
    fn test_reject_when_scope_halted() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("budgets.jsonl"),
            r#"{"id":"complexity_budget","budget":{"global_remaining":1000,"per_archetype_remaining":{},"per_domain_remaining":{"coding":-5}},"updated_at":0}"#,
        )
        .unwrap();
        let storage = Arc::new(JsonlStorage::new(temp.path()).unwrap());
        let ledger = Arc::new(ComplexityLedger::open(storage, BudgetPolicy::default()).unwrap());
        let gate = BudgetGate::new(ledger);

        let intent = LoopIntent::new("implement feature X", "coding", 1);
        match gate.evaluate(&intent, Archetype::Implement, 1).unwrap() {
            GateDecision::Reject { reason } => assert!(reason.contains("domain:coding")),
            other => panic!("expected reject, got {:?}", other),
        }

        let elsewhere = LoopIntent::new("implement feature X", "ops", 1);
        assert_eq!(gate.evaluate(&elsewhere, Archetype::Implement, 1).unwrap(), GateDecision::Proceed);
    }

    #[test]
    fn test_evaluate_does_not_spend() {
        let (gate, ledger, _temp) = gate(uniform(1000));
        let intent = LoopIntent::new("refactor module Y", "coding", 5000);
        let before = ledger.snapshot().unwrap();

        assert!(matches!(
            gate.evaluate(&intent, Archetype::Refactor, 5000).unwrap(),
            GateDecision::Escalate { .. }
        ));
        assert_eq!(ledger.snapshot().unwrap(), before);
    }
}
