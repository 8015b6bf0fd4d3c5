//! Per-agent execution cost table.
//!
//! Read-only input used to compute a loop's accumulated cost from the agents
//! it actually ran.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cost charged for running each agent
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CostTable {
    /// Cost for agents without an explicit entry
    #[serde(rename = "default-agent-cost")]
    pub default_agent_cost: u64,

    /// Agent key -> cost
    #[serde(rename = "per-agent")]
    pub per_agent: HashMap<String, u64>,
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            default_agent_cost: 1,
            per_agent: HashMap::new(),
        }
    }
}

impl CostTable {
    /// Cost of one run of the given agent
    pub fn cost_of(&self, agent_key: &str) -> u64 {
        self.per_agent
            .get(agent_key)
            .copied()
            .unwrap_or(self.default_agent_cost)
    }

    /// Total cost of running the given agents once each, saturating on overflow
    pub fn accumulate<'a>(&self, agent_keys: impl IntoIterator<Item = &'a str>) -> u64 {
        agent_keys
            .into_iter()
            .fold(0u64, |acc, key| acc.saturating_add(self.cost_of(key)))
    }

    pub fn with_cost(mut self, agent_key: impl Into<String>, cost: u64) -> Self {
        self.per_agent.insert(agent_key.into(), cost);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_of_falls_back_to_default() {
        let table = CostTable::default().with_cost("planner", 4);
        assert_eq!(table.cost_of("planner"), 4);
        assert_eq!(table.cost_of("executor"), 1);
    }

    #[test]
    fn test_accumulate_sums_each_run() {
        let table = CostTable::default().with_cost("planner", 4).with_cost("executor", 5);
        assert_eq!(table.accumulate(["planner", "executor", "planner"]), 13);
        assert_eq!(table.accumulate(Vec::<&str>::new()), 0);
    }

    #[test]
    fn test_accumulate_saturates() {
        let table = CostTable::default().with_cost("huge", u64::MAX);
        assert_eq!(table.accumulate(["huge", "huge"]), u64::MAX);
    }

    #[test]
    fn test_deserialize_kebab_case() {
        let yaml = "default-agent-cost: 2\nper-agent:\n  critic: 3\n";
        let table: CostTable = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(table.cost_of("critic"), 3);
        assert_eq!(table.cost_of("other"), 2);
    }
}
