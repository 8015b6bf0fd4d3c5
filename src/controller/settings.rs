//! Controller settings: which agents run for each archetype, plus the policies
//! the controller hands to its gate and validator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::cost::CostTable;
use crate::domain::Archetype;
use crate::gate::GatePolicy;
use crate::validation::ValidationPolicy;

/// Ordered agent keys executed for a loop
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RosterPolicy {
    /// Used for archetypes without their own entry
    pub default: Vec<String>,

    #[serde(rename = "per-archetype")]
    pub per_archetype: HashMap<Archetype, Vec<String>>,
}

impl Default for RosterPolicy {
    fn default() -> Self {
        Self {
            default: vec!["planner".to_string(), "executor".to_string()],
            per_archetype: HashMap::new(),
        }
    }
}

impl RosterPolicy {
    pub fn agents_for(&self, archetype: Archetype) -> &[String] {
        self.per_archetype
            .get(&archetype)
            .map(Vec::as_slice)
            .unwrap_or(self.default.as_slice())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ControllerSettings {
    pub gate: GatePolicy,
    pub validation: ValidationPolicy,
    pub roster: RosterPolicy,
    pub costs: CostTable,
}
