//! Drift events: agents that failed to resolve from the registry.

use serde::{Deserialize, Serialize};

use crate::id::{generate_record_id, now_ms};
use crate::storage::HasId;

/// Recorded every time an agent lookup fails. Never triggers registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftEvent {
    pub id: String,
    pub agent_key: String,
    pub timestamp: i64,
    /// Where the lookup happened, e.g. `loop loop-1 / execute`
    pub attempting_context: String,
    pub reason: String,
}

impl DriftEvent {
    pub fn agent_not_found(agent_key: &str, attempting_context: impl Into<String>) -> Self {
        Self {
            id: generate_record_id("drift"),
            agent_key: agent_key.to_string(),
            timestamp: now_ms(),
            attempting_context: attempting_context.into(),
            reason: format!("agent '{}' not found in registry", agent_key),
        }
    }
}

impl HasId for DriftEvent {
    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_not_found() {
        let event = DriftEvent::agent_not_found("critic", "loop loop-1 / validate");
        assert!(event.id.starts_with("drift-"));
        assert_eq!(event.agent_key, "critic");
        assert_eq!(event.attempting_context, "loop loop-1 / validate");
        assert!(event.reason.contains("critic"));
    }
}
