//! Agent registry
//!
//! Lookups return `Option<AgentHandle>` so callers must branch on a missing
//! agent. The registry never registers anything on a failed lookup; recording
//! the miss as drift is the caller's job.

mod agent;
mod static_agent;

pub use agent::{Agent, AgentContext, AgentHandle, AgentReport};
pub use static_agent::{AgentProfile, StaticAgent};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Resolves agent keys to executable agents
pub trait AgentRegistry: Send + Sync {
    fn resolve(&self, agent_key: &str) -> Option<AgentHandle>;

    /// Registered keys, sorted
    fn keys(&self) -> Vec<String>;
}

/// Registry backed by an in-process map
#[derive(Default)]
pub struct InMemoryRegistry {
    agents: RwLock<HashMap<String, AgentHandle>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry of static agents from configured profiles
    pub fn from_profiles(profiles: &HashMap<String, AgentProfile>) -> Self {
        let registry = Self::new();
        for (key, profile) in profiles {
            registry.register(Arc::new(StaticAgent::new(key.clone(), profile.clone())));
        }
        registry
    }

    /// Add or replace an agent under its own key
    pub fn register(&self, agent: AgentHandle) {
        let key = agent.key().to_string();
        match self.agents.write() {
            Ok(mut agents) => {
                agents.insert(key, agent);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(key, agent);
            }
        }
    }

    /// Remove an agent, returning it if present
    pub fn deregister(&self, agent_key: &str) -> Option<AgentHandle> {
        self.agents.write().ok()?.remove(agent_key)
    }
}

impl AgentRegistry for InMemoryRegistry {
    fn resolve(&self, agent_key: &str) -> Option<AgentHandle> {
        self.agents.read().ok()?.get(agent_key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .agents
            .read()
            .map(|agents| agents.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_registered_agent() {
        let registry = InMemoryRegistry::new();
        registry.register(Arc::new(StaticAgent::new("planner", AgentProfile::default())));

        let agent = registry.resolve("planner");
        assert!(agent.is_some());
        assert_eq!(agent.unwrap().key(), "planner");
    }

    #[test]
    fn test_resolve_missing_agent_does_not_register() {
        let registry = InMemoryRegistry::new();
        assert!(registry.resolve("critic").is_none());
        assert!(registry.keys().is_empty());
    }

    #[test]
    fn test_from_profiles_and_deregister() {
        let profiles = HashMap::from([
            ("critic".to_string(), AgentProfile::default()),
            ("executor".to_string(), AgentProfile::default()),
        ]);
        let registry = InMemoryRegistry::from_profiles(&profiles);
        assert_eq!(registry.keys(), vec!["critic".to_string(), "executor".to_string()]);

        assert!(registry.deregister("critic").is_some());
        assert!(registry.resolve("critic").is_none());
    }
}
