//! The agent port: what the controller calls to execute and review a loop.
//!
//! Agent reasoning lives outside this crate; implementations only have to
//! report artifacts and, for validator roles, trust/drift/contradiction signals.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{Archetype, LoopIntent};
use crate::error::{CogctlError, Result};
use crate::validation::{LoopResult, ValidationSignals};

/// What an agent sees when asked to run one step of a loop
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub intent: LoopIntent,
    pub archetype: Archetype,
    /// Zero-based position of this agent in the loop's roster
    pub step: usize,
    /// Artifacts produced by earlier steps
    pub prior_artifacts: Vec<String>,
}

/// What an agent produced for one step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentReport {
    pub artifacts: Vec<String>,
    pub notes: Option<String>,
}

impl AgentReport {
    pub fn with_artifacts(artifacts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            artifacts: artifacts.into_iter().map(Into::into).collect(),
            notes: None,
        }
    }
}

/// An executable agent resolved from the registry
#[async_trait]
pub trait Agent: Send + Sync {
    /// Registry key, e.g. `planner` or `critic`
    fn key(&self) -> &str;

    /// Run one step of a loop
    async fn run(&self, ctx: &AgentContext) -> Result<AgentReport>;

    /// Review a finished loop. Only validator roles implement this.
    async fn review(&self, result: &LoopResult) -> Result<ValidationSignals> {
        Err(CogctlError::Agent(format!(
            "agent '{}' cannot review loop {}",
            self.key(),
            result.loop_id
        )))
    }
}

/// Shared handle returned by registry lookups
pub type AgentHandle = Arc<dyn Agent>;
