//! Agents with canned behavior, built from configuration profiles.
//!
//! Used by the CLI for dry runs of the control plane: each configured agent
//! reports fixed artifacts and, when asked to review, fixed signals.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::agent::{Agent, AgentContext, AgentReport};
use crate::error::{CogctlError, Result};
use crate::validation::{LoopResult, ValidationSignals};

/// Configured behavior of a static agent
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentProfile {
    /// Artifacts reported on every run
    pub artifacts: Vec<String>,

    /// Fail every run with this message
    pub fail: Option<String>,

    /// Signals returned when reviewing a loop
    #[serde(rename = "trust-score")]
    pub trust_score: f64,

    #[serde(rename = "drift-score")]
    pub drift_score: f64,

    #[serde(rename = "unresolved-contradictions")]
    pub unresolved_contradictions: u32,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            artifacts: Vec::new(),
            fail: None,
            trust_score: 1.0,
            drift_score: 0.0,
            unresolved_contradictions: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StaticAgent {
    key: String,
    profile: AgentProfile,
}

impl StaticAgent {
    pub fn new(key: impl Into<String>, profile: AgentProfile) -> Self {
        Self {
            key: key.into(),
            profile,
        }
    }
}

#[async_trait]
impl Agent for StaticAgent {
    fn key(&self) -> &str {
        &self.key
    }

    async fn run(&self, ctx: &AgentContext) -> Result<AgentReport> {
        if let Some(message) = &self.profile.fail {
            return Err(CogctlError::Agent(format!(
                "{} failed on loop {}: {}",
                self.key,
                ctx.intent.loop_id(),
                message
            )));
        }
        Ok(AgentReport::with_artifacts(self.profile.artifacts.iter().cloned()))
    }

    async fn review(&self, _result: &LoopResult) -> Result<ValidationSignals> {
        Ok(ValidationSignals {
            trust_score: self.profile.trust_score,
            drift_score: self.profile.drift_score,
            unresolved_contradictions: self.profile.unresolved_contradictions,
        })
    }
}
