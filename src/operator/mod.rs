//! Operator decisions
//!
//! Gate overrides, summary reviews and schema changes all wait on an external
//! operator. Decisions arrive through a [`DecisionSource`] keyed by
//! `(loop_id, subject_id)`; the [`OperatorDesk`] takes the first unconsumed
//! decision, records it in the override log and hands it to the caller.
//! A decision is consumed at most once, and a wait that runs out of time is
//! reported as [`DecisionOutcome::TimedOut`] for the caller to treat as a
//! rejection.

mod board;
mod inbox;

pub use board::DecisionBoard;
pub use inbox::JsonlDecisionInbox;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::audit::AuditTrail;
use crate::domain::{DecisionKey, DecisionKind, OperatorDecision};
use crate::error::Result;

/// Where operator decisions come from
#[async_trait]
pub trait DecisionSource: Send + Sync {
    /// Decisions currently available for `key` and `kind`, oldest first.
    /// May include decisions that were already consumed.
    async fn poll(&self, key: &DecisionKey, kind: DecisionKind) -> Result<Vec<OperatorDecision>>;

    /// Block until a decision for `key` may have arrived or `timeout` elapses.
    /// Spurious wakeups are allowed; callers poll again afterwards.
    async fn wait(&self, key: &DecisionKey, timeout: Duration);
}

/// Result of waiting for an operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionOutcome {
    Decided(OperatorDecision),
    TimedOut,
}

impl DecisionOutcome {
    /// True only for an explicit approval; a timeout never approves
    pub fn is_approved(&self) -> bool {
        matches!(self, DecisionOutcome::Decided(d) if d.is_approved())
    }

    pub fn decision(&self) -> Option<&OperatorDecision> {
        match self {
            DecisionOutcome::Decided(d) => Some(d),
            DecisionOutcome::TimedOut => None,
        }
    }
}

/// Consumes operator decisions exactly once and audits each one
pub struct OperatorDesk {
    source: Arc<dyn DecisionSource>,
    audit: AuditTrail,
    consume: Mutex<()>,
}

impl OperatorDesk {
    pub fn new(source: Arc<dyn DecisionSource>, audit: AuditTrail) -> Self {
        Self {
            source,
            audit,
            consume: Mutex::new(()),
        }
    }

    /// Take the next unconsumed decision for `key` without waiting
    pub async fn try_take(&self, key: &DecisionKey, kind: DecisionKind) -> Result<Option<OperatorDecision>> {
        let _guard = self.consume.lock().await;
        for decision in self.source.poll(key, kind).await? {
            if self.audit.is_consumed(&decision.id)? {
                continue;
            }
            self.audit.record_override(&decision)?;
            return Ok(Some(decision));
        }
        Ok(None)
    }

    /// Wait up to `timeout` for a decision on `key`
    pub async fn await_decision(
        &self,
        key: &DecisionKey,
        kind: DecisionKind,
        timeout: Duration,
    ) -> Result<DecisionOutcome> {
        let deadline = Instant::now() + timeout;
        log::info!("Awaiting {} decision for {} (timeout {:?})", kind, key, timeout);
        loop {
            if let Some(decision) = self.try_take(key, kind).await? {
                return Ok(DecisionOutcome::Decided(decision));
            }
            let now = Instant::now();
            if now >= deadline {
                log::warn!("No {} decision for {} within {:?}", kind, key, timeout);
                return Ok(DecisionOutcome::TimedOut);
            }
            self.source.wait(key, deadline - now).await;
        }
    }
}
