//! File-backed decision source.
//!
//! `cogctl decide` appends to the `decisions` collection; a running controller
//! polls it. The file is re-read on every poll since another process writes it.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::DecisionSource;
use crate::domain::{DecisionKey, DecisionKind, OperatorDecision};
use crate::error::Result;
use crate::storage::{Filter, JsonlStorage, Storage, collections};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct JsonlDecisionInbox {
    storage: Arc<JsonlStorage>,
    poll_interval: Duration,
}

impl JsonlDecisionInbox {
    pub fn new(storage: Arc<JsonlStorage>) -> Self {
        Self {
            storage,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Append a decision for a controller to pick up
    pub fn submit(&self, decision: &OperatorDecision) -> Result<()> {
        log::info!("Decision {} queued for {}", decision.id, decision.key());
        self.storage.append(collections::DECISIONS, decision)
    }

    /// Every decision in the inbox, consumed or not
    pub fn all(&self) -> Result<Vec<OperatorDecision>> {
        self.storage.refresh(collections::DECISIONS)?;
        self.storage.list(collections::DECISIONS)
    }
}

#[async_trait]
impl DecisionSource for JsonlDecisionInbox {
    async fn poll(&self, key: &DecisionKey, kind: DecisionKind) -> Result<Vec<OperatorDecision>> {
        self.storage.refresh(collections::DECISIONS)?;
        self.storage.query(
            collections::DECISIONS,
            &[
                Filter::eq("loop_id", &key.loop_id),
                Filter::eq("subject_id", &key.subject_id),
                Filter::eq("kind", kind),
            ],
        )
    }

    async fn wait(&self, _key: &DecisionKey, timeout: Duration) {
        tokio::time::sleep(timeout.min(self.poll_interval)).await;
    }
}
