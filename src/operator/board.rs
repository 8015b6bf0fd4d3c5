//! In-process decision source.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use super::DecisionSource;
use crate::domain::{DecisionKey, DecisionKind, OperatorDecision};
use crate::error::{CogctlError, Result};

/// Decisions submitted programmatically, with a wakeup per subject
#[derive(Default)]
pub struct DecisionBoard {
    decisions: Mutex<Vec<OperatorDecision>>,
    waiters: Mutex<HashMap<DecisionKey, Arc<Notify>>>,
}

impl DecisionBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn notifier(&self, key: &DecisionKey) -> Arc<Notify> {
        let mut waiters = match self.waiters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        waiters.entry(key.clone()).or_default().clone()
    }

    /// Drop the subject's wakeup once its last waiter is done with it
    fn release(&self, key: &DecisionKey, notify: Arc<Notify>) {
        let mut waiters = match self.waiters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let idle = waiters
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, &notify) && Arc::strong_count(current) == 2);
        if idle {
            waiters.remove(key);
        }
        // Dropped under the lock so the next waiter to release sees the true count
        drop(notify);
    }

    fn waiting_subjects(&self) -> usize {
        match self.waiters.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Post a decision and wake anyone waiting on its subject
    pub fn submit(&self, decision: OperatorDecision) {
        let key = decision.key();
        log::debug!("Decision {} posted for {}", decision.id, key);
        match self.decisions.lock() {
            Ok(mut decisions) => decisions.push(decision),
            Err(poisoned) => poisoned.into_inner().push(decision),
        }
        let notify = self.notifier(&key);
        notify.notify_waiters();
        // Leaves a permit for a waiter that polled just before this submit
        notify.notify_one();
    }
}

#[async_trait]
impl DecisionSource for DecisionBoard {
    async fn poll(&self, key: &DecisionKey, kind: DecisionKind) -> Result<Vec<OperatorDecision>> {
        let decisions = self
            .decisions
            .lock()
            .map_err(|e| CogctlError::Storage(format!("decision board poisoned: {}", e)))?;
        Ok(decisions
            .iter()
            .filter(|d| d.kind == kind && d.loop_id == key.loop_id && d.subject_id == key.subject_id)
            .cloned()
            .collect())
    }

    async fn wait(&self, key: &DecisionKey, timeout: Duration) {
        let notify = self.notifier(key);
        let _ = tokio::time::timeout(timeout, notify.notified()).await;
        self.release(key, notify);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_poll_filters_by_key_and_kind() {
        let board = DecisionBoard::new();
        let key = DecisionKey::new("loop-1", "P1");
        board.submit(OperatorDecision::approve(&key, DecisionKind::SchemaChange, "ops"));
        board.submit(OperatorDecision::approve(
            &DecisionKey::new("loop-1", "P2"),
            DecisionKind::SchemaChange,
            "ops",
        ));

        let found = board.poll(&key, DecisionKind::SchemaChange).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].subject_id, "P1");
        assert!(board.poll(&key, DecisionKind::SummaryReview).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_before_wait_is_not_lost() {
        let board = DecisionBoard::new();
        let key = DecisionKey::new("loop-1", "loop-1");
        board.submit(OperatorDecision::approve(&key, DecisionKind::BudgetOverride, "ops"));

        let started = std::time::Instant::now();
        board.wait(&key, Duration::from_secs(5)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_finished_waits_release_their_subject() {
        let board = DecisionBoard::new();
        for n in 0..5 {
            let key = DecisionKey::new("loop-1", format!("P{}", n));
            board.wait(&key, Duration::from_millis(5)).await;
        }
        assert_eq!(board.waiting_subjects(), 0);

        let key = DecisionKey::new("loop-2", "loop-2");
        board.submit(OperatorDecision::approve(&key, DecisionKind::BudgetOverride, "ops"));
        board.wait(&key, Duration::from_secs(5)).await;
        assert_eq!(board.waiting_subjects(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_waiters_share_one_wakeup() {
        let board = Arc::new(DecisionBoard::new());
        let key = DecisionKey::new("loop-1", "P1");

        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let board = board.clone();
                let key = key.clone();
                tokio::spawn(async move { board.wait(&key, Duration::from_secs(5)).await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(board.waiting_subjects(), 1);

        board.submit(OperatorDecision::approve(&key, DecisionKind::SchemaChange, "ops"));
        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        }
        assert_eq!(board.waiting_subjects(), 0);
    }
}
