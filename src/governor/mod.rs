//! Schema change governor
//!
//! Proposals move `pending_review -> approved | rejected`, and approved
//! proposals move on to `applied_simulated` or `failed_simulation`. Each
//! proposal has its own async lock, so several proposals can be reviewed and
//! applied at once while transitions on any one of them stay serialized.
//! Application is always simulated.

mod simulate;

pub use simulate::{ApplyResult, content_digest, is_known_schema, plan_actions};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{Decision, DecisionKey, DecisionKind, OperatorDecision, ProposalStatus, SchemaChangeProposal};
use crate::error::{CogctlError, Result};
use crate::operator::{DecisionOutcome, OperatorDesk};
use crate::storage::{Filter, JsonlStorage, Storage, collections};

/// Schema catalog and review timing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GovernorPolicy {
    /// Glob patterns of schemas that may be changed; empty admits any
    #[serde(rename = "known-schemas")]
    pub known_schemas: Vec<String>,

    /// How long `process_pending` waits for each decision
    #[serde(rename = "decision-timeout-ms")]
    pub decision_timeout_ms: u64,
}

impl Default for GovernorPolicy {
    fn default() -> Self {
        Self {
            known_schemas: Vec::new(),
            decision_timeout_ms: 30_000,
        }
    }
}

impl GovernorPolicy {
    pub fn decision_timeout(&self) -> Duration {
        Duration::from_millis(self.decision_timeout_ms)
    }
}

/// What happened to one proposal during `process_pending`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalOutcome {
    pub proposal_id: String,
    pub status: ProposalStatus,
    /// Set when this review approved and applied the proposal
    pub applied: Option<ApplyResult>,
    pub timed_out: bool,
    /// Another reviewer moved the proposal out of `pending_review` first;
    /// `status` is where they left it
    pub settled_elsewhere: bool,
    /// Review failed part way; `status` is the last state read back
    pub error: Option<String>,
}

pub struct SchemaChangeGovernor {
    storage: Arc<JsonlStorage>,
    desk: Arc<OperatorDesk>,
    policy: GovernorPolicy,
}

impl SchemaChangeGovernor {
    pub fn new(storage: Arc<JsonlStorage>, desk: Arc<OperatorDesk>, policy: GovernorPolicy) -> Self {
        Self { storage, desk, policy }
    }

    pub fn policy(&self) -> &GovernorPolicy {
        &self.policy
    }

    /// Change one proposal as it is on disk, under the collection's file lock.
    /// Nothing is written when `f` fails.
    fn update_proposal<R>(
        &self,
        proposal_id: &str,
        f: impl FnOnce(&mut SchemaChangeProposal) -> Result<R>,
    ) -> Result<R> {
        self.storage.modify(
            collections::SCHEMA_PROPOSALS,
            proposal_id,
            |slot: &mut Option<SchemaChangeProposal>| {
                let proposal = slot
                    .as_mut()
                    .ok_or_else(|| CogctlError::ProposalNotFound(proposal_id.to_string()))?;
                f(proposal)
            },
        )
    }

    fn mark_reviewed(proposal: &mut SchemaChangeProposal, decision: &OperatorDecision) -> Result<()> {
        let next = match decision.decision {
            Decision::Approve => ProposalStatus::Approved,
            Decision::Reject => ProposalStatus::Rejected,
        };
        proposal.transition(next)?;
        proposal.loop_id_reviewed = Some(decision.loop_id.clone());
        proposal.operator_decision = Some(decision.clone());
        Ok(())
    }

    /// File a new proposal in `pending_review`
    pub fn propose(
        &self,
        target_schema: &str,
        description: &str,
        justification: &str,
        loop_id: Option<&str>,
    ) -> Result<SchemaChangeProposal> {
        let proposal = SchemaChangeProposal::new(
            target_schema,
            description,
            justification,
            loop_id.map(str::to_string),
        );
        self.storage.append(collections::SCHEMA_PROPOSALS, &proposal)?;
        tracing::info!(
            proposal_id = %proposal.proposal_id,
            target_schema = %proposal.target_schema,
            "Schema change proposed"
        );
        Ok(proposal)
    }

    pub fn get(&self, proposal_id: &str) -> Result<SchemaChangeProposal> {
        self.storage.refresh(collections::SCHEMA_PROPOSALS)?;
        self.storage
            .get(collections::SCHEMA_PROPOSALS, proposal_id)?
            .ok_or_else(|| CogctlError::ProposalNotFound(proposal_id.to_string()))
    }

    pub fn list(&self) -> Result<Vec<SchemaChangeProposal>> {
        self.storage.refresh(collections::SCHEMA_PROPOSALS)?;
        self.storage.list(collections::SCHEMA_PROPOSALS)
    }

    /// Proposals awaiting review, oldest first. Read-only.
    pub fn detect_pending(&self) -> Result<Vec<SchemaChangeProposal>> {
        self.storage.refresh(collections::SCHEMA_PROPOSALS)?;
        let mut pending: Vec<SchemaChangeProposal> = self.storage.query(
            collections::SCHEMA_PROPOSALS,
            &[Filter::eq("status", ProposalStatus::PendingReview)],
        )?;
        pending.sort_by_key(|p| p.created_at);
        Ok(pending)
    }

    /// Wait up to `timeout` for an operator decision on a proposal
    pub async fn await_decision(&self, loop_id: &str, proposal_id: &str, timeout: Duration) -> Result<DecisionOutcome> {
        self.get(proposal_id)?;
        let key = DecisionKey::new(loop_id, proposal_id);
        self.desk
            .await_decision(&key, DecisionKind::SchemaChange, timeout)
            .await
    }

    /// Move a pending proposal to `approved` or `rejected`
    pub async fn record_decision(&self, proposal_id: &str, decision: &OperatorDecision) -> Result<SchemaChangeProposal> {
        let reviewed = self.update_proposal(proposal_id, |proposal| {
            Self::mark_reviewed(proposal, decision)?;
            Ok(proposal.clone())
        })?;

        tracing::info!(
            proposal_id = %proposal_id,
            operator = %decision.operator_id,
            status = reviewed.status.as_str(),
            "Schema change reviewed"
        );
        Ok(reviewed)
    }

    /// Settle a proposal for `loop_id` with its decision, or reject it when
    /// there was none. Returns the proposal as stored and whether this call
    /// moved it; a proposal already out of `pending_review` is left alone.
    fn settle(
        &self,
        proposal_id: &str,
        loop_id: &str,
        decision: Option<&OperatorDecision>,
    ) -> Result<(SchemaChangeProposal, bool)> {
        self.update_proposal(proposal_id, |proposal| {
            if proposal.status != ProposalStatus::PendingReview {
                return Ok((proposal.clone(), false));
            }
            match decision {
                Some(decision) => Self::mark_reviewed(proposal, decision)?,
                None => {
                    proposal.transition(ProposalStatus::Rejected)?;
                    proposal.loop_id_reviewed = Some(loop_id.to_string());
                }
            }
            Ok((proposal.clone(), true))
        })
    }

    /// Simulate applying an approved proposal
    pub async fn apply(&self, proposal_id: &str) -> Result<ApplyResult> {
        let known_schemas = &self.policy.known_schemas;
        let result = self.update_proposal(proposal_id, |proposal| {
            match proposal.status {
                ProposalStatus::Approved => {}
                ProposalStatus::Rejected => return Err(CogctlError::ProposalRejected(proposal_id.to_string())),
                other => {
                    return Err(CogctlError::InvalidTransition(format!(
                        "proposal {} is {}, only approved proposals can be applied",
                        proposal_id, other
                    )));
                }
            }

            let digest = content_digest(proposal);
            if is_known_schema(known_schemas, &proposal.target_schema) {
                let actions = plan_actions(proposal, &digest);
                proposal.simulated_actions = actions.clone();
                proposal.transition(ProposalStatus::AppliedSimulated)?;
                Ok(ApplyResult {
                    proposal_id: proposal_id.to_string(),
                    success: true,
                    status: proposal.status,
                    simulated_actions: actions,
                    digest,
                    error: None,
                })
            } else {
                proposal.transition(ProposalStatus::FailedSimulation)?;
                Ok(ApplyResult {
                    proposal_id: proposal_id.to_string(),
                    success: false,
                    status: proposal.status,
                    simulated_actions: Vec::new(),
                    digest,
                    error: Some(format!("schema '{}' is not in the catalog", proposal.target_schema)),
                })
            }
        })?;

        tracing::info!(
            proposal_id = %proposal_id,
            success = result.success,
            digest = %result.digest,
            "Schema change application simulated"
        );
        Ok(result)
    }

    async fn review(&self, loop_id: &str, proposal_id: &str, timeout: Duration) -> Result<ProposalOutcome> {
        let outcome = self.await_decision(loop_id, proposal_id, timeout).await?;
        let timed_out = outcome == DecisionOutcome::TimedOut;
        let (settled, moved) = self.settle(proposal_id, loop_id, outcome.decision())?;

        if !moved {
            log::info!(
                "Proposal {} was already {} when loop {} came to settle it",
                proposal_id,
                settled.status,
                loop_id
            );
            return Ok(ProposalOutcome {
                proposal_id: proposal_id.to_string(),
                status: settled.status,
                applied: None,
                timed_out,
                settled_elsewhere: true,
                error: None,
            });
        }

        if timed_out {
            tracing::warn!(proposal_id = %proposal_id, "No operator decision in time; proposal rejected");
        } else {
            tracing::info!(proposal_id = %proposal_id, status = settled.status.as_str(), "Schema change reviewed");
        }

        let applied = if settled.status == ProposalStatus::Approved {
            Some(self.apply(proposal_id).await?)
        } else {
            None
        };
        Ok(ProposalOutcome {
            proposal_id: proposal_id.to_string(),
            status: applied.as_ref().map(|a| a.status).unwrap_or(settled.status),
            applied,
            timed_out,
            settled_elsewhere: false,
            error: None,
        })
    }

    /// Review one proposal; a failure lands in the outcome instead of
    /// aborting the rest of the batch
    async fn process_one(&self, loop_id: &str, proposal_id: &str, timeout: Duration) -> ProposalOutcome {
        match self.review(loop_id, proposal_id, timeout).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Review of proposal {} for loop {} failed: {}", proposal_id, loop_id, e);
                let status = self
                    .get(proposal_id)
                    .map(|p| p.status)
                    .unwrap_or(ProposalStatus::PendingReview);
                ProposalOutcome {
                    proposal_id: proposal_id.to_string(),
                    status,
                    applied: None,
                    timed_out: false,
                    settled_elsewhere: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Review every pending proposal concurrently on behalf of `loop_id`.
    /// Approved proposals are applied; rejected or unanswered ones are rejected.
    pub async fn process_pending(&self, loop_id: &str, timeout: Duration) -> Result<Vec<ProposalOutcome>> {
        let pending = self.detect_pending()?;
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        log::info!("Loop {} reviewing {} pending schema proposals", loop_id, pending.len());

        Ok(join_all(
            pending
                .iter()
                .map(|p| self.process_one(loop_id, &p.proposal_id, timeout)),
        )
        .await)
    }
}
