//! Summary validation
//!
//! Decides whether a finished loop's summary is accepted, rejected or held
//! for operator review. Rules are checked in order and the first one that
//! fails decides:
//!
//! 1. every required validator resolves from the registry, else `pending_review`
//!    with a drift event per missing validator
//! 2. every required validator that was asked for a review gave one, else
//!    `pending_review`
//! 3. execution succeeded and the signals are finite and clear the policy
//!    thresholds, else `rejected` with a rejection record
//! 4. otherwise `accepted`
//!
//! A verdict is never retried. A rejected summary requires a new loop.

mod signals;

pub use signals::{GatheredSignals, LoopResult, ValidationSignals};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::audit::AuditTrail;
use crate::domain::{DriftEvent, RejectionRecord, SummaryStatus};
use crate::error::Result;
use crate::registry::AgentRegistry;

/// Validator id used on rejections when no validator agents are required
pub const SUMMARY_VALIDATOR_ID: &str = "summary_validator";

/// Thresholds and required validator roles
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationPolicy {
    /// Reject when trust falls below this
    #[serde(rename = "min-trust-score")]
    pub min_trust_score: f64,

    /// Reject when drift rises above this
    #[serde(rename = "max-drift-score")]
    pub max_drift_score: f64,

    /// Agent keys that must resolve before a verdict can be trusted
    #[serde(rename = "required-validators")]
    pub required_validators: Vec<String>,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            min_trust_score: 0.6,
            max_drift_score: 1.0,
            required_validators: vec!["critic".to_string()],
        }
    }
}

/// Outcome of evaluating one loop's summary
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryVerdict {
    pub status: SummaryStatus,
    pub reason: Option<String>,
    /// Validator credited with a rejection
    pub validator_id: Option<String>,
    /// Required validators that failed to resolve
    pub missing_validators: Vec<String>,
    /// Required validators that resolved but could not review
    pub failed_reviews: Vec<String>,
}

impl SummaryVerdict {
    fn accepted() -> Self {
        Self {
            status: SummaryStatus::Accepted,
            reason: None,
            validator_id: None,
            missing_validators: Vec::new(),
            failed_reviews: Vec::new(),
        }
    }

    /// Rejected and pending verdicts both need an operator to look
    pub fn needs_operator_attention(&self) -> bool {
        self.status != SummaryStatus::Accepted
    }
}

pub struct SummaryValidator {
    registry: Arc<dyn AgentRegistry>,
    audit: AuditTrail,
    policy: ValidationPolicy,
}

impl SummaryValidator {
    pub fn new(registry: Arc<dyn AgentRegistry>, audit: AuditTrail, policy: ValidationPolicy) -> Self {
        Self { registry, audit, policy }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    fn rejecting_validator(&self) -> String {
        self.policy
            .required_validators
            .first()
            .cloned()
            .unwrap_or_else(|| SUMMARY_VALIDATOR_ID.to_string())
    }

    /// Ask every resolvable required validator to review the result and fold
    /// their verdicts. Missing validators are skipped here; `evaluate` records
    /// them. A validator whose review errors is listed in `failed_reviews`.
    pub async fn gather_signals(&self, result: &LoopResult) -> GatheredSignals {
        let mut verdicts = Vec::new();
        let mut failed_reviews = Vec::new();
        for key in &self.policy.required_validators {
            let Some(agent) = self.registry.resolve(key) else {
                continue;
            };
            match agent.review(result).await {
                Ok(signals) => {
                    log::debug!(
                        "{} reviewed {}: trust={:.2} drift={:.2} contradictions={}",
                        key,
                        result.loop_id,
                        signals.trust_score,
                        signals.drift_score,
                        signals.unresolved_contradictions
                    );
                    verdicts.push(signals);
                }
                Err(e) => {
                    log::warn!("{} failed to review {}: {}", key, result.loop_id, e);
                    failed_reviews.push(key.clone());
                }
            }
        }
        GatheredSignals {
            signals: ValidationSignals::combine(&verdicts),
            failed_reviews,
        }
    }

    /// Apply the acceptance rules to a finished loop
    pub fn evaluate(&self, result: &LoopResult, gathered: &GatheredSignals) -> Result<SummaryVerdict> {
        let missing: Vec<String> = self
            .policy
            .required_validators
            .iter()
            .filter(|key| self.registry.resolve(key).is_none())
            .cloned()
            .collect();

        if !missing.is_empty() {
            let context = format!("loop {} / validate", result.loop_id);
            for key in &missing {
                self.audit.record_drift(&DriftEvent::agent_not_found(key, context.clone()))?;
            }
            log::warn!(
                "Loop {} held for operator review: validators not resolvable: {}",
                result.loop_id,
                missing.join(", ")
            );
            return Ok(SummaryVerdict {
                status: SummaryStatus::PendingReview,
                reason: Some(format!("required validators not resolvable: {}", missing.join(", "))),
                validator_id: None,
                missing_validators: missing,
                failed_reviews: Vec::new(),
            });
        }

        if !gathered.failed_reviews.is_empty() {
            let failed = gathered.failed_reviews.join(", ");
            log::warn!(
                "Loop {} held for operator review: validators could not review: {}",
                result.loop_id,
                failed
            );
            return Ok(SummaryVerdict {
                status: SummaryStatus::PendingReview,
                reason: Some(format!("required validators could not review: {}", failed)),
                validator_id: None,
                missing_validators: Vec::new(),
                failed_reviews: gathered.failed_reviews.clone(),
            });
        }

        if let Some(reason) = self.rejection_reason(result, &gathered.signals) {
            let validator_id = self.rejecting_validator();
            self.audit
                .record_rejection(&RejectionRecord::new(&result.loop_id, reason.clone(), validator_id.clone()))?;
            return Ok(SummaryVerdict {
                status: SummaryStatus::Rejected,
                reason: Some(reason),
                validator_id: Some(validator_id),
                missing_validators: Vec::new(),
                failed_reviews: Vec::new(),
            });
        }

        Ok(SummaryVerdict::accepted())
    }

    fn rejection_reason(&self, result: &LoopResult, signals: &ValidationSignals) -> Option<String> {
        if !result.succeeded() {
            let detail = result.errors.first().map(String::as_str).unwrap_or("no detail");
            return Some(format!("loop execution failed: {}", detail));
        }
        if !signals.is_finite() {
            return Some(format!(
                "validator signals are not numbers (trust={}, drift={})",
                signals.trust_score, signals.drift_score
            ));
        }
        if signals.trust_score < self.policy.min_trust_score {
            return Some(format!(
                "trust score {:.2} below minimum {:.2}",
                signals.trust_score, self.policy.min_trust_score
            ));
        }
        if signals.drift_score > self.policy.max_drift_score {
            return Some(format!(
                "drift score {:.2} above maximum {:.2}",
                signals.drift_score, self.policy.max_drift_score
            ));
        }
        if signals.unresolved_contradictions > 0 {
            return Some(format!(
                "{} unresolved contradictions",
                signals.unresolved_contradictions
            ));
        }
        None
    }
}
