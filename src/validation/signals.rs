//! Loop results and the signals validators report about them.

use serde::{Deserialize, Serialize};

use crate::domain::{Archetype, LoopStatus};

/// What a loop produced, handed to validators before a summary is written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopResult {
    pub loop_id: String,
    pub archetype: Archetype,
    pub domain: String,
    pub status: LoopStatus,
    pub accumulated_cost: u64,
    pub artifacts: Vec<String>,
    pub errors: Vec<String>,
}

impl LoopResult {
    pub fn succeeded(&self) -> bool {
        self.status == LoopStatus::Success
    }
}

/// Trust, drift and contradiction signals from one or more validators
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationSignals {
    /// 0.0 (no trust) to 1.0 (full trust)
    pub trust_score: f64,
    /// 0.0 (on course) to 1.0 (fully drifted)
    pub drift_score: f64,
    pub unresolved_contradictions: u32,
}

impl Default for ValidationSignals {
    /// No verdict: zero trust
    fn default() -> Self {
        Self {
            trust_score: 0.0,
            drift_score: 0.0,
            unresolved_contradictions: 0,
        }
    }
}

/// `f64::min`/`max` drop a NaN operand; a NaN from any validator must survive the fold
fn poisoned(a: f64, b: f64, pick: fn(f64, f64) -> f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        pick(a, b)
    }
}

impl ValidationSignals {
    /// Fold several verdicts into the most pessimistic combination:
    /// lowest trust, highest drift, all contradictions.
    pub fn combine(verdicts: &[ValidationSignals]) -> ValidationSignals {
        let Some(first) = verdicts.first() else {
            return ValidationSignals::default();
        };
        verdicts.iter().skip(1).fold(*first, |acc, v| ValidationSignals {
            trust_score: poisoned(acc.trust_score, v.trust_score, f64::min),
            drift_score: poisoned(acc.drift_score, v.drift_score, f64::max),
            unresolved_contradictions: acc
                .unresolved_contradictions
                .saturating_add(v.unresolved_contradictions),
        })
    }

    /// Both scores are real numbers
    pub fn is_finite(&self) -> bool {
        self.trust_score.is_finite() && self.drift_score.is_finite()
    }
}

/// Everything the required validators said about one loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatheredSignals {
    /// Folded verdicts of the validators that reviewed
    pub signals: ValidationSignals,
    /// Required validators that resolved but failed to review
    pub failed_reviews: Vec<String>,
}
