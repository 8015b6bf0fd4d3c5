//! Storage layer for cogctl - JSONL collections with in-memory caching.
//!
//! Collections are either append-only logs (summaries, rejections, drift,
//! operator overrides, ledger journal) or mutable tables keyed by `id`
//! (budgets, schema proposals).

mod jsonl;
mod traits;

pub use jsonl::JsonlStorage;
pub use traits::{Filter, HasId, Storage};

/// Collection names used by the control plane.
pub mod collections {
    pub const LOOP_SUMMARIES: &str = "loop_summaries";
    pub const REJECTIONS: &str = "rejections";
    pub const DRIFT_EVENTS: &str = "drift_events";
    pub const OPERATOR_OVERRIDES: &str = "operator_overrides";
    pub const LEDGER_JOURNAL: &str = "ledger_journal";
    pub const BUDGETS: &str = "budgets";
    pub const SCHEMA_PROPOSALS: &str = "schema_proposals";
    pub const DECISIONS: &str = "decisions";
}
