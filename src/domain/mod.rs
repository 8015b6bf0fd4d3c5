//! Domain types for cogctl
//!
//! This module contains the control-plane records:
//! - LoopIntent: what a loop wants to do, submitted before it starts
//! - Archetype: the fixed category an intent is classified into
//! - LoopSummary / RejectionRecord: loop completion and rejection logs
//! - DriftEvent: agents that failed to resolve
//! - OperatorDecision / OverrideLogEntry: operator verdicts and their audit trail
//! - SchemaChangeProposal: proposed schema changes and their state machine

pub mod archetype;
pub mod decision;
pub mod drift;
pub mod intent;
pub mod proposal;
pub mod summary;

pub use archetype::Archetype;
pub use decision::{Decision, DecisionKey, DecisionKind, OperatorDecision, OverrideLogEntry};
pub use drift::DriftEvent;
pub use intent::LoopIntent;
pub use proposal::{ActionKind, ProposalStatus, SchemaChangeProposal, SimulatedAction};
pub use summary::{LoopStatus, LoopSummary, RejectionRecord, SummaryStatus};
