//! cogctl - an operator-governed control plane for cognition loops
//!
//! Every loop is classified into an archetype, admitted against a three-scope
//! complexity budget, executed by registry-resolved agents and closed with a
//! validated summary. Anything the controller cannot decide on its own
//! (budget overrides, unverifiable summaries, schema changes) waits for an
//! operator, and a wait that runs out is a rejection.

pub mod audit;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod controller;
pub mod cost;
pub mod domain;
pub mod error;
pub mod gate;
pub mod governor;
pub mod id;
pub mod ledger;
pub mod operator;
pub mod registry;
pub mod storage;
pub mod validation;

pub use error::{CogctlError, Result};
