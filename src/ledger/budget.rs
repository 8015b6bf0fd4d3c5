//! Budget scopes and the three-scope remaining-budget table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::Archetype;
use crate::error::CogctlError;

/// One of the three granularities a budget is tracked at
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeKey {
    Global,
    Archetype(Archetype),
    Domain(String),
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::Global => f.write_str("global"),
            ScopeKey::Archetype(a) => write!(f, "archetype:{}", a),
            ScopeKey::Domain(d) => write!(f, "domain:{}", d),
        }
    }
}

impl FromStr for ScopeKey {
    type Err = CogctlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            None if s == "global" => Ok(ScopeKey::Global),
            Some(("archetype", a)) => Ok(ScopeKey::Archetype(a.parse()?)),
            Some(("domain", d)) if !d.is_empty() => Ok(ScopeKey::Domain(d.to_string())),
            _ => Err(CogctlError::Config(format!(
                "invalid scope '{}': expected global, archetype:<name> or domain:<name>",
                s
            ))),
        }
    }
}

/// Remaining budget at each scope.
///
/// Balances are signed so that a corrupt (negative) persisted value can be
/// detected instead of wrapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityBudget {
    pub global_remaining: i64,
    pub per_archetype_remaining: HashMap<Archetype, i64>,
    pub per_domain_remaining: HashMap<String, i64>,
}

impl ComplexityBudget {
    /// Remaining figure for a scope, if it has been initialized
    pub fn remaining(&self, scope: &ScopeKey) -> Option<i64> {
        match scope {
            ScopeKey::Global => Some(self.global_remaining),
            ScopeKey::Archetype(a) => self.per_archetype_remaining.get(a).copied(),
            ScopeKey::Domain(d) => self.per_domain_remaining.get(d).copied(),
        }
    }

    pub(crate) fn set(&mut self, scope: &ScopeKey, value: i64) {
        match scope {
            ScopeKey::Global => self.global_remaining = value,
            ScopeKey::Archetype(a) => {
                self.per_archetype_remaining.insert(*a, value);
            }
            ScopeKey::Domain(d) => {
                self.per_domain_remaining.insert(d.clone(), value);
            }
        }
    }

    /// Every initialized scope with a negative balance
    pub fn negative_scopes(&self) -> Vec<ScopeKey> {
        let mut scopes = Vec::new();
        if self.global_remaining < 0 {
            scopes.push(ScopeKey::Global);
        }
        scopes.extend(
            self.per_archetype_remaining
                .iter()
                .filter(|(_, v)| **v < 0)
                .map(|(a, _)| ScopeKey::Archetype(*a)),
        );
        scopes.extend(
            self.per_domain_remaining
                .iter()
                .filter(|(_, v)| **v < 0)
                .map(|(d, _)| ScopeKey::Domain(d.clone())),
        );
        scopes.sort();
        scopes
    }
}

/// Read-only answer to "can this cost be afforded?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affordability {
    pub global_ok: bool,
    pub archetype_ok: bool,
    pub domain_ok: bool,
}

impl Affordability {
    pub fn all_ok(&self) -> bool {
        self.global_ok && self.archetype_ok && self.domain_ok
    }

    /// Scopes that cannot cover the cost
    pub fn short_scopes(&self, archetype: Archetype, domain: &str) -> Vec<ScopeKey> {
        let mut short = Vec::new();
        if !self.global_ok {
            short.push(ScopeKey::Global);
        }
        if !self.archetype_ok {
            short.push(ScopeKey::Archetype(archetype));
        }
        if !self.domain_ok {
            short.push(ScopeKey::Domain(domain.to_string()));
        }
        short
    }
}
