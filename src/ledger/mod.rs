//! Complexity ledger
//!
//! Owner of the complexity budget. Tracks remaining budget at three
//! scopes (global, per archetype, per domain), answers affordability queries
//! and records spends. A spend deducts the same cost from all three scopes
//! under one lock and one persisted write, so the scopes never drift apart.
//!
//! Unknown archetypes and domains are lazily initialized with the default
//! allotment on their first spend; queries evaluate them against the default
//! without creating them.
//!
//! A scope loaded with a negative balance is halted: spends touching it fail
//! until an operator reconciles it.
//!
//! Balances live in one persisted record. Spends and reconciles rewrite it
//! under the storage file lock, so ledgers in separate processes never grant
//! the same budget twice.

mod budget;

pub use budget::{Affordability, ComplexityBudget, ScopeKey};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::Archetype;
use crate::error::{CogctlError, Result};
use crate::id::{generate_record_id, now_ms};
use crate::storage::{HasId, JsonlStorage, Storage, collections};

const LEDGER_RECORD_ID: &str = "complexity_budget";

/// Initial allotments for each scope
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BudgetPolicy {
    /// Starting global budget
    pub global: i64,

    /// Starting budget for listed archetypes
    #[serde(rename = "per-archetype")]
    pub per_archetype: HashMap<Archetype, i64>,

    /// Starting budget for listed domains
    #[serde(rename = "per-domain")]
    pub per_domain: HashMap<String, i64>,

    /// Allotment for an archetype seen for the first time
    #[serde(rename = "default-archetype-allotment")]
    pub default_archetype_allotment: i64,

    /// Allotment for a domain seen for the first time
    #[serde(rename = "default-domain-allotment")]
    pub default_domain_allotment: i64,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            global: 1000,
            per_archetype: HashMap::new(),
            per_domain: HashMap::new(),
            default_archetype_allotment: 500,
            default_domain_allotment: 500,
        }
    }
}

impl BudgetPolicy {
    /// Budget table seeded from this policy
    pub fn initial_budget(&self) -> ComplexityBudget {
        ComplexityBudget {
            global_remaining: self.global,
            per_archetype_remaining: self.per_archetype.clone(),
            per_domain_remaining: self.per_domain.clone(),
        }
    }

    fn default_for(&self, scope: &ScopeKey) -> i64 {
        match scope {
            ScopeKey::Global => self.global,
            ScopeKey::Archetype(_) => self.default_archetype_allotment,
            ScopeKey::Domain(_) => self.default_domain_allotment,
        }
    }
}

/// Journal entry for one successful spend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendRecord {
    pub id: String,
    pub loop_id: String,
    pub archetype: Archetype,
    pub domain: String,
    /// Cost the loop asked for
    pub cost: u64,
    /// What each scope actually lost, keyed by scope name. Equal to `cost`
    /// everywhere unless an override floored a scope at zero.
    #[serde(default)]
    pub deducted: BTreeMap<String, u64>,
    /// Operator approved a spend the budget could not cover
    pub overridden: bool,
    pub timestamp: i64,
}

impl HasId for SpendRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

impl SpendRecord {
    /// Amount this spend took from `scope`
    pub fn deducted_from(&self, scope: &ScopeKey) -> u64 {
        self.deducted.get(&scope.to_string()).copied().unwrap_or(0)
    }
}

/// Persisted form of the whole budget table
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerRecord {
    id: String,
    budget: ComplexityBudget,
    updated_at: i64,
}

impl LedgerRecord {
    fn new(budget: ComplexityBudget) -> Self {
        Self {
            id: LEDGER_RECORD_ID.to_string(),
            budget,
            updated_at: now_ms(),
        }
    }
}

impl HasId for LedgerRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug)]
struct LedgerState {
    budget: ComplexityBudget,
    halted: BTreeSet<ScopeKey>,
}

impl LedgerState {
    /// Take on the persisted balances. Spends never drive a balance below zero
    /// and reconcile refuses negatives, so a negative scope is exactly a halted one.
    fn adopt(&mut self, budget: ComplexityBudget) {
        let halted: BTreeSet<ScopeKey> = budget.negative_scopes().into_iter().collect();
        for scope in halted.difference(&self.halted) {
            tracing::error!(scope = %scope, "Negative balance loaded; scope halted until reconciled");
        }
        self.budget = budget;
        self.halted = halted;
    }
}

/// Mutex-guarded writer of the complexity budget.
///
/// Other processes may share the same data directory: every read adopts the
/// persisted balances first, and every write is a locked read-modify-write
/// of the persisted record.
pub struct ComplexityLedger {
    storage: Arc<JsonlStorage>,
    policy: BudgetPolicy,
    state: Mutex<LedgerState>,
}

impl std::fmt::Debug for ComplexityLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplexityLedger")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn scopes_for(archetype: Archetype, domain: &str) -> [ScopeKey; 3] {
    [
        ScopeKey::Global,
        ScopeKey::Archetype(archetype),
        ScopeKey::Domain(domain.to_string()),
    ]
}

fn cost_as_balance(cost: u64) -> Result<i64> {
    i64::try_from(cost).map_err(|_| CogctlError::BudgetExceeded(format!("cost {} exceeds any budget", cost)))
}

impl ComplexityLedger {
    /// Open the ledger, loading persisted balances or seeding them from the policy.
    pub fn open(storage: Arc<JsonlStorage>, policy: BudgetPolicy) -> Result<Self> {
        let budget = storage.modify(collections::BUDGETS, LEDGER_RECORD_ID, |slot: &mut Option<LedgerRecord>| {
            if let Some(record) = slot.as_ref() {
                log::debug!("Loaded complexity budget (updated_at={})", record.updated_at);
                return Ok(record.budget.clone());
            }
            log::info!("No persisted complexity budget, seeding from policy");
            let budget = policy.initial_budget();
            *slot = Some(LedgerRecord::new(budget.clone()));
            Ok(budget)
        })?;

        let mut state = LedgerState {
            budget: ComplexityBudget::default(),
            halted: BTreeSet::new(),
        };
        state.adopt(budget);

        Ok(Self {
            storage,
            policy,
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>> {
        self.state.lock().map_err(|e| CogctlError::Storage(e.to_string()))
    }

    /// Lock the state after catching up with whatever other processes persisted
    fn current(&self) -> Result<MutexGuard<'_, LedgerState>> {
        let mut state = self.lock()?;
        self.storage.refresh(collections::BUDGETS)?;
        if let Some(record) = self
            .storage
            .get::<LedgerRecord>(collections::BUDGETS, LEDGER_RECORD_ID)?
        {
            state.adopt(record.budget);
        }
        Ok(state)
    }

    fn persisted_or_seed(&self, slot: &mut Option<LedgerRecord>) -> ComplexityBudget {
        match slot.take() {
            Some(record) => record.budget,
            None => self.policy.initial_budget(),
        }
    }

    fn remaining_or_default(&self, budget: &ComplexityBudget, scope: &ScopeKey) -> i64 {
        budget
            .remaining(scope)
            .unwrap_or_else(|| self.policy.default_for(scope))
    }

    /// Compare `cost` against each scope's remaining figure. Never mutates.
    ///
    /// Affordability is inclusive: a cost equal to the remaining budget is affordable.
    pub fn query(&self, archetype: Archetype, domain: &str, cost: u64) -> Result<Affordability> {
        let state = self.current()?;
        let Ok(cost) = i64::try_from(cost) else {
            return Ok(Affordability {
                global_ok: false,
                archetype_ok: false,
                domain_ok: false,
            });
        };
        let [global, arch, dom] = scopes_for(archetype, domain);
        let fits = |scope: &ScopeKey| cost <= self.remaining_or_default(&state.budget, scope);

        Ok(Affordability {
            global_ok: fits(&global),
            archetype_ok: fits(&arch),
            domain_ok: fits(&dom),
        })
    }

    /// Halted scopes among those a loop of this archetype and domain would touch
    pub fn halted_for(&self, archetype: Archetype, domain: &str) -> Result<Vec<ScopeKey>> {
        let state = self.current()?;
        Ok(scopes_for(archetype, domain)
            .into_iter()
            .filter(|s| state.halted.contains(s))
            .collect())
    }

    /// Every halted scope
    pub fn halted_scopes(&self) -> Result<Vec<ScopeKey>> {
        Ok(self.current()?.halted.iter().cloned().collect())
    }

    /// Deduct `cost` from all three scopes, or from none.
    ///
    /// Fails with `BudgetExceeded` if any scope cannot cover the cost and with
    /// `LedgerHalted` if any touched scope is halted.
    pub fn spend(&self, loop_id: &str, archetype: Archetype, domain: &str, cost: u64) -> Result<SpendRecord> {
        self.apply_spend(loop_id, archetype, domain, cost, false)
    }

    /// Operator-approved spend: deducts the same cost from all three scopes,
    /// flooring each at zero instead of refusing.
    pub fn spend_overridden(&self, loop_id: &str, archetype: Archetype, domain: &str, cost: u64) -> Result<SpendRecord> {
        self.apply_spend(loop_id, archetype, domain, cost, true)
    }

    fn apply_spend(
        &self,
        loop_id: &str,
        archetype: Archetype,
        domain: &str,
        cost: u64,
        overridden: bool,
    ) -> Result<SpendRecord> {
        let amount = if overridden {
            i64::try_from(cost).unwrap_or(i64::MAX)
        } else {
            cost_as_balance(cost)?
        };
        let scopes = scopes_for(archetype, domain);

        let mut state = self.lock()?;
        let (next, deducted) = self.storage.modify(
            collections::BUDGETS,
            LEDGER_RECORD_ID,
            |slot: &mut Option<LedgerRecord>| {
                state.adopt(self.persisted_or_seed(slot));

                if let Some(halted) = scopes.iter().find(|s| state.halted.contains(*s)) {
                    return Err(CogctlError::LedgerHalted(halted.to_string()));
                }

                let mut next = state.budget.clone();
                let mut deducted = BTreeMap::new();
                let mut short = Vec::new();
                for scope in &scopes {
                    let remaining = self.remaining_or_default(&state.budget, scope);
                    let taken = if remaining < amount {
                        if !overridden {
                            short.push(format!("{} needs {}, has {}", scope, amount, remaining));
                            continue;
                        }
                        remaining
                    } else {
                        amount
                    };
                    next.set(scope, remaining - taken);
                    deducted.insert(scope.to_string(), u64::try_from(taken).unwrap_or(0));
                }
                if !short.is_empty() {
                    return Err(CogctlError::BudgetExceeded(short.join("; ")));
                }

                *slot = Some(LedgerRecord::new(next.clone()));
                Ok((next, deducted))
            },
        )?;
        state.adopt(next);

        let record = SpendRecord {
            id: generate_record_id("spend"),
            loop_id: loop_id.to_string(),
            archetype,
            domain: domain.to_string(),
            cost,
            deducted,
            overridden,
            timestamp: now_ms(),
        };
        self.storage.append(collections::LEDGER_JOURNAL, &record)?;

        tracing::info!(
            loop_id,
            archetype = %archetype,
            domain,
            cost,
            overridden,
            global_remaining = state.budget.global_remaining,
            "Spent complexity budget"
        );

        Ok(record)
    }

    /// Manually set a scope's balance and lift any halt on it
    pub fn reconcile(&self, scope: &ScopeKey, remaining: i64) -> Result<()> {
        if remaining < 0 {
            return Err(CogctlError::InvalidTransition(format!(
                "cannot reconcile {} to negative balance {}",
                scope, remaining
            )));
        }

        let mut state = self.lock()?;
        let next = self.storage.modify(
            collections::BUDGETS,
            LEDGER_RECORD_ID,
            |slot: &mut Option<LedgerRecord>| {
                let mut budget = self.persisted_or_seed(slot);
                budget.set(scope, remaining);
                *slot = Some(LedgerRecord::new(budget.clone()));
                Ok(budget)
            },
        )?;
        let was_halted = state.halted.contains(scope);
        state.adopt(next);

        log::info!("Reconciled {} to {} (was halted: {})", scope, remaining, was_halted);
        Ok(())
    }

    /// Read-only copy of the current balances
    pub fn snapshot(&self) -> Result<ComplexityBudget> {
        Ok(self.current()?.budget.clone())
    }

    /// Spend journal, oldest first
    pub fn journal(&self) -> Result<Vec<SpendRecord>> {
        self.storage.refresh(collections::LEDGER_JOURNAL)?;
        self.storage.list(collections::LEDGER_JOURNAL)
    }
}
