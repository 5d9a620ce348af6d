//! Committed state and the optimistic compare-and-set gate in front of it.
//!
//! The ledger is an external collaborator reached through [`LedgerStore`].
//! [`StateGate`] wraps its `write_state` primitive: a commit succeeds only if
//! the stored record still equals the one the caller read, otherwise it fails
//! with `Conflict` and leaves state untouched. Callers then re-read and
//! recompute from scratch.
//!
//! A record keeps its aggregates and cursor together, so they can never be
//! stale with respect to each other. `counter` advances by exactly one per
//! commit and is never rolled back.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::action_log::empty_hash;
use crate::error::{AggError, Result};
use crate::field::Fe;
use crate::types::Cursor;

/// Persisted layout for one ledger key.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateRecord {
    /// Named aggregate values.
    pub aggregates: BTreeMap<String, Fe>,
    /// Log cursor (rollups) or head-proof digest (proof chains).
    pub cursor: Cursor,
    /// Number of commits applied to this key.
    pub counter: u64,
}

impl StateRecord {
    /// The implicit record of a key that was never written.
    #[must_use]
    pub fn genesis() -> Self {
        Self {
            aggregates: BTreeMap::new(),
            cursor: empty_hash(),
            counter: 0,
        }
    }

    /// Next record in the sequence with the given aggregates and cursor.
    #[must_use]
    pub fn successor(&self, aggregates: BTreeMap<String, Fe>, cursor: Cursor) -> Self {
        Self {
            aggregates,
            cursor,
            counter: self.counter + 1,
        }
    }

    /// Aggregate named `name`, defaulting to zero.
    #[must_use]
    pub fn aggregate(&self, name: &str) -> Fe {
        self.aggregates.get(name).copied().unwrap_or_default()
    }
}

impl Default for StateRecord {
    fn default() -> Self {
        Self::genesis()
    }
}

/// Ledger primitive consumed by the gate.
pub trait LedgerStore {
    /// Current record for `key`, if any was ever written.
    fn read_state(&self, key: &str) -> Option<StateRecord>;

    /// Atomically replace the record for `key` with `new` iff the stored
    /// record (or [`StateRecord::genesis`] when absent) equals `expected`.
    ///
    /// # Errors
    /// `Conflict` if the stored record differs from `expected`.
    fn write_state(&self, key: &str, expected: &StateRecord, new: StateRecord) -> Result<()>;
}

impl<L: LedgerStore + ?Sized> LedgerStore for &L {
    fn read_state(&self, key: &str) -> Option<StateRecord> {
        (**self).read_state(key)
    }

    fn write_state(&self, key: &str, expected: &StateRecord, new: StateRecord) -> Result<()> {
        (**self).write_state(key, expected, new)
    }
}

impl<L: LedgerStore + ?Sized> LedgerStore for Arc<L> {
    fn read_state(&self, key: &str) -> Option<StateRecord> {
        (**self).read_state(key)
    }

    fn write_state(&self, key: &str, expected: &StateRecord, new: StateRecord) -> Result<()> {
        (**self).write_state(key, expected, new)
    }
}

/// Process-local ledger (tests, CLI workspaces).
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    records: Mutex<HashMap<String, StateRecord>>,
}

impl InMemoryLedger {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger pre-populated from persisted records.
    #[must_use]
    pub fn from_records(records: BTreeMap<String, StateRecord>) -> Self {
        Self {
            records: Mutex::new(records.into_iter().collect()),
        }
    }

    /// Copy of all records, ordered by key.
    #[must_use]
    pub fn records(&self) -> BTreeMap<String, StateRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl LedgerStore for InMemoryLedger {
    fn read_state(&self, key: &str) -> Option<StateRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn write_state(&self, key: &str, expected: &StateRecord, new: StateRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let matches = records
            .get(key)
            .map_or_else(|| *expected == StateRecord::genesis(), |cur| cur == expected);
        if !matches {
            return Err(AggError::Conflict { key: key.to_owned() });
        }
        records.insert(key.to_owned(), new);
        Ok(())
    }
}

/// Compare-and-set commit for one ledger key.
#[derive(Debug, Clone)]
pub struct StateGate<L> {
    ledger: L,
    key: String,
}

impl<L: LedgerStore> StateGate<L> {
    /// Gate over `key` in `ledger`.
    pub fn new(ledger: L, key: impl Into<String>) -> Self {
        Self {
            ledger,
            key: key.into(),
        }
    }

    /// Ledger key this gate commits to.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Borrow the underlying ledger.
    #[must_use]
    pub const fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Read the committed record (genesis if the key was never written).
    #[must_use]
    pub fn read(&self) -> StateRecord {
        self.ledger.read_state(&self.key).unwrap_or_default()
    }

    /// `commit(expectedPrevious, newValue)`.
    ///
    /// # Errors
    /// - `Conflict` if another commit landed since `expected` was read.
    /// - `InvalidTransition` if `new` does not advance the counter by one.
    pub fn commit(&self, expected: &StateRecord, new: StateRecord) -> Result<StateRecord> {
        if new.counter != expected.counter + 1 {
            return Err(AggError::InvalidTransition(format!(
                "commit counter must advance {} -> {}, got {}",
                expected.counter,
                expected.counter + 1,
                new.counter
            )));
        }
        match self.ledger.write_state(&self.key, expected, new.clone()) {
            Ok(()) => {
                info!(key = %self.key, counter = new.counter, cursor = %new.cursor, "state committed");
                Ok(new)
            }
            Err(e) => {
                if matches!(e, AggError::Conflict { .. }) {
                    warn!(key = %self.key, expected_counter = expected.counter, "commit lost the race");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_sum(rec: &StateRecord, v: u64) -> StateRecord {
        let mut aggs = rec.aggregates.clone();
        aggs.insert("sum".into(), Fe::from_u64(v));
        rec.successor(aggs, rec.cursor)
    }

    #[test]
    fn first_commit_against_genesis() {
        let gate = StateGate::new(InMemoryLedger::new(), "k");
        let g = gate.read();
        assert_eq!(g, StateRecord::genesis());
        let next = gate.commit(&g, with_sum(&g, 5)).unwrap();
        assert_eq!(gate.read(), next);
        assert_eq!(next.counter, 1);
    }

    #[test]
    fn racing_commit_conflicts_and_leaves_state() {
        let gate = StateGate::new(InMemoryLedger::new(), "k");
        let snap = gate.read();
        let a = with_sum(&snap, 1);
        let b = with_sum(&snap, 2);
        gate.commit(&snap, a.clone()).unwrap();
        assert!(matches!(
            gate.commit(&snap, b),
            Err(AggError::Conflict { .. })
        ));
        assert_eq!(gate.read(), a);
    }

    #[test]
    fn counter_must_advance_by_one() {
        let gate = StateGate::new(InMemoryLedger::new(), "k");
        let snap = gate.read();
        let mut skip = with_sum(&snap, 1);
        skip.counter = 5;
        assert!(matches!(
            gate.commit(&snap, skip),
            Err(AggError::InvalidTransition(_))
        ));
        assert_eq!(gate.read(), StateRecord::genesis());
    }

    #[test]
    fn keys_are_independent() {
        let ledger = Arc::new(InMemoryLedger::new());
        let a = StateGate::new(Arc::clone(&ledger), "a");
        let b = StateGate::new(Arc::clone(&ledger), "b");
        let ga = a.read();
        let gb = b.read();
        a.commit(&ga, with_sum(&ga, 1)).unwrap();
        b.commit(&gb, with_sum(&gb, 2)).unwrap();
        assert_eq!(ledger.records().len(), 2);
    }
}
