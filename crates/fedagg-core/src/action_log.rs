//! Append-only, hash-chained action log.
//!
//! Every entry stores `chain_hash = H(value, previous_chain_hash)`, starting
//! from [`empty_hash`]. Altering, dropping, or reordering any entry changes
//! every later hash, which [`ActionLog::verify_integrity`] detects by
//! recomputing from the start.
//!
//! Appends from many submitters are serialized by an internal lock; the order
//! the lock assigns is final and visible to every reader afterwards.

use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

use fedagg_crypto::{Blake3Transcript, Label, Transcript};
use tracing::debug;

use crate::error::{AggError, Result};
use crate::field::Fe;
use crate::types::{ActionEntry, ChainHash};

/// Tail hash of a log with no entries (domain-separated constant).
#[must_use]
pub fn empty_hash() -> ChainHash {
    static EMPTY: OnceLock<ChainHash> = OnceLock::new();
    *EMPTY.get_or_init(|| {
        let mut tr = Blake3Transcript::new(Label::Actions.as_str());
        tr.absorb("empty", b"");
        ChainHash(tr.challenge_32("initial"))
    })
}

/// `H(value, previous)` under the action-log domain.
#[must_use]
pub fn chain_hash(value: Fe, previous: &ChainHash) -> ChainHash {
    let mut tr = Blake3Transcript::new(Label::Actions.as_str());
    tr.absorb_labeled(Label::Previous, previous.as_bytes());
    tr.absorb_labeled(Label::Value, &value.to_le_bytes());
    ChainHash(tr.challenge_32("link"))
}

#[derive(Debug)]
struct LogInner {
    entries: Vec<ActionEntry>,
    /// chain hash → position, for cursor lookups.
    index: HashMap<ChainHash, usize>,
    tail: ChainHash,
}

impl Default for LogInner {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            tail: empty_hash(),
        }
    }
}

/// Thread-safe append-only log of contributions.
#[derive(Debug, Default)]
pub struct ActionLog {
    inner: RwLock<LogInner>,
}

impl ActionLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from persisted entries, re-verifying the hash chain.
    pub fn from_entries(entries: Vec<ActionEntry>) -> Result<Self> {
        let tail = Self::verify_integrity(&entries)?;
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.chain_hash, i))
            .collect();
        Ok(Self {
            inner: RwLock::new(LogInner {
                entries,
                index,
                tail,
            }),
        })
    }

    /// Append `value`, extending the tail. Returns the committed entry.
    pub fn append(&self, value: Fe) -> ActionEntry {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let entry = ActionEntry {
            value,
            chain_hash: chain_hash(value, &inner.tail),
        };
        let position = inner.entries.len();
        inner.entries.push(entry);
        inner.index.insert(entry.chain_hash, position);
        inner.tail = entry.chain_hash;
        debug!(position, value = %value, tail = %entry.chain_hash, "action appended");
        entry
    }

    /// Entries strictly after `from`, in append order, up to the current tail.
    ///
    /// `from == tail` yields an empty vector.
    ///
    /// # Errors
    /// `UnknownCursor` if `from` is neither [`empty_hash`] nor an entry hash.
    pub fn query(&self, from: &ChainHash) -> Result<Vec<ActionEntry>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let start = if *from == empty_hash() {
            0
        } else {
            inner
                .index
                .get(from)
                .map(|&i| i + 1)
                .ok_or(AggError::UnknownCursor(*from))?
        };
        Ok(inner.entries[start..].to_vec())
    }

    /// Current tail hash.
    #[must_use]
    pub fn tail(&self) -> ChainHash {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tail
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Whether no entry has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero-based position of the entry with hash `h` (`None` for the empty hash).
    #[must_use]
    pub fn position_of(&self, h: &ChainHash) -> Option<usize> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .index
            .get(h)
            .copied()
    }

    /// Copy of every entry, for persistence or audit.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ActionEntry> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clone()
    }

    /// Recompute the chain from [`empty_hash`] and return the tail.
    ///
    /// # Errors
    /// `TamperedLog` naming the first entry whose hash does not match.
    pub fn verify_integrity(entries: &[ActionEntry]) -> Result<ChainHash> {
        verify_from(&empty_hash(), entries)
    }
}

/// Recompute the chain over `entries` starting at `from`; returns the last hash.
pub(crate) fn verify_from(from: &ChainHash, entries: &[ActionEntry]) -> Result<ChainHash> {
    entries
        .iter()
        .enumerate()
        .try_fold(*from, |prev, (position, e)| {
            let expect = chain_hash(e.value, &prev);
            if expect == e.chain_hash {
                Ok(expect)
            } else {
                Err(AggError::TamperedLog { position })
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn fe(x: u64) -> Fe {
        Fe::from_u64(x)
    }

    #[test]
    fn query_returns_entries_after_cursor() {
        let log = ActionLog::new();
        let a = log.append(fe(5));
        let b = log.append(fe(10));
        let c = log.append(fe(12));

        assert_eq!(log.query(&empty_hash()).unwrap(), vec![a, b, c]);
        assert_eq!(log.query(&a.chain_hash).unwrap(), vec![b, c]);
        assert!(log.query(&log.tail()).unwrap().is_empty());
        assert_eq!(log.tail(), c.chain_hash);
        assert_eq!(log.position_of(&b.chain_hash), Some(1));
    }

    #[test]
    fn unknown_cursor_is_an_error() {
        let log = ActionLog::new();
        log.append(fe(1));
        let bogus = ChainHash([9u8; 32]);
        assert!(matches!(
            log.query(&bogus),
            Err(AggError::UnknownCursor(h)) if h == bogus
        ));
    }

    #[test]
    fn same_value_different_position_hashes_differently() {
        let log = ActionLog::new();
        let a = log.append(fe(3));
        let b = log.append(fe(3));
        assert_ne!(a.chain_hash, b.chain_hash);
    }

    #[test]
    fn integrity_detects_reorder_and_edit() {
        let log = ActionLog::new();
        for v in [5, 10, 12, 8] {
            log.append(fe(v));
        }
        let entries = log.snapshot();
        assert_eq!(ActionLog::verify_integrity(&entries).unwrap(), log.tail());

        let mut edited = entries.clone();
        edited[1].value = fe(11);
        assert!(matches!(
            ActionLog::verify_integrity(&edited),
            Err(AggError::TamperedLog { position: 1 })
        ));

        let mut swapped = entries.clone();
        swapped.swap(2, 3);
        assert!(matches!(
            ActionLog::verify_integrity(&swapped),
            Err(AggError::TamperedLog { position: 2 })
        ));

        let mut dropped = entries;
        dropped.remove(0);
        assert!(ActionLog::from_entries(dropped).is_err());
    }

    #[test]
    fn concurrent_appends_form_one_total_order() {
        let log = Arc::new(ActionLog::new());
        std::thread::scope(|s| {
            for t in 0..4u64 {
                let log = Arc::clone(&log);
                s.spawn(move || {
                    for i in 0..25u64 {
                        log.append(fe(t * 100 + i));
                    }
                });
            }
        });
        assert_eq!(log.len(), 100);
        let entries = log.snapshot();
        assert_eq!(ActionLog::verify_integrity(&entries).unwrap(), log.tail());
        let rebuilt = ActionLog::from_entries(entries).unwrap();
        assert_eq!(rebuilt.tail(), log.tail());
    }
}
