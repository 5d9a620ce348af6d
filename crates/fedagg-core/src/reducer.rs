// crates/fedagg-core/src/reducer.rs

//! Pure fold of pending log entries into an aggregate.
//!
//! The reducer consumes entries in exactly the order [`crate::ActionLog::query`]
//! returned them. Order is part of the contract because folds such as
//! [`FoldFn::Mean`] are not commutative.
//!
//! ## Invariants
//! - Identical `(pending, previous)` inputs give identical outputs; nothing
//!   outside the arguments is read, so retries are side-effect free.
//! - The returned cursor is the hash of the last consumed entry, or the
//!   previous cursor when `pending` is empty.
//! - `pending` must continue the chain from `previous.cursor`; a gap or a
//!   reordered slice is reported as `TamperedLog`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action_log::verify_from;
use crate::error::Result;
use crate::field::Fe;
use crate::fold_fn::FoldFn;
use crate::types::{ActionEntry, AggregateState, Cursor};

/// A named running aggregate over the shared log (e.g. `sum`, `count`).
#[derive(Debug, Clone)]
pub struct Accumulator {
    /// Key under which the aggregate is committed.
    pub name: String,
    /// Step rule.
    pub fold: FoldFn,
}

impl Accumulator {
    /// Construct a new accumulator.
    #[must_use]
    pub fn new(name: impl Into<String>, fold: FoldFn) -> Self {
        Self {
            name: name.into(),
            fold,
        }
    }
}

/// Result of folding one snapshot into several accumulators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointFold {
    /// New values, in accumulator order.
    pub values: Vec<Fe>,
    /// Shared cursor after the snapshot.
    pub cursor: Cursor,
}

/// Stateless fold driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct Reducer;

impl Reducer {
    /// `fold(pendingEntries, previousAggregate, foldFn) -> (newAggregate, newCursor)`.
    pub fn fold(
        pending: &[ActionEntry],
        previous: AggregateState,
        fold: &FoldFn,
    ) -> Result<AggregateState> {
        fold.validate()?;
        let cursor = verify_from(&previous.cursor, pending)?;
        let value = apply_all(pending, previous.value, fold)?;
        debug!(
            fold = %fold.descriptor(),
            consumed = pending.len(),
            value = %value,
            "reduced pending actions"
        );
        Ok(AggregateState::new(value, cursor))
    }

    /// Fold one snapshot into several accumulators sharing `cursor`.
    ///
    /// `previous` is indexed like `accumulators`; every accumulator sees the
    /// same entries.
    pub fn fold_joint(
        pending: &[ActionEntry],
        previous: &[Fe],
        cursor: Cursor,
        accumulators: &[Accumulator],
    ) -> Result<JointFold> {
        debug_assert_eq!(previous.len(), accumulators.len());
        for acc in accumulators {
            acc.fold.validate()?;
        }
        // One pass over the hash chain for all accumulators.
        let next_cursor = verify_from(&cursor, pending)?;
        let values = accumulators
            .iter()
            .zip(previous)
            .map(|(acc, prev)| apply_all(pending, *prev, &acc.fold))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            accumulators = accumulators.len(),
            consumed = pending.len(),
            "reduced pending actions jointly"
        );
        Ok(JointFold {
            values,
            cursor: next_cursor,
        })
    }
}

fn apply_all(pending: &[ActionEntry], start: Fe, fold: &FoldFn) -> Result<Fe> {
    pending
        .iter()
        .try_fold(start, |acc, e| fold.apply(acc, e.value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action_log::{empty_hash, ActionLog};
    use crate::error::AggError;

    fn fe(x: u64) -> Fe {
        Fe::from_u64(x)
    }

    fn genesis() -> AggregateState {
        AggregateState::new(Fe::ZERO, empty_hash())
    }

    #[test]
    fn sum_and_count_over_one_snapshot() {
        let log = ActionLog::new();
        for v in [5, 10, 12] {
            log.append(fe(v));
        }
        let pending = log.query(&empty_hash()).unwrap();
        let accs = [
            Accumulator::new("sum", FoldFn::Sum),
            Accumulator::new("count", FoldFn::Count),
        ];
        let out = Reducer::fold_joint(&pending, &[Fe::ZERO, Fe::ZERO], empty_hash(), &accs).unwrap();
        assert_eq!(out.values, vec![fe(27), fe(3)]);
        assert_eq!(out.cursor, log.tail());
    }

    #[test]
    fn joint_fold_matches_single_folds_and_rejects_gaps() {
        let log = ActionLog::new();
        for v in [4, 8, 6] {
            log.append(fe(v));
        }
        let pending = log.query(&empty_hash()).unwrap();
        let accs = [
            Accumulator::new("sum", FoldFn::Sum),
            Accumulator::new("mean", FoldFn::Mean { window: 2 }),
        ];
        let out = Reducer::fold_joint(&pending, &[fe(1), Fe::ZERO], empty_hash(), &accs).unwrap();
        for (acc, (prev, got)) in accs.iter().zip([fe(1), Fe::ZERO].into_iter().zip(&out.values)) {
            let single = Reducer::fold(&pending, AggregateState::new(prev, empty_hash()), &acc.fold).unwrap();
            assert_eq!(single.value, *got);
            assert_eq!(single.cursor, out.cursor);
        }
        assert!(matches!(
            Reducer::fold_joint(&pending[1..], &[Fe::ZERO, Fe::ZERO], empty_hash(), &accs),
            Err(AggError::TamperedLog { position: 0 })
        ));
        let bad = [Accumulator::new("m", FoldFn::Mean { window: 0 })];
        assert!(matches!(
            Reducer::fold_joint(&pending, &[Fe::ZERO], empty_hash(), &bad),
            Err(AggError::DivisionByZero(_))
        ));
    }

    #[test]
    fn empty_pending_is_identity() {
        let prev = AggregateState::new(fe(42), empty_hash());
        assert_eq!(Reducer::fold(&[], prev, &FoldFn::Sum).unwrap(), prev);
    }

    #[test]
    fn gap_in_pending_is_detected() {
        let log = ActionLog::new();
        for v in [1, 2, 3] {
            log.append(fe(v));
        }
        let pending = log.query(&empty_hash()).unwrap();
        // Skip the first entry but keep the genesis cursor.
        assert!(matches!(
            Reducer::fold(&pending[1..], genesis(), &FoldFn::Sum),
            Err(AggError::TamperedLog { position: 0 })
        ));
    }

    #[test]
    fn zero_window_fails_before_folding() {
        let log = ActionLog::new();
        log.append(fe(1));
        let pending = log.query(&empty_hash()).unwrap();
        assert!(matches!(
            Reducer::fold(&pending, genesis(), &FoldFn::Mean { window: 0 }),
            Err(AggError::DivisionByZero(_))
        ));
    }
}
