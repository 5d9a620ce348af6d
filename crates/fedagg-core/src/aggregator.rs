//! Rollup and proof-chain front ends over a [`StateGate`].
//!
//! [`Aggregator`] is the log-based strategy: parties `submit`, and anyone may
//! `rollup` the pending suffix into committed state. [`ChainAggregator`] is the
//! recursive-proof strategy: every contribution is proven into a chain whose
//! head digest becomes the committed cursor. [`DirectAggregate`] applies a
//! fold straight to committed state without a log, for single-writer setups.
//!
//! Each strategy commits under its own ledger key so the two kinds of cursor
//! are never mixed.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::action_log::ActionLog;
use crate::chain::{NextStep, ProofChain};
use crate::engine::ProvingEngine;
use crate::error::{AggError, Result};
use crate::field::Fe;
use crate::proof::Proof;
use crate::reducer::{Accumulator, Reducer};
use crate::state::{LedgerStore, StateGate, StateRecord};
use crate::types::{ActionEntry, ChainHash, Cursor};

/// Summary of one rollup attempt that reached the gate (or had nothing to do).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupOutcome {
    /// Committed aggregates after the rollup.
    pub aggregates: BTreeMap<String, Fe>,
    /// Committed cursor after the rollup.
    pub cursor: Cursor,
    /// Number of log entries folded by this call.
    pub folded: usize,
    /// Commit counter after the rollup.
    pub counter: u64,
}

impl RollupOutcome {
    fn from_record(record: &StateRecord, folded: usize) -> Self {
        Self {
            aggregates: record.aggregates.clone(),
            cursor: record.cursor,
            folded,
            counter: record.counter,
        }
    }
}

/// A rollup computed against a snapshot but not yet committed.
#[derive(Debug, Clone)]
pub struct PreparedRollup {
    expected: StateRecord,
    next: Option<StateRecord>,
    folded: usize,
}

impl PreparedRollup {
    /// Number of entries the commit would consume.
    #[must_use]
    pub const fn folded(&self) -> usize {
        self.folded
    }

    /// Record this rollup was computed from.
    #[must_use]
    pub const fn expected(&self) -> &StateRecord {
        &self.expected
    }
}

/// Log-based aggregator: `submit` + `rollup`.
#[derive(Debug)]
pub struct Aggregator<L> {
    log: Arc<ActionLog>,
    gate: StateGate<L>,
    accumulators: Vec<Accumulator>,
}

impl<L: LedgerStore> Aggregator<L> {
    /// Aggregator committing `accumulators` through `gate`.
    ///
    /// # Errors
    /// Any accumulator whose fold fails [`crate::FoldFn::validate`], or duplicate
    /// accumulator names (`InvalidConfig`).
    pub fn new(log: Arc<ActionLog>, gate: StateGate<L>, accumulators: Vec<Accumulator>) -> Result<Self> {
        for (i, acc) in accumulators.iter().enumerate() {
            acc.fold.validate()?;
            if accumulators[..i].iter().any(|a| a.name == acc.name) {
                return Err(AggError::InvalidConfig(format!(
                    "accumulator `{}` configured twice",
                    acc.name
                )));
            }
        }
        Ok(Self {
            log,
            gate,
            accumulators,
        })
    }

    /// Shared action log.
    #[must_use]
    pub const fn log(&self) -> &Arc<ActionLog> {
        &self.log
    }

    /// Gate this aggregator commits through.
    #[must_use]
    pub const fn gate(&self) -> &StateGate<L> {
        &self.gate
    }

    /// Configured accumulators.
    #[must_use]
    pub fn accumulators(&self) -> &[Accumulator] {
        &self.accumulators
    }

    /// `submit(value)`: append to the log. Never touches committed state.
    pub fn submit(&self, value: Fe) -> ActionEntry {
        self.log.append(value)
    }

    /// Currently committed record.
    #[must_use]
    pub fn committed(&self) -> StateRecord {
        self.gate.read()
    }

    /// Committed value of accumulator `name` (zero before the first rollup).
    #[must_use]
    pub fn aggregate(&self, name: &str) -> Fe {
        self.committed().aggregate(name)
    }

    /// Entries appended but not yet folded into committed state.
    pub fn pending(&self) -> Result<Vec<ActionEntry>> {
        self.log.query(&self.committed().cursor)
    }

    /// Read committed state, query the log from its cursor and fold.
    ///
    /// Pure with respect to committed state; pair with [`Self::commit`].
    pub fn prepare(&self) -> Result<PreparedRollup> {
        let expected = self.gate.read();
        let pending = self.log.query(&expected.cursor)?;
        if pending.is_empty() {
            return Ok(PreparedRollup {
                expected,
                next: None,
                folded: 0,
            });
        }
        let previous: Vec<Fe> = self
            .accumulators
            .iter()
            .map(|a| expected.aggregate(&a.name))
            .collect();
        let joint = Reducer::fold_joint(&pending, &previous, expected.cursor, &self.accumulators)?;
        let mut aggregates = expected.aggregates.clone();
        for (acc, value) in self.accumulators.iter().zip(joint.values) {
            aggregates.insert(acc.name.clone(), value);
        }
        let next = expected.successor(aggregates, joint.cursor);
        debug!(key = self.gate.key(), pending = pending.len(), "rollup prepared");
        Ok(PreparedRollup {
            expected,
            next: Some(next),
            folded: pending.len(),
        })
    }

    /// Commit a prepared rollup. An empty rollup commits nothing.
    ///
    /// # Errors
    /// `Conflict` if committed state moved since [`Self::prepare`].
    pub fn commit(&self, prepared: PreparedRollup) -> Result<RollupOutcome> {
        let Some(next) = prepared.next else {
            return Ok(RollupOutcome::from_record(&prepared.expected, 0));
        };
        let record = self.gate.commit(&prepared.expected, next)?;
        Ok(RollupOutcome::from_record(&record, prepared.folded))
    }

    /// `rollup()`: one prepare + commit attempt.
    pub fn rollup(&self) -> Result<RollupOutcome> {
        self.commit(self.prepare()?)
    }

    /// Retry [`Self::rollup`] on retryable errors, re-reading state each time.
    ///
    /// `max_attempts` of zero is treated as one.
    pub fn rollup_with_retry(&self, max_attempts: u32) -> Result<RollupOutcome> {
        let attempts = max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.rollup() {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(attempt, max_attempts = attempts, error = %e, "rollup failed; retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Fold applied straight to committed state, one contribution per commit.
///
/// This is the single-writer rolling update: no log, the cursor never moves.
#[derive(Debug)]
pub struct DirectAggregate<L> {
    gate: StateGate<L>,
    accumulator: Accumulator,
}

impl<L: LedgerStore> DirectAggregate<L> {
    /// Direct aggregate named `accumulator.name` under `gate`.
    pub fn new(gate: StateGate<L>, accumulator: Accumulator) -> Result<Self> {
        accumulator.fold.validate()?;
        Ok(Self { gate, accumulator })
    }

    /// Current committed value.
    #[must_use]
    pub fn value(&self) -> Fe {
        self.gate.read().aggregate(&self.accumulator.name)
    }

    /// `state = fold(state, value)`, guarded by the gate's precondition.
    ///
    /// # Errors
    /// `Conflict` if another writer committed between read and write.
    pub fn apply_direct(&self, value: Fe) -> Result<Fe> {
        let expected = self.gate.read();
        let prior = expected.aggregate(&self.accumulator.name);
        let next_value = self.accumulator.fold.apply(prior, value)?;
        let mut aggregates = expected.aggregates.clone();
        aggregates.insert(self.accumulator.name.clone(), next_value);
        let next = expected.successor(aggregates, expected.cursor);
        self.gate.commit(&expected, next)?;
        Ok(next_value)
    }
}

/// Proof-chain strategy: each contribution extends a recursive chain and the
/// head digest is committed as the cursor.
#[derive(Debug)]
pub struct ChainAggregator<E, L> {
    chain: Mutex<ProofChain<E>>,
    gate: StateGate<L>,
    name: String,
}

impl<E: ProvingEngine, L: LedgerStore> ChainAggregator<E, L> {
    /// Commit `chain`'s aggregate under accumulator `name`.
    pub fn new(chain: ProofChain<E>, gate: StateGate<L>, name: impl Into<String>) -> Self {
        Self {
            chain: Mutex::new(chain),
            gate,
            name: name.into(),
        }
    }

    /// Gate this aggregator commits through.
    #[must_use]
    pub const fn gate(&self) -> &StateGate<L> {
        &self.gate
    }

    /// Current head proof.
    #[must_use]
    pub fn head(&self) -> Option<Proof> {
        self.lock().head().cloned()
    }

    /// Verify any proof of this chain's circuit.
    #[must_use]
    pub fn verify(&self, proof: &Proof) -> bool {
        self.lock().verify(proof)
    }

    /// Committed aggregate (zero before the first extension).
    #[must_use]
    pub fn aggregate(&self) -> Fe {
        self.gate.read().aggregate(&self.name)
    }

    /// Prove `value` into the chain and commit the new head.
    ///
    /// The chain only advances after the commit succeeds, so a `Conflict`
    /// leaves both chain and ledger untouched.
    pub fn extend_chain(&self, value: Fe) -> Result<Proof> {
        let mut chain = self.lock();
        let expected = self.expected_for(&chain)?;
        let next = chain.prove_next(value)?;
        self.commit_step(&expected, &next.step)?;
        Ok(chain.install_next(next))
    }

    /// Verify an externally produced successor of the head and commit it.
    pub fn accept_proof(&self, proof: Proof) -> Result<()> {
        let mut chain = self.lock();
        let expected = self.expected_for(&chain)?;
        chain.check_successor(&proof)?;
        self.commit_step(&expected, &proof)?;
        chain.install_next(NextStep {
            base: None,
            step: proof,
        });
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProofChain<E>> {
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Committed record, checked against the in-memory head.
    fn expected_for(&self, chain: &ProofChain<E>) -> Result<StateRecord> {
        let expected = self.gate.read();
        let in_sync = chain.head().map_or(expected.counter == 0, |h| {
            expected.cursor == ChainHash(h.digest())
        });
        if in_sync {
            Ok(expected)
        } else {
            warn!(key = self.gate.key(), "ledger moved past the local chain head");
            Err(AggError::Conflict {
                key: self.gate.key().to_owned(),
            })
        }
    }

    fn commit_step(&self, expected: &StateRecord, step: &Proof) -> Result<()> {
        let mut aggregates = expected.aggregates.clone();
        aggregates.insert(self.name.clone(), step.public_input);
        let next = expected.successor(aggregates, ChainHash(step.digest()));
        self.gate.commit(expected, next)?;
        info!(key = self.gate.key(), position = step.position, "chain head committed");
        Ok(())
    }
}
