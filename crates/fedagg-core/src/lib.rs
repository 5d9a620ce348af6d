//! fedagg-core: verifiable aggregation of scalar contributions.
//!
//! Two strategies share one data model and one fold vocabulary:
//! - a **recursive proof chain** ([`ProofChain`]) where each step proves the
//!   new aggregate is `fold(prior, incoming)` and that the prior proof
//!   verified, so the head certifies the whole history;
//! - an **action-log rollup** ([`Aggregator`]) where parties append to a
//!   hash-chained [`ActionLog`] and a [`Reducer`] folds the pending suffix
//!   into committed state through an optimistic [`StateGate`].
//!
//! The proving backend sits behind [`ProvingEngine`] and the durable store
//! behind [`LedgerStore`]; this crate ships neither a real SNARK nor a ledger
//! beyond [`InMemoryLedger`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use fedagg_core::prelude::*;
//!
//! let log = Arc::new(ActionLog::new());
//! let gate = StateGate::new(InMemoryLedger::new(), "rollup");
//! let agg = Aggregator::new(log, gate, vec![
//!     Accumulator::new("sum", FoldFn::Sum),
//!     Accumulator::new("count", FoldFn::Count),
//! ])?;
//! for v in [5, 10, 12] {
//!     agg.submit(Fe::from_u64(v));
//! }
//! let out = agg.rollup()?;
//! assert_eq!(out.aggregates["sum"], Fe::from_u64(27));
//! # Ok::<(), fedagg_core::AggError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::doc_markdown
)]

/// Hash-chained append-only log of contributions.
pub mod action_log;
/// Log rollup, direct and proof-chain front ends.
pub mod aggregator;
/// Recursive proof chain driver.
pub mod chain;
/// The aggregation circuit predicates.
pub mod circuit;
/// TOML configuration with environment overrides.
pub mod config;
/// Proving engine seam.
pub mod engine;
/// Error taxonomy.
pub mod error;
/// Goldilocks prime field.
pub mod field;
/// Fold functions.
pub mod fold_fn;
/// JSON/CBOR helpers and auto-detecting read/write APIs.
pub mod io;
/// Proof artifacts and verification keys.
pub mod proof;
/// Pure fold of pending entries.
pub mod reducer;
/// Ledger records and the compare-and-set gate.
pub mod state;
/// Canonical core data types shared across the workspace.
pub mod types;

#[cfg(test)]
mod test_engine;

pub use action_log::{chain_hash, empty_hash, ActionLog};
pub use aggregator::{Aggregator, ChainAggregator, DirectAggregate, PreparedRollup, RollupOutcome};
pub use chain::{ChainState, ProofChain};
pub use circuit::AggregationCircuit;
pub use config::AggConfig;
pub use engine::{PrivateInputs, ProvingEngine};
pub use error::{AggError, Result};
pub use field::{Fe, GOLDILOCKS};
pub use fold_fn::{CustomFold, FoldFn, FoldKind};
pub use proof::{CircuitId, PriorRef, Proof, StepKind, VerificationKey};
pub use reducer::{Accumulator, JointFold, Reducer};
pub use state::{InMemoryLedger, LedgerStore, StateGate, StateRecord};
pub use types::*;

/// Commonly-used items for quick imports.
///
/// ```rust
/// use fedagg_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Accumulator, ActionLog, AggError, AggregationCircuit, Aggregator, ChainAggregator, Fe,
        FoldFn, InMemoryLedger, Proof, ProofChain, ProvingEngine, StateGate,
    };
    pub use crate::types::*;
}
