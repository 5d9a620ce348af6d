//! Crate-wide error taxonomy.
//!
//! Circuit and soundness failures are fatal for the operation that raised them
//! and are always returned before any state mutation. `Conflict` and
//! `ProofGeneration` are recoverable: callers re-read and retry.

use thiserror::Error;

use crate::types::ChainHash;

/// Errors raised by fedagg operations.
#[derive(Debug, Error)]
pub enum AggError {
    /// A circuit predicate did not hold; no proof was produced.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The prior proof handed to a recursive step failed verification.
    #[error("invalid prior proof: {0}")]
    InvalidPriorProof(String),

    /// Optimistic-concurrency collision on commit; re-read and recompute.
    #[error("state conflict on key `{key}`: committed state changed since it was read")]
    Conflict {
        /// Ledger key the commit targeted.
        key: String,
    },

    /// The external proving engine failed to produce a proof.
    #[error("proof generation failed: {0}")]
    ProofGeneration(String),

    /// A fold function was configured with a zero divisor.
    #[error("division by zero in fold `{0}`")]
    DivisionByZero(String),

    /// A fold function could not be evaluated over its inputs.
    #[error("arithmetic domain error: {0}")]
    ArithmeticDomain(String),

    /// A fold, accumulator set or setting was configured inconsistently.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Proof-chain state machine misuse.
    #[error("invalid chain transition: {0}")]
    InvalidTransition(String),

    /// A query cursor does not name any entry of the log.
    #[error("unknown cursor {0}")]
    UnknownCursor(ChainHash),

    /// Recomputing the hash chain disagreed with a recorded entry.
    #[error("action log tampered at position {position}")]
    TamperedLog {
        /// Zero-based position of the first inconsistent entry.
        position: usize,
    },

    /// Serialization or decoding failure.
    #[error("codec error: {0}")]
    Codec(String),

    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AggError {
    /// Whether the caller should re-read state and try again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::ProofGeneration(_))
    }
}

/// Result alias used across fedagg-core.
pub type Result<T, E = AggError> = std::result::Result<T, E>;
