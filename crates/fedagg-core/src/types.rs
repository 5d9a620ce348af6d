//! Canonical core types shared across the fedagg workspace.
//!
//! These are re-exported at the crate root so other crates can import via
//! `fedagg_core::ActionEntry`, `fedagg_core::ChainHash`, etc.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::field::Fe;

/// A value submitted by a party. Immutable once accepted.
pub type Contribution = Fe;

/// 32-byte link of the action-log hash chain.
///
/// Also used as the rollup cursor: the hash of the last entry already folded
/// into committed state.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainHash(pub [u8; 32]);

impl ChainHash {
    /// Borrow the raw digest bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from 64 hex characters.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let bytes = hex::decode(s).map_err(|e| crate::AggError::Codec(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| crate::AggError::Codec("chain hash must be 32 bytes".into()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix is enough for logs; use `to_hex` for the full digest.
        write!(f, "{}…", &self.to_hex()[..12])
    }
}

/// Cursor into the action log (see [`ChainHash`]).
pub type Cursor = ChainHash;

/// One entry of the append-only action log.
///
/// `chain_hash = H(value, previous_chain_hash)`; position is implicit in order.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionEntry {
    /// Contributed value.
    pub value: Contribution,
    /// Link binding this entry to everything before it.
    pub chain_hash: ChainHash,
}

/// A committed aggregate paired with the cursor it was folded up to.
///
/// The two fields are only ever updated together.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggregateState {
    /// Folded value.
    pub value: Fe,
    /// Hash of the last entry folded into `value`.
    pub cursor: Cursor,
}

impl AggregateState {
    /// Construct a new state pair.
    #[inline]
    #[must_use]
    pub const fn new(value: Fe, cursor: Cursor) -> Self {
        Self { value, cursor }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_hash_hex_roundtrip() {
        let h = ChainHash([0xab; 32]);
        let s = h.to_hex();
        assert_eq!(s.len(), 64);
        assert_eq!(ChainHash::from_hex(&s).unwrap(), h);
        assert!(ChainHash::from_hex("abcd").is_err());
        assert_eq!(h.to_string(), "abababababab…");
    }
}
