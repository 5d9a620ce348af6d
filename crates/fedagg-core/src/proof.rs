//! Proof artifacts exchanged with the proving engine.
//!
//! A [`Proof`] binds a public input (the aggregate after one chain step) to
//! engine-specific evidence in `proof_bytes`. Step proofs also carry a
//! [`PriorRef`] naming the public input and digest of the proof they extend,
//! so verifying the head of a chain transitively covers every earlier step.
//!
//! ## Backward/forward compatibility
//! - Do **not** add `#[serde(deny_unknown_fields)]` so newer producers with
//!   extra fields remain readable by older consumers.
//! - `meta` is free-form JSON for diagnostics. Never parse it in critical
//!   paths; promote anything load-bearing into a typed field.

use fedagg_crypto::{Blake3Transcript, Label, Transcript};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::field::Fe;

/// Identity of a compiled aggregation circuit (fold rule + canonical start).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CircuitId(pub [u8; 32]);

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &hex::encode(self.0)[..12])
    }
}

/// Which circuit branch produced a proof.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// `baseCase`: position 0, no prior proof.
    Base,
    /// `step`: extends a prior proof by one contribution.
    Step,
}

/// Reference from a step proof to the proof it extends.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriorRef {
    /// Public input (aggregate) of the prior proof.
    pub public_input: Fe,
    /// [`Proof::digest`] of the prior proof.
    pub digest: [u8; 32],
    /// Chain position of the prior proof.
    pub position: u64,
}

/// Serialized proof produced by a [`crate::ProvingEngine`].
///
/// **Invariants**
/// - `kind == Base` ⇔ `prior.is_none()` ⇔ `position == 0`.
/// - For steps, `position == prior.position + 1`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Proof {
    /// Circuit the proof was generated for.
    pub circuit: CircuitId,
    /// Base case or recursive step.
    pub kind: StepKind,
    /// Zero-based position in the chain.
    pub position: u64,
    /// Aggregate value after this step.
    pub public_input: Fe,
    /// Proof being extended (steps only).
    #[serde(default)]
    pub prior: Option<PriorRef>,
    /// Opaque, engine-specific encoding of the evidence.
    pub proof_bytes: Vec<u8>,
    /// Free-form metadata for debugging/observability.
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl Proof {
    /// Stable digest over every bound field (everything except `meta`).
    ///
    /// This is what the next step's [`PriorRef::digest`] points at.
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        let mut tr = Blake3Transcript::new(Label::ProofDigest.as_str());
        tr.absorb("circuit", &self.circuit.0);
        tr.absorb(
            "kind",
            match self.kind {
                StepKind::Base => b"base",
                StepKind::Step => b"step",
            },
        );
        tr.absorb_u64("position", self.position);
        tr.absorb_labeled(Label::Value, &self.public_input.to_le_bytes());
        if let Some(p) = &self.prior {
            tr.absorb("prior.public_input", &p.public_input.to_le_bytes());
            tr.absorb_labeled(Label::Previous, &p.digest);
            tr.absorb_u64("prior.position", p.position);
        }
        tr.absorb("proof_bytes", &self.proof_bytes);
        tr.challenge_32("digest")
    }

    /// Reference to this proof for use as the prior of the next step.
    #[inline]
    #[must_use]
    pub fn as_prior(&self) -> PriorRef {
        PriorRef {
            public_input: self.public_input,
            digest: self.digest(),
            position: self.position,
        }
    }

    /// Whether `kind`, `position` and `prior` agree with each other.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        match (self.kind, &self.prior) {
            (StepKind::Base, None) => self.position == 0,
            (StepKind::Step, Some(p)) => p.position.checked_add(1) == Some(self.position),
            _ => false,
        }
    }

    /// Length of the proof bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.proof_bytes.len()
    }

    /// Whether the proof byte vector is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proof_bytes.is_empty()
    }
}

/// Verification key handed out by [`crate::ProvingEngine::setup`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationKey {
    /// Circuit this key verifies.
    pub circuit: CircuitId,
    /// Engine-specific key material.
    pub key_bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Proof {
        Proof {
            circuit: CircuitId([1u8; 32]),
            kind: StepKind::Base,
            position: 0,
            public_input: Fe::ZERO,
            prior: None,
            proof_bytes: vec![1, 2, 3],
            meta: json!({"k": "v"}),
        }
    }

    #[test]
    fn digest_ignores_meta_but_binds_public_input() {
        let a = base();
        let mut b = a.clone();
        b.meta = serde_json::Value::Null;
        assert_eq!(a.digest(), b.digest());

        let mut c = a.clone();
        c.public_input = Fe::from_u64(1);
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn well_formedness() {
        let b = base();
        assert!(b.is_well_formed());
        let mut s = b.clone();
        s.kind = StepKind::Step;
        s.position = 1;
        s.prior = Some(b.as_prior());
        assert!(s.is_well_formed());
        s.position = 2;
        assert!(!s.is_well_formed());
        let mut bad = b;
        bad.prior = Some(s.as_prior());
        assert!(!bad.is_well_formed());
    }

    #[test]
    fn missing_meta_is_tolerated() {
        let mut v = serde_json::to_value(base()).unwrap();
        v.as_object_mut().unwrap().remove("meta");
        v.as_object_mut().unwrap().remove("prior");
        let de: Proof = serde_json::from_value(v).unwrap();
        assert_eq!(de.meta, serde_json::Value::Null);
        assert_eq!(de.prior, None);
    }
}
