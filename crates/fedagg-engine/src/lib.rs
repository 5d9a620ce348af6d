//! fedagg-engine: a deterministic keyed-MAC [`ProvingEngine`].
//!
//! Each proof carries a transcript MAC over the statement
//! `(circuit, kind, position, public_input, prior)` under a per-circuit key
//! derived from the engine seed. A MAC is only produced after the circuit
//! predicate held for the statement, including verification of the prior
//! proof, so a verifying head transitively covers the whole chain.
//!
//! ⚠️ **Security note:** this is a simulation engine. It gives integrity
//! against parties without the seed and nothing else: no zero knowledge, no
//! public verifiability.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]

use std::sync::atomic::{AtomicU32, Ordering};

use fedagg_core::{
    AggError, AggregationCircuit, CircuitId, Fe, PriorRef, PrivateInputs, Proof, ProvingEngine,
    Result, StepKind, VerificationKey,
};
use fedagg_crypto::{Blake3Transcript, Label, Transcript};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Wire version of [`MacBody`].
pub const MAC_WIRE_VERSION: u16 = 1;

/// Engine tag written into `Proof::meta`.
pub const ENGINE_TAG: &str = "mac-v1";

/// Decoded `proof_bytes` of a MAC proof.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MacBody {
    /// Wire version tag.
    pub version: u16,
    /// Keyed transcript MAC over the statement.
    pub mac: [u8; 32],
}

/// Keyed-MAC proving engine.
#[derive(Debug, Default)]
pub struct MacEngine {
    seed: u64,
    /// Remaining `generate_proof` calls to fail (test knob).
    inject: AtomicU32,
}

impl MacEngine {
    /// Engine whose circuit keys derive from `seed`.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            seed,
            inject: AtomicU32::new(0),
        }
    }

    /// Seed this engine derives keys from.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Make the next `n` calls to `generate_proof` fail with `ProofGeneration`.
    pub fn inject_failures(&self, n: u32) {
        self.inject.store(n, Ordering::SeqCst);
    }

    fn take_injected(&self) -> bool {
        self.inject
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn circuit_key(&self, circuit: &CircuitId) -> [u8; 32] {
        let mut tr = Blake3Transcript::new(Label::EngineKey.as_str());
        tr.absorb_u64("seed", self.seed);
        tr.absorb("circuit", &circuit.0);
        tr.challenge_32("key")
    }

    /// Public fingerprint of a circuit key; this is what the verification key
    /// carries, so keys from another seed are rejected up front.
    fn key_fingerprint(key: &[u8; 32]) -> Vec<u8> {
        let mut tr = Blake3Transcript::new(Label::EngineKey.as_str());
        tr.absorb("key", key);
        tr.challenge_bytes("fingerprint", 16)
    }

    fn statement_mac(
        key: &[u8; 32],
        circuit: &CircuitId,
        kind: StepKind,
        position: u64,
        public_input: Fe,
        prior: Option<&PriorRef>,
    ) -> [u8; 32] {
        let mut tr = Blake3Transcript::keyed(Label::Statement.as_str(), key);
        tr.absorb("circuit", &circuit.0);
        tr.absorb(
            "kind",
            match kind {
                StepKind::Base => b"base",
                StepKind::Step => b"step",
            },
        );
        tr.absorb_u64("position", position);
        tr.absorb_labeled(Label::Value, &public_input.to_le_bytes());
        if let Some(p) = prior {
            tr.absorb("prior.public_input", &p.public_input.to_le_bytes());
            tr.absorb_labeled(Label::Previous, &p.digest);
            tr.absorb_u64("prior.position", p.position);
        }
        tr.challenge_32("mac")
    }

    /// Recompute and compare the MAC of `proof` under `key`.
    fn check_mac(key: &[u8; 32], proof: &Proof) -> bool {
        let Ok(body) = bincode::deserialize::<MacBody>(&proof.proof_bytes) else {
            return false;
        };
        if body.version != MAC_WIRE_VERSION {
            return false;
        }
        let expect = Self::statement_mac(
            key,
            &proof.circuit,
            proof.kind,
            proof.position,
            proof.public_input,
            proof.prior.as_ref(),
        );
        expect == body.mac
    }
}

impl ProvingEngine for MacEngine {
    fn setup(&self, circuit: &CircuitId) -> Result<VerificationKey> {
        Ok(VerificationKey {
            circuit: *circuit,
            key_bytes: Self::key_fingerprint(&self.circuit_key(circuit)),
        })
    }

    fn generate_proof(
        &self,
        circuit: &AggregationCircuit,
        public_input: Fe,
        private_inputs: PrivateInputs<'_>,
    ) -> Result<Proof> {
        if self.take_injected() {
            warn!(circuit = %circuit.id(), "injected proof generation failure");
            return Err(AggError::ProofGeneration("injected failure".into()));
        }
        let id = circuit.id();
        let key = self.circuit_key(id);
        if Self::key_fingerprint(&key) != circuit.verification_key().key_bytes {
            return Err(AggError::ProofGeneration(format!(
                "circuit {id} was set up under a different engine key"
            )));
        }
        // No evidence for statements the circuit rejects.
        circuit.check(self, public_input, private_inputs)?;

        let (kind, position, prior) = match private_inputs {
            PrivateInputs::Base => (StepKind::Base, 0, None),
            PrivateInputs::Step { incoming, prior } => {
                let position = prior.position.checked_add(1).ok_or_else(|| {
                    AggError::ProofGeneration("chain position overflow".into())
                })?;
                debug!(position, incoming = %incoming, "binding step statement");
                (StepKind::Step, position, Some(prior.as_prior()))
            }
        };

        let mac = Self::statement_mac(&key, id, kind, position, public_input, prior.as_ref());
        let proof_bytes = bincode::serialize(&MacBody {
            version: MAC_WIRE_VERSION,
            mac,
        })
        .map_err(|e| AggError::ProofGeneration(format!("encoding MAC body: {e}")))?;

        Ok(Proof {
            circuit: *id,
            kind,
            position,
            public_input,
            prior,
            proof_bytes,
            meta: serde_json::json!({ "engine": ENGINE_TAG, "position": position }),
        })
    }

    fn verify_proof(&self, proof: &Proof, vk: &VerificationKey) -> bool {
        if proof.circuit != vk.circuit || !proof.is_well_formed() {
            return false;
        }
        let key = self.circuit_key(&vk.circuit);
        if Self::key_fingerprint(&key) != vk.key_bytes {
            return false;
        }
        Self::check_mac(&key, proof)
    }
}
