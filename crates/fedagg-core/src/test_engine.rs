//! Unkeyed test double for [`ProvingEngine`], used by unit tests in this crate.

use fedagg_crypto::{Blake3Transcript, Transcript};

use crate::circuit::AggregationCircuit;
use crate::engine::{PrivateInputs, ProvingEngine};
use crate::error::Result;
use crate::field::Fe;
use crate::proof::{CircuitId, Proof, StepKind, VerificationKey};

/// Evidence is a plain hash of the statement.
pub struct EchoEngine;

fn statement_hash(p: &Proof) -> Vec<u8> {
    let mut tr = Blake3Transcript::new("fedagg/test-echo");
    tr.absorb("circuit", &p.circuit.0);
    tr.absorb_u64("position", p.position);
    tr.absorb("public_input", &p.public_input.to_le_bytes());
    if let Some(prior) = &p.prior {
        tr.absorb("prior", &prior.digest);
        tr.absorb("prior.public_input", &prior.public_input.to_le_bytes());
    }
    tr.challenge_bytes("echo", 32)
}

impl ProvingEngine for EchoEngine {
    fn setup(&self, circuit: &CircuitId) -> Result<VerificationKey> {
        Ok(VerificationKey {
            circuit: *circuit,
            key_bytes: Vec::new(),
        })
    }

    fn generate_proof(
        &self,
        circuit: &AggregationCircuit,
        public_input: Fe,
        private_inputs: PrivateInputs<'_>,
    ) -> Result<Proof> {
        circuit.check(self, public_input, private_inputs)?;
        let (kind, position, prior) = match private_inputs {
            PrivateInputs::Base => (StepKind::Base, 0, None),
            PrivateInputs::Step { prior, .. } => {
                (StepKind::Step, prior.position + 1, Some(prior.as_prior()))
            }
        };
        let mut p = Proof {
            circuit: *circuit.id(),
            kind,
            position,
            public_input,
            prior,
            proof_bytes: Vec::new(),
            meta: serde_json::Value::Null,
        };
        p.proof_bytes = statement_hash(&p);
        Ok(p)
    }

    fn verify_proof(&self, proof: &Proof, vk: &VerificationKey) -> bool {
        proof.circuit == vk.circuit && proof.is_well_formed() && statement_hash(proof) == proof.proof_bytes
    }
}
