//! Proving-engine abstraction.
//!
//! The cryptographic engine (arithmetization, curves, proof encoding) is an
//! external collaborator. fedagg only depends on this seam: set up a
//! verification key for a circuit, generate a proof for a statement, and
//! verify a proof in constant time with respect to chain length.
//!
//! ## Contracts implementors should uphold
//! - `generate_proof` must evaluate the circuit predicate
//!   ([`AggregationCircuit::check`]) before producing any evidence, and fail
//!   with its error when the predicate does not hold.
//! - `generate_proof` must bind the proof to the circuit id, `public_input`,
//!   and, for steps, the prior proof's [`crate::PriorRef`].
//! - `verify_proof` must reject if the proof's circuit differs from the key's,
//!   if the proof is not well formed, or if the evidence fails its checks.
//! - Neither function should panic for malformed inputs.

use crate::circuit::AggregationCircuit;
use crate::error::Result;
use crate::field::Fe;
use crate::proof::{CircuitId, Proof, VerificationKey};
use std::sync::Arc;

/// Private witness for one circuit invocation.
#[derive(Debug, Clone, Copy)]
pub enum PrivateInputs<'a> {
    /// `baseCase` has no private inputs.
    Base,
    /// `step` consumes the incoming contribution and the proof it extends.
    Step {
        /// Contribution folded in by this step.
        incoming: Fe,
        /// Proof being extended.
        prior: &'a Proof,
    },
}

/// Minimal engine API the rest of the system depends on.
///
/// Proof generation is treated as blocking and potentially expensive.
pub trait ProvingEngine {
    /// Produce the verification key for `circuit`.
    ///
    /// # Errors
    /// Returns an error if the engine cannot compile/set up the circuit.
    fn setup(&self, circuit: &CircuitId) -> Result<VerificationKey>;

    /// Produce a proof for `public_input` under `circuit`.
    ///
    /// # Errors
    /// - `ConstraintViolation` / `InvalidPriorProof` if the circuit predicate
    ///   rejects the statement;
    /// - [`crate::AggError::ProofGeneration`] if the engine itself fails.
    fn generate_proof(
        &self,
        circuit: &AggregationCircuit,
        public_input: Fe,
        private_inputs: PrivateInputs<'_>,
    ) -> Result<Proof>;

    /// Verify `proof` against `vk`. Never panics.
    #[must_use]
    fn verify_proof(&self, proof: &Proof, vk: &VerificationKey) -> bool;
}

impl<E: ProvingEngine + ?Sized> ProvingEngine for &E {
    fn setup(&self, circuit: &CircuitId) -> Result<VerificationKey> {
        (**self).setup(circuit)
    }

    fn generate_proof(
        &self,
        circuit: &AggregationCircuit,
        public_input: Fe,
        private_inputs: PrivateInputs<'_>,
    ) -> Result<Proof> {
        (**self).generate_proof(circuit, public_input, private_inputs)
    }

    fn verify_proof(&self, proof: &Proof, vk: &VerificationKey) -> bool {
        (**self).verify_proof(proof, vk)
    }
}

impl<E: ProvingEngine + ?Sized> ProvingEngine for Arc<E> {
    fn setup(&self, circuit: &CircuitId) -> Result<VerificationKey> {
        (**self).setup(circuit)
    }

    fn generate_proof(
        &self,
        circuit: &AggregationCircuit,
        public_input: Fe,
        private_inputs: PrivateInputs<'_>,
    ) -> Result<Proof> {
        (**self).generate_proof(circuit, public_input, private_inputs)
    }

    fn verify_proof(&self, proof: &Proof, vk: &VerificationKey) -> bool {
        (**self).verify_proof(proof, vk)
    }
}
