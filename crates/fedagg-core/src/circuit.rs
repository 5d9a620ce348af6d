//! The aggregation circuit: base-case and step predicates for a configured fold.
//!
//! The circuit is a pure predicate. It holds no mutable state, so identical
//! inputs always give identical accept/reject outcomes. The only external
//! call is the verification of the prior proof, delegated to the engine.

use fedagg_crypto::{Blake3Transcript, Label, Transcript};
use tracing::debug;

use crate::engine::{PrivateInputs, ProvingEngine};
use crate::error::{AggError, Result};
use crate::field::Fe;
use crate::fold_fn::FoldFn;
use crate::proof::{CircuitId, Proof, VerificationKey};

/// Compiled aggregation circuit for one fold rule.
#[derive(Debug, Clone)]
pub struct AggregationCircuit {
    id: CircuitId,
    fold: FoldFn,
    start: Fe,
    vk: VerificationKey,
}

impl AggregationCircuit {
    /// Compile a circuit whose chains start at the additive identity.
    ///
    /// The fold is validated first, so a zero divisor fails with
    /// `DivisionByZero` before anything is evaluated.
    pub fn new<E: ProvingEngine>(engine: &E, fold: FoldFn) -> Result<Self> {
        Self::with_start(engine, fold, Fe::ZERO)
    }

    /// Compile a circuit with an explicit canonical start value.
    pub fn with_start<E: ProvingEngine>(engine: &E, fold: FoldFn, start: Fe) -> Result<Self> {
        fold.validate()?;
        let id = Self::circuit_id(&fold, start);
        let vk = engine.setup(&id)?;
        debug!(circuit = %id, fold = %fold.descriptor(), "compiled aggregation circuit");
        Ok(Self {
            id,
            fold,
            start,
            vk,
        })
    }

    /// Derive the circuit id from the fold descriptor and the start value.
    #[must_use]
    pub fn circuit_id(fold: &FoldFn, start: Fe) -> CircuitId {
        let mut tr = Blake3Transcript::new(Label::Circuit.as_str());
        tr.absorb("fold", fold.descriptor().as_bytes());
        tr.absorb("start", &start.to_le_bytes());
        CircuitId(tr.challenge_32("id"))
    }

    /// Circuit identity.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> &CircuitId {
        &self.id
    }

    /// Configured fold.
    #[inline]
    #[must_use]
    pub const fn fold(&self) -> &FoldFn {
        &self.fold
    }

    /// Canonical start value.
    #[inline]
    #[must_use]
    pub const fn start(&self) -> Fe {
        self.start
    }

    /// Verification key obtained at setup.
    #[inline]
    #[must_use]
    pub const fn verification_key(&self) -> &VerificationKey {
        &self.vk
    }

    /// `baseCase(publicInput)`: the public input must equal the canonical start.
    pub fn base_case(&self, public_input: Fe) -> Result<()> {
        if public_input == self.start {
            Ok(())
        } else {
            Err(AggError::ConstraintViolation(format!(
                "base case expects {}, got {public_input}",
                self.start
            )))
        }
    }

    /// `step(publicInput, priorPublicInput, priorProof)` with private `incoming`.
    ///
    /// 1. the prior proof must verify under this circuit's key and carry
    ///    `prior_public_input` (`InvalidPriorProof` otherwise);
    /// 2. `public_input == fold(prior_public_input, incoming)`
    ///    (`ConstraintViolation` otherwise).
    pub fn step<E: ProvingEngine>(
        &self,
        engine: &E,
        public_input: Fe,
        prior_public_input: Fe,
        prior_proof: &Proof,
        incoming: Fe,
    ) -> Result<()> {
        if prior_proof.circuit != self.id {
            return Err(AggError::InvalidPriorProof(format!(
                "prior proof is for circuit {}, expected {}",
                prior_proof.circuit, self.id
            )));
        }
        if prior_proof.public_input != prior_public_input {
            return Err(AggError::InvalidPriorProof(format!(
                "prior proof attests {}, caller claimed {prior_public_input}",
                prior_proof.public_input
            )));
        }
        if !engine.verify_proof(prior_proof, &self.vk) {
            return Err(AggError::InvalidPriorProof(format!(
                "prior proof at position {} failed verification",
                prior_proof.position
            )));
        }

        let expected = self.fold.apply(prior_public_input, incoming)?;
        if public_input != expected {
            return Err(AggError::ConstraintViolation(format!(
                "step expects {} = {}({prior_public_input}, ·), got {public_input}",
                expected,
                self.fold.descriptor()
            )));
        }
        Ok(())
    }

    /// Evaluate the predicate selected by `inputs` for `public_input`.
    ///
    /// Engines run this before emitting evidence, so a verifying proof
    /// implies its predicate held.
    pub fn check<E: ProvingEngine>(
        &self,
        engine: &E,
        public_input: Fe,
        inputs: PrivateInputs<'_>,
    ) -> Result<()> {
        match inputs {
            PrivateInputs::Base => self.base_case(public_input),
            PrivateInputs::Step { incoming, prior } => {
                self.step(engine, public_input, prior.public_input, prior, incoming)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_engine::EchoEngine;

    fn fe(x: u64) -> Fe {
        Fe::from_u64(x)
    }

    #[test]
    fn base_case_accepts_only_start() {
        let c = AggregationCircuit::new(&EchoEngine, FoldFn::Sum).unwrap();
        assert!(c.base_case(Fe::ZERO).is_ok());
        assert!(matches!(
            c.base_case(fe(1)),
            Err(AggError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn step_checks_prior_then_fold() {
        let e = EchoEngine;
        let c = AggregationCircuit::new(&e, FoldFn::Sum).unwrap();
        let base = e.generate_proof(&c, Fe::ZERO, PrivateInputs::Base).unwrap();

        assert!(c.step(&e, fe(5), Fe::ZERO, &base, fe(5)).is_ok());
        assert!(matches!(
            c.step(&e, fe(6), Fe::ZERO, &base, fe(5)),
            Err(AggError::ConstraintViolation(_))
        ));
        // Claiming a different prior aggregate than the proof attests.
        assert!(matches!(
            c.step(&e, fe(6), fe(1), &base, fe(5)),
            Err(AggError::InvalidPriorProof(_))
        ));

        let mut forged = base;
        forged.proof_bytes[0] ^= 1;
        assert!(matches!(
            c.step(&e, fe(5), Fe::ZERO, &forged, fe(5)),
            Err(AggError::InvalidPriorProof(_))
        ));
    }

    #[test]
    fn check_dispatches_on_inputs() {
        let e = EchoEngine;
        let c = AggregationCircuit::new(&e, FoldFn::Mean { window: 2 }).unwrap();
        assert!(matches!(
            c.check(&e, fe(3), PrivateInputs::Base),
            Err(AggError::ConstraintViolation(_))
        ));
        let base = e.generate_proof(&c, Fe::ZERO, PrivateInputs::Base).unwrap();
        let step = PrivateInputs::Step {
            incoming: fe(10),
            prior: &base,
        };
        assert!(c.check(&e, fe(5), step).is_ok());
        assert!(matches!(
            c.check(&e, fe(10), step),
            Err(AggError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn circuit_identity_tracks_fold() {
        let sum = AggregationCircuit::circuit_id(&FoldFn::Sum, Fe::ZERO);
        let mean = AggregationCircuit::circuit_id(&FoldFn::Mean { window: 2 }, Fe::ZERO);
        assert_ne!(sum, mean);
        assert_eq!(sum, AggregationCircuit::circuit_id(&FoldFn::Sum, Fe::ZERO));
        assert!(matches!(
            AggregationCircuit::new(&EchoEngine, FoldFn::Mean { window: 0 }),
            Err(AggError::DivisionByZero(_))
        ));
    }
}
