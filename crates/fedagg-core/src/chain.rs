//! Recursive proof chain driver.
//!
//! Each call to [`ProofChain::extend`] proves that the new aggregate is the
//! fold of the prior aggregate with one contribution **and** that the prior
//! proof verified. Verifying the head therefore certifies every step from
//! position 0, at a cost independent of the chain length.
//!
//! State machine: `Empty --base_case--> Populated(0) --step--> Populated(n+1)`.
//!
//! A chain is single-writer: `extend` takes `&mut self`, and the prior proof
//! must be the current head. Independent chains share nothing and may be
//! driven from separate threads.

use tracing::{info, warn};

use crate::circuit::AggregationCircuit;
use crate::engine::{PrivateInputs, ProvingEngine};
use crate::error::{AggError, Result};
use crate::field::Fe;
use crate::fold_fn::FoldFn;
use crate::proof::Proof;

/// Observable state of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// No base case yet.
    Empty,
    /// Head proof sits at this position.
    Populated(u64),
}

/// Proofs computed ahead of installation (see [`ProofChain::extend_head`]).
#[derive(Debug, Clone)]
pub(crate) struct NextStep {
    /// Base proof, present when the chain was empty.
    pub(crate) base: Option<Proof>,
    /// The step proof that becomes the new head.
    pub(crate) step: Proof,
}

/// Sequential driver over one [`AggregationCircuit`].
#[derive(Debug)]
pub struct ProofChain<E> {
    engine: E,
    circuit: AggregationCircuit,
    head: Option<Proof>,
}

impl<E: ProvingEngine> ProofChain<E> {
    /// Compile a circuit for `fold` and start an empty chain.
    pub fn new(engine: E, fold: FoldFn) -> Result<Self> {
        let circuit = AggregationCircuit::new(&engine, fold)?;
        Ok(Self::with_circuit(engine, circuit))
    }

    /// Start an empty chain over an already compiled circuit.
    #[must_use]
    pub fn with_circuit(engine: E, circuit: AggregationCircuit) -> Self {
        Self {
            engine,
            circuit,
            head: None,
        }
    }

    /// Re-enter `Populated(n)` from a retained head proof.
    ///
    /// # Errors
    /// `InvalidPriorProof` if `head` does not verify under this circuit.
    pub fn resume(engine: E, circuit: AggregationCircuit, head: Proof) -> Result<Self> {
        let chain = Self::with_circuit(engine, circuit);
        if !chain.verify(&head) {
            return Err(AggError::InvalidPriorProof(format!(
                "cannot resume from unverifiable head at position {}",
                head.position
            )));
        }
        Ok(Self {
            head: Some(head),
            ..chain
        })
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ChainState {
        self.head
            .as_ref()
            .map_or(ChainState::Empty, |h| ChainState::Populated(h.position))
    }

    /// Most recently accepted proof.
    #[inline]
    #[must_use]
    pub fn head(&self) -> Option<&Proof> {
        self.head.as_ref()
    }

    /// Aggregate attested by the head, if any.
    #[must_use]
    pub fn aggregate(&self) -> Option<Fe> {
        self.head.as_ref().map(|h| h.public_input)
    }

    /// Underlying circuit.
    #[inline]
    #[must_use]
    pub const fn circuit(&self) -> &AggregationCircuit {
        &self.circuit
    }

    /// Constant-cost verification of any proof of this chain's circuit.
    #[must_use]
    pub fn verify(&self, proof: &Proof) -> bool {
        proof.circuit == *self.circuit.id()
            && self
                .engine
                .verify_proof(proof, self.circuit.verification_key())
    }

    /// Run the base case on an empty chain.
    pub fn base_case(&mut self, public_input: Fe) -> Result<Proof> {
        let proof = self.prove_base(public_input)?;
        self.install(proof.clone());
        Ok(proof)
    }

    /// `extend(value, priorProof)`.
    ///
    /// With `None` this is the base case (`value` must be the canonical
    /// start); otherwise `prior` must be the current head and `value` is
    /// folded into its aggregate.
    pub fn extend(&mut self, value: Fe, prior: Option<&Proof>) -> Result<Proof> {
        let proof = match prior {
            None => self.prove_base(value)?,
            Some(p) => self.prove_step(value, p)?,
        };
        self.install(proof.clone());
        Ok(proof)
    }

    /// Extend from the chain's own head, running the base case first on an
    /// empty chain.
    pub fn extend_head(&mut self, value: Fe) -> Result<Proof> {
        let next = self.prove_next(value)?;
        Ok(self.install_next(next))
    }

    /// Adopt a proof produced elsewhere (e.g. by a remote prover) as the new
    /// head, after [`Self::check_successor`].
    pub fn accept(&mut self, proof: Proof) -> Result<()> {
        self.check_successor(&proof)?;
        self.install(proof);
        Ok(())
    }

    /// Whether `proof` verifies and directly extends the current head.
    ///
    /// On an empty chain only a base proof of the canonical start qualifies.
    ///
    /// # Errors
    /// - `InvalidPriorProof` if `proof` does not verify.
    /// - `InvalidTransition` if it does not link to the head.
    pub fn check_successor(&self, proof: &Proof) -> Result<()> {
        if !self.verify(proof) {
            warn!(position = proof.position, "rejected unverifiable proof");
            return Err(AggError::InvalidPriorProof(format!(
                "proof at position {} does not verify under circuit {}",
                proof.position,
                self.circuit.id()
            )));
        }
        match (&self.head, &proof.prior) {
            (None, None) => self.circuit.base_case(proof.public_input),
            (Some(head), Some(prior)) if prior.digest == head.digest() => Ok(()),
            (head, _) => {
                warn!(
                    position = proof.position,
                    head_position = head.as_ref().map(|h| h.position),
                    "rejected proof that does not extend the head"
                );
                Err(AggError::InvalidTransition(format!(
                    "proof at position {} does not extend the current head",
                    proof.position
                )))
            }
        }
    }

    /// Compute the proof(s) that extend the head by `value` without touching
    /// the chain. An empty chain yields the base proof as well.
    pub(crate) fn prove_next(&self, value: Fe) -> Result<NextStep> {
        match &self.head {
            Some(head) => Ok(NextStep {
                base: None,
                step: self.prove_step_from(value, head)?,
            }),
            None => {
                let base = self.prove_base(self.circuit.start())?;
                let step = self.prove_step_from(value, &base)?;
                Ok(NextStep {
                    base: Some(base),
                    step,
                })
            }
        }
    }

    /// Install a [`NextStep`] computed by [`Self::prove_next`].
    pub(crate) fn install_next(&mut self, next: NextStep) -> Proof {
        if let Some(base) = next.base {
            self.install(base);
        }
        self.install(next.step.clone());
        next.step
    }

    fn prove_base(&self, public_input: Fe) -> Result<Proof> {
        if let Some(h) = &self.head {
            return Err(AggError::InvalidTransition(format!(
                "base case on a chain already at position {}",
                h.position
            )));
        }
        self.engine
            .generate_proof(&self.circuit, public_input, PrivateInputs::Base)
    }

    fn prove_step(&self, value: Fe, prior: &Proof) -> Result<Proof> {
        let head = self.head.as_ref().ok_or_else(|| {
            AggError::InvalidTransition("step on an empty chain; run the base case or resume".into())
        })?;
        if prior.digest() != head.digest() {
            warn!(
                prior_position = prior.position,
                head_position = head.position,
                "rejected extension from a stale prior proof"
            );
            return Err(AggError::InvalidTransition(format!(
                "prior proof at position {} is not the chain head (position {})",
                prior.position, head.position
            )));
        }
        self.prove_step_from(value, prior)
    }

    fn prove_step_from(&self, value: Fe, prior: &Proof) -> Result<Proof> {
        let public_input = self.circuit.fold().apply(prior.public_input, value)?;
        self.engine.generate_proof(
            &self.circuit,
            public_input,
            PrivateInputs::Step {
                incoming: value,
                prior,
            },
        )
    }

    fn install(&mut self, proof: Proof) {
        info!(
            position = proof.position,
            aggregate = %proof.public_input,
            "proof chain advanced"
        );
        self.head = Some(proof);
    }
}
