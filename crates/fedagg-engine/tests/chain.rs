//! End-to-end proof chains over the MAC engine.

use std::sync::Arc;

use fedagg_core::{
    AggError, ChainAggregator, ChainHash, ChainState, Fe, FoldFn, InMemoryLedger, PrivateInputs,
    ProofChain, ProvingEngine, StateGate,
};
use fedagg_engine::MacEngine;
use proptest::prelude::*;

fn fe(x: u64) -> Fe {
    Fe::from_u64(x)
}

#[test]
fn sum_chain_scenario() {
    let mut chain = ProofChain::new(MacEngine::new(1), FoldFn::Sum).unwrap();
    let p0 = chain.extend(Fe::ZERO, None).unwrap();
    let p1 = chain.extend(fe(5), Some(&p0)).unwrap();
    let p2 = chain.extend(fe(10), Some(&p1)).unwrap();

    assert_eq!(p2.public_input, fe(15));
    assert_eq!(chain.state(), ChainState::Populated(2));
    for p in [&p0, &p1, &p2] {
        assert!(chain.verify(p));
    }
}

#[test]
fn mutated_intermediate_breaks_the_chain() {
    let mut chain = ProofChain::new(MacEngine::new(1), FoldFn::Sum).unwrap();
    let p0 = chain.extend(Fe::ZERO, None).unwrap();
    let p1 = chain.extend(fe(5), Some(&p0)).unwrap();

    let mut forged = p1.clone();
    forged.public_input = fe(500);
    assert!(!chain.verify(&forged));

    // A separate chain cannot be driven from the forged proof either.
    let circuit = chain.circuit().clone();
    assert!(matches!(
        ProofChain::resume(MacEngine::new(1), circuit, forged),
        Err(AggError::InvalidPriorProof(_))
    ));
}

#[test]
fn wrong_fold_claim_is_a_constraint_violation() {
    let engine = MacEngine::new(1);
    let mut chain = ProofChain::new(&engine, FoldFn::Sum).unwrap();
    let p0 = chain.extend(Fe::ZERO, None).unwrap();
    let circuit = chain.circuit().clone();
    // Claims 0 + 5 = 6.
    assert!(matches!(
        circuit.step(&engine, fe(6), Fe::ZERO, &p0, fe(5)),
        Err(AggError::ConstraintViolation(_))
    ));
    // The engine evaluates the same predicate and emits nothing.
    assert!(matches!(
        engine.generate_proof(
            &circuit,
            fe(1_000),
            PrivateInputs::Step {
                incoming: fe(5),
                prior: &p0,
            },
        ),
        Err(AggError::ConstraintViolation(_))
    ));
    assert!(matches!(
        engine.generate_proof(&circuit, fe(7), PrivateInputs::Base),
        Err(AggError::ConstraintViolation(_))
    ));
}

#[test]
fn inflated_external_proofs_are_refused_everywhere() {
    let engine = Arc::new(MacEngine::new(13));
    let mut remote = ProofChain::new(Arc::clone(&engine), FoldFn::Sum).unwrap();
    let p0 = remote.extend(Fe::ZERO, None).unwrap();
    let p1 = remote.extend(fe(5), Some(&p0)).unwrap();
    let mut inflated = p1.clone();
    inflated.public_input = fe(1_000);

    // ProofChain::accept
    let mut local = ProofChain::new(Arc::clone(&engine), FoldFn::Sum).unwrap();
    local.accept(p0.clone()).unwrap();
    assert!(matches!(
        local.accept(inflated.clone()),
        Err(AggError::InvalidPriorProof(_))
    ));
    assert_eq!(local.aggregate(), Some(Fe::ZERO));

    // ProofChain::resume
    let circuit = local.circuit().clone();
    assert!(matches!(
        ProofChain::resume(Arc::clone(&engine), circuit, inflated.clone()),
        Err(AggError::InvalidPriorProof(_))
    ));

    // ChainAggregator::accept_proof leaves the ledger where it was.
    let agg = ChainAggregator::new(
        ProofChain::new(Arc::clone(&engine), FoldFn::Sum).unwrap(),
        StateGate::new(InMemoryLedger::new(), "chain"),
        "sum",
    );
    agg.accept_proof(p0).unwrap();
    let before = agg.gate().read();
    assert!(matches!(
        agg.accept_proof(inflated),
        Err(AggError::InvalidPriorProof(_))
    ));
    assert_eq!(agg.gate().read(), before);
    assert_eq!(agg.aggregate(), Fe::ZERO);

    // A step proven under another fold does not verify here either.
    let mut mean = ProofChain::new(Arc::clone(&engine), FoldFn::Mean { window: 2 }).unwrap();
    let other = mean.extend_head(fe(1_000)).unwrap();
    assert!(agg.accept_proof(other).is_err());

    agg.accept_proof(p1).unwrap();
    assert_eq!(agg.aggregate(), fe(5));
}

#[test]
fn zero_window_fails_before_setup() {
    assert!(matches!(
        ProofChain::new(MacEngine::new(1), FoldFn::Mean { window: 0 }),
        Err(AggError::DivisionByZero(_))
    ));
}

#[test]
fn different_folds_do_not_cross_verify() {
    let engine = Arc::new(MacEngine::new(3));
    let mut sum = ProofChain::new(Arc::clone(&engine), FoldFn::Sum).unwrap();
    let replace = ProofChain::new(engine, FoldFn::Replace).unwrap();
    let head = sum.extend_head(fe(4)).unwrap();
    assert!(!replace.verify(&head));
}

#[test]
fn independent_chains_in_parallel() {
    let engine = Arc::new(MacEngine::new(9));
    let heads: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let engine = Arc::clone(&engine);
                s.spawn(move || {
                    let mut chain = ProofChain::new(engine, FoldFn::Sum).unwrap();
                    for i in 1..=10 {
                        chain.extend_head(fe(t + i)).unwrap();
                    }
                    chain.head().cloned().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for (t, head) in heads.iter().enumerate() {
        let t = t as u64;
        assert_eq!(head.public_input, fe((1..=10).map(|i| t + i).sum()));
        assert_eq!(head.position, 10);
    }
}

#[test]
fn chain_aggregator_survives_prover_failure() {
    let engine = Arc::new(MacEngine::new(5));
    let ledger = Arc::new(InMemoryLedger::new());
    let chain = ProofChain::new(Arc::clone(&engine), FoldFn::Sum).unwrap();
    let agg = ChainAggregator::new(chain, StateGate::new(Arc::clone(&ledger), "chain"), "sum");

    agg.extend_chain(fe(5)).unwrap();
    let before = agg.gate().read();

    engine.inject_failures(1);
    let err = agg.extend_chain(fe(10)).unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(agg.gate().read(), before);
    assert_eq!(agg.head().map(|h| h.position), Some(1));

    let head = agg.extend_chain(fe(10)).unwrap();
    assert_eq!(agg.aggregate(), fe(15));
    assert_eq!(agg.gate().read().cursor, ChainHash(head.digest()));
}

#[test]
fn accept_proof_from_remote_prover() {
    let engine = Arc::new(MacEngine::new(11));
    let mut remote = ProofChain::new(Arc::clone(&engine), FoldFn::Sum).unwrap();
    let local = ChainAggregator::new(
        ProofChain::new(engine, FoldFn::Sum).unwrap(),
        StateGate::new(InMemoryLedger::new(), "chain"),
        "sum",
    );

    let p0 = remote.extend(Fe::ZERO, None).unwrap();
    let p1 = remote.extend(fe(8), Some(&p0)).unwrap();
    assert!(matches!(
        local.accept_proof(p1.clone()),
        Err(AggError::InvalidTransition(_))
    ));
    local.accept_proof(p0).unwrap();
    local.accept_proof(p1.clone()).unwrap();
    assert_eq!(local.aggregate(), fe(8));
    assert_eq!(local.gate().read().counter, 2);
    // Replaying the same proof is no longer a successor of the head.
    assert!(local.accept_proof(p1).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        .. ProptestConfig::default()
    })]

    // Property: the head attests exactly the fold of every contribution.
    #[test]
    fn head_attests_full_history(values in prop::collection::vec(0u64..1_000_000, 1..16), window in 1u64..6) {
        let fold = FoldFn::mean(window).unwrap();
        let mut chain = ProofChain::new(MacEngine::new(2), fold.clone()).unwrap();
        let mut expect = Fe::ZERO;
        for &v in &values {
            chain.extend_head(fe(v)).unwrap();
            expect = fold.apply(expect, fe(v)).unwrap();
        }
        let head = chain.head().cloned().unwrap();
        prop_assert_eq!(head.public_input, expect);
        prop_assert_eq!(head.position, values.len() as u64);
        prop_assert!(chain.verify(&head));
    }
}
