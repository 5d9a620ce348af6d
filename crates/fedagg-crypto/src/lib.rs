// crates/fedagg-crypto/src/lib.rs

//! Minimal crypto substrate: Blake3 transcript with a simple absorb/challenge API.
//!
//! The transcript backs two things in fedagg: the hash chain of the action
//! log, and the keyed statement binding used by the simulation proving engine.
//!
//! ⚠️ **Security note:** This models a domain-separated random oracle using
//! Blake3. It is a scaffolding layer, **not** a proof system.

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

use blake3::Hasher;

/// Fixed domain prefix to seed transcripts.
const TRANSCRIPT_PREFIX: &[u8] = b"fedagg.transcript.v0";

/// Transcript interface used across the workspace.
///
/// Implementations should apply domain separation for both absorbs and challenges.
pub trait Transcript {
    /// Add raw bytes under a label (domain-separated).
    fn absorb(&mut self, label: &str, bytes: &[u8]);

    /// Convenience: absorb an unsigned 64-bit value (LE).
    fn absorb_u64(&mut self, label: &str, x: u64) {
        self.absorb(label, &x.to_le_bytes());
    }

    /// Convenience: absorb a canonical label from [`Label`].
    fn absorb_labeled(&mut self, label: Label, bytes: &[u8]) {
        self.absorb(label.as_str(), bytes);
    }

    /// Squeeze `n` bytes as a challenge under `label`.
    ///
    /// Implementations should be deterministic with respect to the transcript state.
    #[must_use]
    fn challenge_bytes(&mut self, label: &str, n: usize) -> Vec<u8>;

    /// Squeeze a fixed 32-byte challenge (digests, MACs).
    #[must_use]
    fn challenge_32(&mut self, label: &str) -> [u8; 32] {
        let v = self.challenge_bytes(label, 32);
        let mut out = [0u8; 32];
        out.copy_from_slice(&v);
        out
    }
}

/// Blake3-based transcript.
///
/// Deterministic and domain-separated. A keyed variant is available for
/// statement binding where only the key holder should be able to produce
/// matching challenges.
#[derive(Clone, Debug)]
pub struct Blake3Transcript {
    st: Hasher,
}

impl Blake3Transcript {
    /// Create a new transcript with a domain separation prefix.
    #[must_use]
    pub fn new(domain_sep: &str) -> Self {
        Self::seeded(Hasher::new(), domain_sep)
    }

    /// Create a keyed transcript (Blake3 keyed mode) under `domain_sep`.
    #[must_use]
    pub fn keyed(domain_sep: &str, key: &[u8; 32]) -> Self {
        Self::seeded(Hasher::new_keyed(key), domain_sep)
    }

    fn seeded(mut st: Hasher, domain_sep: &str) -> Self {
        // Seed with a fixed prefix and the domain string length+bytes.
        st.update(TRANSCRIPT_PREFIX);
        st.update(&(domain_sep.len() as u32).to_le_bytes());
        st.update(domain_sep.as_bytes());
        Self { st }
    }
}

impl Transcript for Blake3Transcript {
    fn absorb(&mut self, label: &str, bytes: &[u8]) {
        // tag "absorb", label length+bytes, payload length+bytes.
        self.st.update(b"absorb");
        self.st.update(&(label.len() as u32).to_le_bytes());
        self.st.update(label.as_bytes());
        self.st.update(&(bytes.len() as u32).to_le_bytes());
        self.st.update(bytes);
    }

    fn challenge_bytes(&mut self, label: &str, n: usize) -> Vec<u8> {
        let mut st = self.st.clone();
        st.update(b"challenge");
        st.update(&(label.len() as u32).to_le_bytes());
        st.update(label.as_bytes());

        let mut out = vec![0u8; n];
        st.finalize_xof().fill(&mut out);

        // Model transcript "forward progress" after a challenge.
        self.st.update(b"after_challenge");
        self.st.update(&(label.len() as u32).to_le_bytes());
        self.st.update(label.as_bytes());

        out
    }
}

/// Canonical transcript labels and domains used across fedagg.
/// Avoids stringly-typed mistakes in domain separation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Label {
    /// Domain for the action-log hash chain.
    Actions,
    /// Domain for circuit identifiers.
    Circuit,
    /// Domain for proof digests.
    ProofDigest,
    /// Domain for engine key derivation.
    EngineKey,
    /// Domain for the statement MAC of a proof.
    Statement,
    /// Field-element payload absorption.
    Value,
    /// Previous hash / prior-proof digest absorption.
    Previous,
}

impl Label {
    /// Borrow the canonical string.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Actions => "fedagg/actions",
            Self::Circuit => "fedagg/circuit",
            Self::ProofDigest => "fedagg/proof_digest",
            Self::EngineKey => "fedagg/engine_key",
            Self::Statement => "fedagg/statement",
            Self::Value => "fedagg/value",
            Self::Previous => "fedagg/previous",
        }
    }
}
