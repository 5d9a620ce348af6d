//! Fold functions: the step rule `(prior, incoming) -> next` shared by the
//! recursive circuit and the reducer.
//!
//! A fold is configuration, not hardwired. All arithmetic is over [`Fe`];
//! the only division is the exact field inverse used by [`FoldFn::Mean`], and
//! a zero divisor is rejected by [`FoldFn::validate`] before any circuit or
//! reducer evaluation.
//!
//! Folds need not be commutative: `Mean` is sequence-sensitive, which is why
//! the reducer treats log order as a hard contract.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{AggError, Result};
use crate::field::Fe;

/// Caller-supplied pure step function.
pub type CustomFold = Arc<dyn Fn(Fe, Fe) -> Result<Fe> + Send + Sync>;

/// Configured fold rule.
#[derive(Clone)]
pub enum FoldFn {
    /// `prior + incoming`.
    Sum,
    /// `prior + 1`; the incoming value only advances the count.
    Count,
    /// Rolling exact mean over a fixed window `w`:
    /// `(prior * (w - 1) + incoming) / w`.
    Mean {
        /// Window length (the divisor).
        window: u64,
    },
    /// Verify-and-replace: the new aggregate is the incoming value.
    Replace,
    /// Caller-supplied pure function; `name` is part of the circuit identity.
    Custom {
        /// Stable name bound into the circuit id.
        name: String,
        /// The step function.
        f: CustomFold,
    },
}

impl FoldFn {
    /// Build a validated rolling mean.
    pub fn mean(window: u64) -> Result<Self> {
        let f = Self::Mean { window };
        f.validate()?;
        Ok(f)
    }

    /// Wrap a closure as a named custom fold.
    pub fn custom<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Fe, Fe) -> Result<Fe> + Send + Sync + 'static,
    {
        Self::Custom {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    /// Reject misconfiguration (zero divisor, empty custom name).
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Mean { window } if Fe::from_u64(*window).is_zero() => {
                Err(AggError::DivisionByZero(self.descriptor()))
            }
            Self::Custom { name, .. } if name.is_empty() => Err(AggError::InvalidConfig(
                "custom fold requires a non-empty name".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Apply one step of the fold.
    pub fn apply(&self, prior: Fe, incoming: Fe) -> Result<Fe> {
        match self {
            Self::Sum => Ok(prior + incoming),
            Self::Count => Ok(prior + Fe::one()),
            Self::Mean { window } => {
                let w = Fe::from_u64(*window);
                let inv = w
                    .checked_inv()
                    .ok_or_else(|| AggError::DivisionByZero(self.descriptor()))?;
                Ok((prior * (w - Fe::one()) + incoming) * inv)
            }
            Self::Replace => Ok(incoming),
            Self::Custom { f, .. } => f(prior, incoming),
        }
    }

    /// Stable textual identity, bound into circuit ids.
    #[must_use]
    pub fn descriptor(&self) -> String {
        match self {
            Self::Sum => "sum".into(),
            Self::Count => "count".into(),
            Self::Mean { window } => format!("mean/{window}"),
            Self::Replace => "replace".into(),
            Self::Custom { name, .. } => format!("custom/{name}"),
        }
    }
}

impl fmt::Debug for FoldFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FoldFn").field(&self.descriptor()).finish()
    }
}

impl Default for FoldFn {
    #[inline]
    fn default() -> Self {
        Self::Sum
    }
}

/// Serializable fold selection (config files, CLI). Custom folds are code-only.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FoldKind {
    /// See [`FoldFn::Sum`].
    #[default]
    Sum,
    /// See [`FoldFn::Count`].
    Count,
    /// See [`FoldFn::Mean`]; the window comes from configuration.
    Mean,
    /// See [`FoldFn::Replace`].
    Replace,
}

impl FoldKind {
    /// Materialize and validate the fold. `window` is only read for `Mean`.
    pub fn build(self, window: u64) -> Result<FoldFn> {
        match self {
            Self::Sum => Ok(FoldFn::Sum),
            Self::Count => Ok(FoldFn::Count),
            Self::Mean => FoldFn::mean(window),
            Self::Replace => Ok(FoldFn::Replace),
        }
    }
}

impl FromStr for FoldKind {
    type Err = AggError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "count" => Ok(Self::Count),
            "mean" => Ok(Self::Mean),
            "replace" => Ok(Self::Replace),
            other => Err(AggError::InvalidConfig(format!(
                "unknown fold `{other}` (use sum|count|mean|replace)"
            ))),
        }
    }
}
