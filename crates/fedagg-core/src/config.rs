//! Runtime configuration: TOML file plus `FEDAGG_*` environment overrides.
//!
//! Recognized variables:
//! - `FEDAGG_FOLD` = `sum` | `count` | `mean` | `replace`
//! - `FEDAGG_MEAN_WINDOW` = `<u64>`
//! - `FEDAGG_MAX_RETRIES` = `<u32>`
//! - `FEDAGG_ENGINE_SEED` = `<u64>`
//!
//! Unparseable values are ignored (with a warning) and the file/default value
//! stays in effect.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::fold_fn::{FoldFn, FoldKind};

/// Aggregation settings shared by the CLI and embedders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AggConfig {
    /// Fold applied by both strategies.
    pub fold: FoldKind,
    /// Window for `fold = "mean"`.
    pub mean_window: u64,
    /// Ledger key of the log-based rollup.
    pub rollup_key: String,
    /// Ledger key of the proof-chain strategy.
    pub chain_key: String,
    /// Attempts for `rollup_with_retry`.
    pub max_retries: u32,
    /// Seed from which proving-engine keys are derived.
    pub engine_seed: u64,
}

impl Default for AggConfig {
    fn default() -> Self {
        Self {
            fold: FoldKind::Sum,
            mean_window: 2,
            rollup_key: "fedagg/rollup".into(),
            chain_key: "fedagg/chain".into(),
            max_retries: 3,
            engine_seed: 0,
        }
    }
}

impl AggConfig {
    /// Parse a TOML document; missing fields take their defaults.
    pub fn from_toml_str(src: &str) -> Result<Self> {
        toml::from_str(src).context("parse fedagg config toml")
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let src = fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        Self::from_toml_str(&src)
    }

    /// Apply `FEDAGG_*` overrides from the process environment.
    #[must_use]
    pub fn from_env(self) -> Self {
        self.apply_overrides(|k| std::env::var(k).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    #[must_use]
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("FEDAGG_FOLD") {
            match v.parse() {
                Ok(kind) => self.fold = kind,
                Err(e) => warn!(value = %v, error = %e, "ignoring FEDAGG_FOLD"),
            }
        }
        if let Some(v) = lookup("FEDAGG_MEAN_WINDOW") {
            match v.trim().parse() {
                Ok(w) => self.mean_window = w,
                Err(_) => warn!(value = %v, "ignoring FEDAGG_MEAN_WINDOW"),
            }
        }
        if let Some(v) = lookup("FEDAGG_MAX_RETRIES") {
            match v.trim().parse() {
                Ok(n) => self.max_retries = n,
                Err(_) => warn!(value = %v, "ignoring FEDAGG_MAX_RETRIES"),
            }
        }
        if let Some(v) = lookup("FEDAGG_ENGINE_SEED") {
            match v.trim().parse() {
                Ok(s) => self.engine_seed = s,
                Err(_) => warn!(value = %v, "ignoring FEDAGG_ENGINE_SEED"),
            }
        }
        self
    }

    /// Build the configured fold, rejecting a zero mean window.
    pub fn fold_fn(&self) -> crate::Result<FoldFn> {
        self.fold.build(self.mean_window)
    }

    /// Serialize back to TOML (used when initializing a workspace).
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serialize fedagg config toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AggError;
    use std::collections::HashMap;

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg = AggConfig::from_toml_str("fold = \"mean\"\nmean_window = 4\n").unwrap();
        assert_eq!(cfg.fold, FoldKind::Mean);
        assert_eq!(cfg.rollup_key, "fedagg/rollup");
        assert_eq!(cfg.fold_fn().unwrap().descriptor(), "mean/4");
    }

    #[test]
    fn env_overrides_and_bad_values() {
        let env: HashMap<&str, &str> = [
            ("FEDAGG_FOLD", "count"),
            ("FEDAGG_MAX_RETRIES", "7"),
            ("FEDAGG_ENGINE_SEED", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let cfg = AggConfig::default().apply_overrides(|k| env.get(k).map(|v| (*v).to_owned()));
        assert_eq!(cfg.fold, FoldKind::Count);
        assert_eq!(cfg.max_retries, 7);
        assert_eq!(cfg.engine_seed, 0);
    }

    #[test]
    fn zero_window_fails_validation() {
        let cfg = AggConfig {
            fold: FoldKind::Mean,
            mean_window: 0,
            ..AggConfig::default()
        };
        assert!(matches!(cfg.fold_fn(), Err(AggError::DivisionByZero(_))));
    }

    #[test]
    fn toml_roundtrip() {
        let cfg = AggConfig::default();
        let back = AggConfig::from_toml_str(&cfg.to_toml_string().unwrap()).unwrap();
        assert_eq!(cfg, back);
    }
}
