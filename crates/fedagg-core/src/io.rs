//! Serialization helpers for [`Proof`]s, log entries, and arbitrary payloads.
//!
//! JSON and CBOR read/write with extension-based auto-detection. Unknown or
//! missing extensions are rejected for reads and default to JSON for writes.
//!
//! [`Versioned<T>`] tags a payload with a wire version.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::action_log::ActionLog;
use crate::proof::Proof;
use crate::types::ActionEntry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Json,
    Cbor,
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating parent directory of {}", path.display()))?;
        }
    }
    Ok(())
}

fn format_for_read(path: &Path, what: &str) -> Result<Format> {
    match ext_lower(path).as_deref() {
        Some("json") => Ok(Format::Json),
        Some("cbor") => Ok(Format::Cbor),
        Some(other) => Err(anyhow!(
            "unsupported {what} extension: {other} (supported: .json, .cbor)"
        )),
        None => Err(anyhow!("path has no extension (expected .json or .cbor)")),
    }
}

fn format_for_write(path: &Path) -> Format {
    match ext_lower(path).as_deref() {
        Some("cbor") => Format::Cbor,
        _ => Format::Json,
    }
}

/// Read any `T` from **JSON**.
pub fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("deserialize JSON from {}", path.display()))
}

/// Write any `T` as pretty **JSON**.
pub fn write_json<T: Serialize + ?Sized, P: AsRef<Path>>(path: P, v: &T) -> Result<()> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(f), v)
        .with_context(|| format!("serialize JSON to {}", path.display()))
}

/// Read any `T` from **CBOR**.
pub fn read_cbor<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    ciborium::de::from_reader(BufReader::new(f))
        .with_context(|| format!("deserialize CBOR from {}", path.display()))
}

/// Write any `T` as **CBOR**.
pub fn write_cbor<T: Serialize + ?Sized, P: AsRef<Path>>(path: P, v: &T) -> Result<()> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    ciborium::ser::into_writer(v, BufWriter::new(f))
        .with_context(|| format!("serialize CBOR to {}", path.display()))
}

/// Auto-detect read by extension `.json` / `.cbor` (case-insensitive).
pub fn read_auto<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    match format_for_read(path.as_ref(), "payload")? {
        Format::Json => read_json(path),
        Format::Cbor => read_cbor(path),
    }
}

/// Auto-detect write (defaults to **JSON** if unknown or missing).
pub fn write_auto<T: Serialize + ?Sized, P: AsRef<Path>>(path: P, v: &T) -> Result<()> {
    match format_for_write(path.as_ref()) {
        Format::Json => write_json(path, v),
        Format::Cbor => write_cbor(path, v),
    }
}

/// Read a [`Proof`] by extension.
pub fn read_proof_auto<P: AsRef<Path>>(path: P) -> Result<Proof> {
    match format_for_read(path.as_ref(), "proof")? {
        Format::Json => read_json(path),
        Format::Cbor => read_cbor(path),
    }
}

/// Write a [`Proof`] by extension (JSON by default).
pub fn write_proof_auto<P: AsRef<Path>>(path: P, proof: &Proof) -> Result<()> {
    write_auto(path, proof)
}

/// Read log entries by extension and rebuild an [`ActionLog`], re-verifying
/// the hash chain.
pub fn read_action_log_auto<P: AsRef<Path>>(path: P) -> Result<ActionLog> {
    let path = path.as_ref();
    let entries: Vec<ActionEntry> = match format_for_read(path, "log")? {
        Format::Json => read_json(path)?,
        Format::Cbor => read_cbor(path)?,
    };
    ActionLog::from_entries(entries).with_context(|| format!("verify log {}", path.display()))
}

/// Write every entry of `log` by extension.
pub fn write_action_log_auto<P: AsRef<Path>>(path: P, log: &ActionLog) -> Result<()> {
    write_auto(path, &log.snapshot())
}

/// Pairs a `u16` wire version with a payload so readers can reject formats
/// they do not understand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Versioned<T> {
    /// Wire version tag.
    pub ver: u16,
    /// Wrapped payload.
    pub payload: T,
}

impl<T> Versioned<T> {
    /// Construct a new versioned wrapper.
    #[inline]
    pub const fn new(ver: u16, payload: T) -> Self {
        Self { ver, payload }
    }

    /// Unwrap the payload if the version is `expected`.
    pub fn expect_version(self, expected: u16) -> Result<T> {
        if self.ver == expected {
            Ok(self.payload)
        } else {
            Err(anyhow!(
                "unsupported wire version {} (expected {expected})",
                self.ver
            ))
        }
    }
}

fn ext_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}
