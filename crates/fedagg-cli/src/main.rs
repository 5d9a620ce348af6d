// crates/fedagg-cli/src/main.rs

#![forbid(unsafe_code)]
#![deny(
    rust_2018_idioms,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo
)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, ensure, Context, Result};
use clap::{Parser, Subcommand};
use fedagg_core::io::{
    read_action_log_auto, read_auto, read_proof_auto, write_action_log_auto, write_auto,
    write_proof_auto, Versioned,
};
use fedagg_core::{
    empty_hash, Accumulator, ActionEntry, ActionLog, AggConfig, AggregationCircuit, Aggregator,
    ChainAggregator, ChainHash, Fe, FoldFn, FoldKind, InMemoryLedger, Proof, ProofChain, StateGate,
    StateRecord,
};
use fedagg_engine::MacEngine;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Wire version of the workspace file.
const WORKSPACE_VERSION: u16 = 1;

/// Name of the accumulator that carries the configured fold.
const AGGREGATE: &str = "aggregate";

#[derive(Parser, Debug)]
#[command(
    name = "fedagg",
    about = "fedagg reference CLI",
    long_about = "fedagg reference CLI.\n\nSubmit contributions to a hash-chained action log, roll them up into committed state, or extend a recursive proof chain.",
    version = env!("CARGO_PKG_VERSION"),
    disable_help_subcommand = true
)]
struct Cli {
    /// Workspace file (JSON or CBOR by extension)
    #[arg(long, global = true, default_value = "fedagg.json")]
    workspace: PathBuf,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Create a fresh workspace from a TOML config (plus FEDAGG_* overrides)
    Init {
        /// Optional TOML config; defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overwrite an existing workspace
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Append a contribution to the action log
    Submit {
        /// Contribution (reduced into the field)
        #[arg(long)]
        value: u64,
    },

    /// Fold pending log entries into committed state
    Rollup,

    /// Print committed state for both strategies
    Status {
        /// Emit machine-readable JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Prove a contribution into the recursive chain and commit the new head
    Extend {
        /// Contribution (reduced into the field)
        #[arg(long)]
        value: u64,

        /// Also write the new head proof here (CBOR/JSON)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Verify a chain proof against this workspace's circuit
    VerifyProof {
        /// Input path to proof (CBOR/JSON)
        #[arg(long)]
        proof: PathBuf,
    },

    /// Write the action log entries to a file (CBOR/JSON)
    ExportLog {
        /// Output path
        #[arg(long)]
        out: PathBuf,
    },

    /// Recompute the log hash chain and check the committed cursor
    Audit {
        /// Also check that a previously exported log is a prefix of this one
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Run the sum-reducer walkthrough in memory
    Demo,
}

/// Everything `fedagg` persists between invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Workspace {
    config: AggConfig,
    entries: Vec<ActionEntry>,
    ledger: BTreeMap<String, StateRecord>,
    #[serde(default)]
    chain_head: Option<Proof>,
}

#[derive(Debug, Serialize)]
struct Status {
    fold: String,
    log_len: usize,
    pending: usize,
    rollup: StateRecord,
    chain: StateRecord,
    chain_position: Option<u64>,
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let ws = cli.workspace;
    match cli.cmd {
        Cmd::Init { config, force } => init(&ws, config.as_deref(), force),
        Cmd::Submit { value } => submit(&ws, value),
        Cmd::Rollup => rollup(&ws),
        Cmd::Status { json } => status(&ws, json),
        Cmd::Extend { value, out } => extend(&ws, value, out.as_deref()),
        Cmd::VerifyProof { proof } => verify_proof(&ws, &proof),
        Cmd::ExportLog { out } => export_log(&ws, &out),
        Cmd::Audit { log } => audit(&ws, log.as_deref()),
        Cmd::Demo => demo(),
    }
}

/// Initialize tracing with an env-driven filter (default INFO).
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false).with_level(true).compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

/* ------------------------------- workspace -------------------------------- */

fn load(path: &Path) -> Result<Workspace> {
    let v: Versioned<Workspace> =
        read_auto(path).with_context(|| format!("reading workspace {}", path.display()))?;
    v.expect_version(WORKSPACE_VERSION)
}

fn save(path: &Path, ws: &Workspace) -> Result<()> {
    write_auto(path, &Versioned::new(WORKSPACE_VERSION, ws))
        .with_context(|| format!("writing workspace {}", path.display()))
}

fn accumulators(cfg: &AggConfig) -> Result<Vec<Accumulator>> {
    let mut accs = vec![Accumulator::new(AGGREGATE, cfg.fold_fn()?)];
    if cfg.fold != FoldKind::Count {
        accs.push(Accumulator::new("count", FoldFn::Count));
    }
    Ok(accs)
}

fn open_log(ws: &Workspace) -> Result<Arc<ActionLog>> {
    let log = ActionLog::from_entries(ws.entries.clone()).context("action log failed integrity check")?;
    Ok(Arc::new(log))
}

fn open_chain(cfg: &AggConfig, head: Option<Proof>) -> Result<ProofChain<MacEngine>> {
    let engine = MacEngine::new(cfg.engine_seed);
    let circuit = AggregationCircuit::new(&engine, cfg.fold_fn()?)?;
    Ok(match head {
        Some(h) => ProofChain::resume(engine, circuit, h).context("retained chain head does not verify")?,
        None => ProofChain::with_circuit(engine, circuit),
    })
}

/* -------------------------------- commands -------------------------------- */

fn init(path: &Path, config: Option<&Path>, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("workspace {} already exists (use --force to overwrite)", path.display());
    }
    let cfg = match config {
        Some(p) => AggConfig::load(p)?,
        None => AggConfig::default(),
    }
    .from_env();
    cfg.fold_fn().context("invalid fold configuration")?;
    ensure!(
        cfg.rollup_key != cfg.chain_key,
        "rollup_key and chain_key must differ"
    );

    info!(workspace = %path.display(), fold = ?cfg.fold, "initializing workspace");
    let ws = Workspace {
        config: cfg,
        entries: Vec::new(),
        ledger: BTreeMap::new(),
        chain_head: None,
    };
    save(path, &ws)?;
    println!("Initialized {}", path.display());
    Ok(())
}

fn submit(path: &Path, value: u64) -> Result<()> {
    let mut ws = load(path)?;
    let log = open_log(&ws)?;
    let entry = log.append(Fe::from_u64(value));
    ws.entries = log.snapshot();
    save(path, &ws)?;
    println!(
        "Submitted {} at position {} → {}",
        entry.value,
        ws.entries.len() - 1,
        entry.chain_hash
    );
    Ok(())
}

fn rollup(path: &Path) -> Result<()> {
    let mut ws = load(path)?;
    let log = open_log(&ws)?;
    let ledger = InMemoryLedger::from_records(ws.ledger.clone());
    let agg = Aggregator::new(
        log,
        StateGate::new(&ledger, ws.config.rollup_key.clone()),
        accumulators(&ws.config)?,
    )?;
    let out = agg
        .rollup_with_retry(ws.config.max_retries)
        .context("rollup failed")?;
    ws.ledger = ledger.records();
    save(path, &ws)?;

    if out.folded == 0 {
        println!("Nothing to roll up (counter {})", out.counter);
    } else {
        println!("Rolled up {} entries (counter {})", out.folded, out.counter);
    }
    for (name, value) in &out.aggregates {
        println!("  {name} = {value}");
    }
    Ok(())
}

fn status(path: &Path, json: bool) -> Result<()> {
    let ws = load(path)?;
    let log = open_log(&ws)?;
    let ledger = InMemoryLedger::from_records(ws.ledger.clone());
    let rollup = StateGate::new(&ledger, ws.config.rollup_key.clone()).read();
    let chain = StateGate::new(&ledger, ws.config.chain_key.clone()).read();
    let report = Status {
        fold: ws.config.fold_fn()?.descriptor(),
        log_len: log.len(),
        pending: log.query(&rollup.cursor)?.len(),
        rollup,
        chain,
        chain_position: ws.chain_head.as_ref().map(|h| h.position),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("fold: {}", report.fold);
    println!(
        "log: {} entries, {} pending, tail {}",
        report.log_len,
        report.pending,
        log.tail()
    );
    println!(
        "rollup [{}]: counter {}, cursor {}",
        ws.config.rollup_key, report.rollup.counter, report.rollup.cursor
    );
    for (name, value) in &report.rollup.aggregates {
        println!("  {name} = {value}");
    }
    match report.chain_position {
        Some(pos) => println!(
            "chain [{}]: position {pos}, aggregate {}",
            ws.config.chain_key,
            report.chain.aggregate(AGGREGATE)
        ),
        None => println!("chain [{}]: empty", ws.config.chain_key),
    }
    Ok(())
}

fn extend(path: &Path, value: u64, out: Option<&Path>) -> Result<()> {
    let mut ws = load(path)?;
    let chain = open_chain(&ws.config, ws.chain_head.take())?;
    let ledger = InMemoryLedger::from_records(ws.ledger.clone());
    let agg = ChainAggregator::new(
        chain,
        StateGate::new(&ledger, ws.config.chain_key.clone()),
        AGGREGATE,
    );
    let head = agg
        .extend_chain(Fe::from_u64(value))
        .context("extending proof chain")?;

    if let Some(out) = out {
        write_proof_auto(out, &head).with_context(|| format!("writing proof to {}", out.display()))?;
    }
    println!(
        "Chain at position {} attests {} ({} proof bytes)",
        head.position,
        head.public_input,
        head.len()
    );
    ws.chain_head = Some(head);
    ws.ledger = ledger.records();
    save(path, &ws)
}

fn verify_proof(path: &Path, proof_path: &Path) -> Result<()> {
    let ws = load(path)?;
    let proof = read_proof_auto(proof_path)
        .with_context(|| format!("reading proof from {}", proof_path.display()))?;
    let chain = open_chain(&ws.config, None)?;
    info!(proof = %proof_path.display(), position = proof.position, "verifying proof");
    ensure!(chain.verify(&proof), "proof does not verify");
    println!(
        "OK: proof at position {} attests {}",
        proof.position, proof.public_input
    );
    Ok(())
}

fn export_log(path: &Path, out: &Path) -> Result<()> {
    let ws = load(path)?;
    let log = open_log(&ws)?;
    write_action_log_auto(out, &log)
        .with_context(|| format!("writing log to {}", out.display()))?;
    println!("Exported {} entries, tail {}", log.len(), log.tail());
    Ok(())
}

fn audit(path: &Path, exported: Option<&Path>) -> Result<()> {
    let ws = load(path)?;
    let tail = ActionLog::verify_integrity(&ws.entries).context("action log is tampered")?;
    let log = ActionLog::from_entries(ws.entries.clone())?;

    let ledger = InMemoryLedger::from_records(ws.ledger.clone());
    let rollup = StateGate::new(&ledger, ws.config.rollup_key.clone()).read();
    ensure!(
        rollup.cursor == empty_hash() || log.position_of(&rollup.cursor).is_some(),
        "committed cursor {} is not in the log",
        rollup.cursor
    );
    if let Some(head) = ws.chain_head {
        let committed = StateGate::new(&ledger, ws.config.chain_key.clone()).read();
        ensure!(
            committed.cursor == ChainHash(head.digest()),
            "committed chain cursor does not match the retained head"
        );
        open_chain(&ws.config, Some(head))?;
    }
    if let Some(exported) = exported {
        let old = read_action_log_auto(exported)
            .with_context(|| format!("reading exported log {}", exported.display()))?;
        ensure!(
            old.tail() == empty_hash() || log.position_of(&old.tail()).is_some(),
            "exported log {} diverges from the workspace log",
            exported.display()
        );
    }
    println!("OK: {} entries, tail {}", ws.entries.len(), tail);
    Ok(())
}

fn demo() -> Result<()> {
    let ledger = InMemoryLedger::new();
    let agg = Aggregator::new(
        Arc::new(ActionLog::new()),
        StateGate::new(&ledger, "demo/rollup"),
        vec![
            Accumulator::new("sum", FoldFn::Sum),
            Accumulator::new("count", FoldFn::Count),
        ],
    )?;
    for batch in [[5u64, 10, 12], [8, 3, 4]] {
        for v in batch {
            agg.submit(Fe::from_u64(v));
        }
        let out = agg.rollup()?;
        println!(
            "rollup #{}: sum = {}, count = {}",
            out.counter,
            out.aggregates["sum"],
            out.aggregates["count"]
        );
    }

    let chain = ChainAggregator::new(
        ProofChain::new(MacEngine::new(0), FoldFn::Sum)?,
        StateGate::new(&ledger, "demo/chain"),
        "sum",
    );
    for v in [5u64, 10] {
        let p = chain.extend_chain(Fe::from_u64(v))?;
        println!("chain position {}: sum = {}", p.position, p.public_input);
    }
    Ok(())
}
