//! haas-networkd entry point.
//!
//! Loads the configuration, restores the topology from the state file or the
//! seed, registers the built-in switch drivers and drains queued networking
//! actions until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use haas_deferred::{
    builtin_registry, logging, DrainWorker, HaasConfig, MemoryStore, NetworkEngine,
    DEFAULT_CONFIG_PATH,
};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// HaaS deferred networking daemon
#[derive(Parser, Debug)]
#[command(name = "haas-networkd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Drain the queue once and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match HaasConfig::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("haas-networkd: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(level) = args.log_level.clone() {
        config.logging.level = level;
    }

    logging::init_logging(&config.logging.level, config.logging.json);

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("haas-networkd failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, config: HaasConfig) -> Result<()> {
    config.validate()?;
    info!(config = %args.config.display(), "Starting haas-networkd");

    let store = open_store(&config)?;

    let registry = builtin_registry(&config).context("Failed to register switch drivers")?;
    info!(drivers = ?registry.api_names(), "Registered switch drivers");

    let engine = Arc::new(NetworkEngine::new(Arc::new(store), Arc::new(registry)));

    if args.once {
        let report = engine.drain().await?;
        info!(applied = report.applied, "Drained pending actions");
        return Ok(());
    }

    let worker = DrainWorker::new(engine, config.poll_interval())
        .with_drain_on_start(config.engine.drain_on_start);
    let handle = worker.handle();
    let task = tokio::spawn(worker.run());

    wait_for_shutdown().await?;
    info!("Received shutdown signal");
    handle.shutdown();

    let stats = task.await.context("Drain worker panicked")?;
    info!(drains = stats.drains, failures = stats.failures, "Shutdown complete");
    Ok(())
}

/// Resumes from the state file if it exists, otherwise starts from the seed.
fn open_store(config: &HaasConfig) -> Result<MemoryStore> {
    if let Some(path) = config.topology.state_file.as_ref().filter(|p| p.exists()) {
        let store = MemoryStore::open(path)
            .with_context(|| format!("Failed to load state file {}", path.display()))?;
        info!(state = %path.display(), "Resumed topology from state file");
        return Ok(store);
    }

    let store = match &config.topology.seed_file {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read topology seed {}", path.display()))?;
            let store = MemoryStore::from_json(&json)
                .with_context(|| format!("Failed to load topology seed {}", path.display()))?;
            info!(seed = %path.display(), "Loaded topology seed");
            store
        }
        None => MemoryStore::default(),
    };

    match &config.topology.state_file {
        Some(path) => {
            let store = store.with_state_file(path.clone());
            store
                .save()
                .with_context(|| format!("Failed to write state file {}", path.display()))?;
            Ok(store)
        }
        None => Ok(store),
    }
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for SIGINT")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")
}
