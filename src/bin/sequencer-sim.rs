//! # Sequencer Simulator
//!
//! Runs a complete setup against the in-process simulated backend and prints
//! progress as it changes. Useful for exercising configuration files and
//! watching how the engine behaves under latency, stalled items and a
//! hosting transfer.

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use sequencer_core::config::{ConfigManager, SequencerConfig};
use sequencer_core::logging::{init_structured_logging, log_error};
use sequencer_core::observer::{ChannelDispatcher, ExternalSnapshot, ItemStatus, SnapshotStore};
use sequencer_core::test_helpers::{SimulatedBackend, SimulatedBackendConfig};
use sequencer_core::{SequencerEvent, SetupSequencer};

#[derive(Parser)]
#[command(name = "sequencer-sim")]
#[command(about = "Run a setup sequence against a simulated backend")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration directory path (default: config/sequencer)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Environment override file to layer on base.yaml
    #[arg(short, long)]
    environment: Option<String>,

    /// Owner id, overriding the configured one
    #[arg(long)]
    owner: Option<u64>,

    /// Simulated backend latency per command
    #[arg(long, default_value_t = 150)]
    latency_ms: u64,

    /// Start with a hosting transfer in progress
    #[arg(long)]
    transfer: bool,

    /// Installing an item also activates it
    #[arg(long)]
    auto_activate: bool,

    /// Items whose commands never take effect
    #[arg(long, value_delimiter = ',')]
    stall: Vec<String>,

    /// Items already installed (inactive) on the remote side
    #[arg(long, value_delimiter = ',')]
    installed: Vec<String>,

    /// Items already installed and active on the remote side
    #[arg(long, value_delimiter = ',')]
    active: Vec<String>,

    /// Give up after this many seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_structured_logging();

    let mut config = load_config(&cli)?;
    if let Some(owner) = cli.owner {
        config.owner_id = owner;
    }
    config.transfer_in_progress |= cli.transfer;

    let store = SnapshotStore::new();
    let (dispatcher, commands) = ChannelDispatcher::new();
    let backend = SimulatedBackend::new(
        store.clone(),
        remote_snapshot(&cli),
        SimulatedBackendConfig {
            latency: Duration::from_millis(cli.latency_ms),
            stalled_items: cli.stall.iter().cloned().collect::<HashSet<_>>(),
            activate_on_install: cli.auto_activate,
            ..Default::default()
        },
    );
    let observer = backend.clone();
    let backend_task = backend.spawn(commands);

    let sequencer = Arc::new(
        SetupSequencer::new(config, Arc::new(store), Arc::new(dispatcher))
            .context("failed to create sequencer")?,
    );

    let mut progress = sequencer.subscribe();
    let mut events = sequencer.events();
    let watched = Arc::clone(&sequencer);
    let printer = tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = progress.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let report = *progress.borrow_and_update();
                    println!(
                        "{:<14} step {}/{} ({:.0}%)",
                        report.phase.to_string(),
                        report.step_index,
                        report.total_steps,
                        report.percent()
                    );
                }
                Ok(published) = events.recv() => {
                    let SequencerEvent::CommandDispatched { command_type, .. } = published.event
                    else {
                        continue;
                    };
                    if let Some(label) = watched.current_item_label() {
                        println!("{command_type:<14} {label}");
                    }
                }
            }
        }
    });

    sequencer.start()?;
    sequencer.confirm();

    let outcome = sequencer
        .wait_until_finished(Duration::from_secs(cli.timeout_secs))
        .await;
    sequencer.shutdown();
    printer.abort();
    backend_task.abort();

    match outcome {
        Ok(report) => {
            info!(
                setup_complete = observer.is_setup_complete(),
                step_index = report.step_index,
                total_steps = report.total_steps,
                "Setup finished"
            );
            println!("setup complete");
            Ok(())
        }
        Err(e) => {
            log_error(
                "sequencer-sim",
                "wait_until_finished",
                &e.to_string(),
                Some("setup did not reach idle"),
            );
            Err(e).context("simulation stalled")
        }
    }
}

fn load_config(cli: &Cli) -> Result<SequencerConfig> {
    let manager = match &cli.environment {
        Some(environment) => {
            ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), environment)
        }
        None => ConfigManager::load_from_directory(cli.config_dir.clone()),
    };

    match manager {
        Ok(manager) => Ok(manager.config().clone()),
        Err(e) if cli.config_dir.is_none() => {
            warn!(error = %e, "No configuration loaded; using built-in defaults");
            Ok(SequencerConfig::default())
        }
        Err(e) => Err(e).context("failed to load configuration"),
    }
}

/// A live site always lists at least one item; an empty list reads as "not loaded"
const BASELINE_ITEM: &str = "jetpack";

fn remote_snapshot(cli: &Cli) -> ExternalSnapshot {
    let baseline = std::iter::once((BASELINE_ITEM.to_string(), ItemStatus::active()));
    let installed = cli
        .installed
        .iter()
        .map(|id| (id.clone(), ItemStatus::installed()));
    let active = cli.active.iter().map(|id| (id.clone(), ItemStatus::active()));
    baseline.chain(installed).chain(active).collect()
}
