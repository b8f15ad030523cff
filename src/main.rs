#![forbid(unsafe_code)]

//! `volley` — batch launcher binary.
//!
//! Loads a TOML batch file, starts the batch through the sequencing
//! engine, and maps Ctrl-C onto the stop coordinator: the first Ctrl-C
//! stops the in-flight batch (pending starts and running tasks alike),
//! a second one shuts the process down.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use volley::config::BatchFile;
use volley::display::console::{ConsoleSlotManager, SlotSnapshot};
use volley::launcher::process::ProcessLauncher;
use volley::launcher::validate::ConfigValidator;
use volley::models::task::WorkspaceId;
use volley::orchestrator::sequencer::{BatchEvent, BatchRunner};
use volley::orchestrator::stop::StopCoordinator;
use volley::{AppError, Result};

/// Interval between idle re-checks of whether the run is complete.
const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum SummaryFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "volley", about = "Batch launcher for run configurations", version, long_about = None)]
struct Cli {
    /// Path to the TOML batch file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the workspace identity from the batch file.
    #[arg(long)]
    workspace: Option<String>,

    /// Final summary format.
    #[arg(long, value_enum, default_value_t = SummaryFormat::Text)]
    summary: SummaryFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("volley batch launcher starting");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load the batch file ─────────────────────────────
    let batch = BatchFile::load_from_path(&args.config)?;
    let workspace = WorkspaceId::new(
        args.workspace
            .clone()
            .unwrap_or_else(|| batch.workspace.clone()),
    );
    let base_dir = args
        .config
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    info!(%workspace, tasks = batch.tasks.len(), "batch file loaded");

    // ── Wire up the collaborators ───────────────────────
    let slots = Arc::new(ConsoleSlotManager::new());
    let launcher = Arc::new(ProcessLauncher::new(Arc::clone(&slots)));
    let validator = Arc::new(ConfigValidator::new(base_dir));
    let stop = Arc::new(StopCoordinator::new());
    let shutdown = CancellationToken::new();
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let runner = BatchRunner::new(
        launcher,
        validator,
        Arc::clone(&stop),
        Some(event_tx),
        shutdown.clone(),
    );

    runner.start_batch(workspace.clone(), batch.descriptors(), batch.policy.to_policy());

    // ── Drive the run to completion ─────────────────────
    // The run is over once no batch is walking its cursor and no tracked
    // session is still alive, which is exactly the stop affordance.
    let mut walk_finished = false;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(%err, "ctrl-c handler failed");
                    break;
                }
                if shutdown.is_cancelled() {
                    break;
                }
                if stop.stop_enabled(&workspace).await {
                    info!("stop requested; stopping batch");
                    stop.stop_all(&workspace).await;
                } else {
                    info!("nothing left to stop; shutting down");
                    shutdown.cancel();
                    break;
                }
            }
            event = event_rx.recv() => {
                match event {
                    Some(event) => {
                        if matches!(event, BatchEvent::BatchFinished { .. }) {
                            walk_finished = true;
                        }
                        log_event(&event);
                    }
                    None => break,
                }
                if walk_finished && !stop.stop_enabled(&workspace).await {
                    break;
                }
            }
            // Observer events are best-effort; the idle tick re-checks
            // completion even if the finish event was dropped, and its
            // spacing leaves just-requested launches time to attach.
            () = tokio::time::sleep(SETTLE_POLL_INTERVAL) => {
                if !stop.stop_enabled(&workspace).await {
                    break;
                }
            }
        }
    }
    shutdown.cancel();

    print_summary(args.summary, &slots.snapshots())
}

fn log_event(event: &BatchEvent) {
    match event {
        BatchEvent::TaskSkipped { index, name, reason } => {
            warn!(index, task = %name, ?reason, "task skipped");
        }
        BatchEvent::LaunchRequested { index, name } => {
            info!(index, task = %name, "launch requested");
        }
        BatchEvent::SessionAttached { index, name, has_slot } => {
            info!(index, task = %name, has_slot, "session attached");
        }
        BatchEvent::WaitProgress { index, fraction } => {
            debug!(index, fraction, "waiting before next start");
        }
        BatchEvent::TaskTerminated { index, name, exit_code } => {
            info!(index, task = %name, exit_code = exit_code.unwrap_or(-1), "task terminated");
        }
        BatchEvent::BatchFinished { aborted } => {
            info!(aborted, "batch finished");
        }
    }
}

fn print_summary(format: SummaryFormat, snapshots: &[SlotSnapshot]) -> Result<()> {
    match format {
        SummaryFormat::Text => {
            for snapshot in snapshots {
                let mut flags = Vec::new();
                if snapshot.failed {
                    flags.push("failed");
                }
                if snapshot.pinned {
                    flags.push("pinned");
                }
                if snapshot.removed {
                    flags.push("hidden");
                }
                let flags = if flags.is_empty() {
                    "ok".to_owned()
                } else {
                    flags.join(", ")
                };
                println!("{}: {flags}", snapshot.title);
            }
        }
        SummaryFormat::Json => {
            let rendered = serde_json::to_string_pretty(snapshots)
                .map_err(|err| AppError::Io(format!("summary serialization failed: {err}")))?;
            println!("{rendered}");
        }
    }
    Ok(())
}

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let result = match format {
        LogFormat::Text => fmt().with_env_filter(filter).try_init(),
        LogFormat::Json => fmt().json().with_env_filter(filter).try_init(),
    };
    result.map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))
}
