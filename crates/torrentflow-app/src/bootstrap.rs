//! # Design
//!
//! - `run_app` owns process-wide concerns: environment configuration, the
//!   global subscriber, and Ctrl-C.
//! - `run_app_with` takes a ready configuration and a shutdown future so the
//!   run loop can be driven from tests.
//! - The loopback engine stands in for a networked engine; a simulation task
//!   advances it on the same cadence as the broadcaster.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use torrentflow_config::{LoadedConfig, ManagerConfig, load_from_env};
use torrentflow_core::{InfoHash, TransferInspector, TransferStatus, TransferWorkflow};
use torrentflow_events::{Event, TransferBatch, TransferSnapshot};
use torrentflow_session::{EngineOptions, LoopbackEngine, SessionManager};
use torrentflow_telemetry::{LogFormat, LoggingConfig, Metrics, build_sha, init_logging};
use tracing::{debug, error, info, warn};

use crate::cli::{Cli, Source};
use crate::error::{AppError, AppResult};

/// Outcome of one run, returned once the manager has shut down.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Transfers that were accepted, in the order they were requested.
    pub started: Vec<InfoHash>,
    /// Number of sources the manager rejected.
    pub rejected: usize,
    /// Final state of every transfer.
    pub snapshots: Vec<TransferSnapshot>,
}

/// Entry point for the `torrentflow` binary.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded, logging cannot be
/// installed, the download directory cannot be created, or every requested
/// transfer is rejected.
pub async fn run_app(cli: &Cli) -> AppResult<()> {
    let LoadedConfig {
        mut config,
        warnings,
    } = load_from_env().map_err(|err| AppError::config("config.load_from_env", err))?;
    if let Some(dir) = &cli.download_dir {
        config.download_dir.clone_from(dir);
    }

    let logging = LoggingConfig {
        level: &config.log_level,
        format: config.log_format.unwrap_or_else(LogFormat::infer),
        build_sha: build_sha(),
    };
    init_logging(&logging).map_err(|err| AppError::telemetry("telemetry.init", err))?;
    for warning in &warnings {
        warn!(warning = %warning, "configuration value adjusted");
    }

    let summary = run_app_with(cli, config, ctrl_c()).await?;
    info!(
        started = summary.started.len(),
        rejected = summary.rejected,
        "TorrentFlow shutdown complete"
    );
    Ok(())
}

/// Run the manager with an already normalised configuration until
/// `shutdown` resolves, or until every transfer finishes when
/// `--exit-when-done` is set.
///
/// # Errors
///
/// Returns an error if the download directory cannot be created, metrics
/// cannot be registered, or sources were given and all of them were
/// rejected.
pub async fn run_app_with<F>(
    cli: &Cli,
    config: ManagerConfig,
    shutdown: F,
) -> AppResult<RunSummary>
where
    F: Future<Output = ()> + Send,
{
    tokio::fs::create_dir_all(&config.download_dir)
        .await
        .map_err(|err| {
            AppError::io("download_dir.create", Some(config.download_dir.clone()), err)
        })?;
    let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;

    let engine = LoopbackEngine::with_options(EngineOptions::from_config(&config));
    let options = engine.options();
    info!(
        download_dir = %config.download_dir.display(),
        listen_port = options.listen_port,
        dht = options.enable_dht,
        seed_after_download = options.seed_after_download,
        tick_ms = config.tick_interval.as_millis(),
        "TorrentFlow starting"
    );

    let period = config.tick_interval;
    let manager = SessionManager::new(Arc::new(engine.clone()), config, metrics);
    let stop = CancellationToken::new();
    let simulation = spawn_simulation(engine, period, cli.simulated_rate, stop.clone());
    let mut stream = manager.subscribe(None);
    manager.start();

    let (started, rejected) = add_sources(&manager, cli).await;
    if started.is_empty() && rejected > 0 {
        stop_all(&manager, &stop, simulation).await;
        return Err(AppError::NoTransfers {
            attempted: rejected,
        });
    }

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            envelope = stream.next() => {
                let Some(envelope) = envelope else { break };
                let finished = log_event(&envelope.event);
                if finished && cli.exit_when_done {
                    info!("all transfers finished");
                    break;
                }
            }
        }
    }

    stop_all(&manager, &stop, simulation).await;
    if cli.print_metrics {
        match manager.metrics().render() {
            Ok(text) => println!("{text}"),
            Err(err) => warn!(error = %err, "failed to render metrics"),
        }
    }

    Ok(RunSummary {
        started,
        rejected,
        snapshots: manager.list().await,
    })
}

async fn add_sources(manager: &SessionManager, cli: &Cli) -> (Vec<InfoHash>, usize) {
    let mut started = Vec::new();
    let mut rejected = 0;
    for source in cli.resolved_sources() {
        let result = match &source {
            Source::Magnet(uri) => manager.add_magnet(uri).await,
            Source::Descriptor(path) => manager.add_descriptor_file(path).await,
        };
        match result {
            Ok(id) => started.push(id),
            Err(err) => {
                error!(source = ?source, error = ?err, "transfer rejected");
                rejected += 1;
            }
        }
    }

    if !cli.seed.is_empty() {
        match manager.add_local_for_seeding(cli.seed.clone()).await {
            Ok(id) => started.push(id),
            Err(err) => {
                error!(files = cli.seed.len(), error = ?err, "local seed rejected");
                rejected += 1;
            }
        }
    }
    (started, rejected)
}

/// Log one event; returns `true` for a non-empty batch in which every
/// transfer has finished downloading.
fn log_event(event: &Event) -> bool {
    match event {
        Event::TransfersUpdated(batch) => {
            log_batch(batch);
            !batch.snapshots.is_empty()
                && batch.snapshots.iter().all(|snapshot| {
                    matches!(
                        snapshot.status,
                        TransferStatus::Seeding | TransferStatus::Completed
                    )
                })
        }
        Event::TransferAdded { info_hash, name } => {
            info!(info_hash = %info_hash, name = %name, "transfer added");
            false
        }
        Event::MetadataTimeout {
            info_hash,
            waited_secs,
        } => {
            warn!(info_hash = %info_hash, waited_secs, "still waiting for metadata");
            false
        }
        Event::SamplingFailed { info_hash, message } => {
            warn!(info_hash = %info_hash, error = %message, "transfer skipped this tick");
            false
        }
        other => {
            debug!(kind = other.kind(), "transfer notification");
            false
        }
    }
}

fn log_batch(batch: &TransferBatch) {
    for snapshot in &batch.snapshots {
        info!(
            info_hash = %snapshot.id,
            name = %snapshot.name,
            status = snapshot.status.as_str(),
            progress = format_args!("{:.1}%", snapshot.progress),
            down = %snapshot.download_speed_str,
            up = %snapshot.upload_speed_str,
            peers = snapshot.peers,
            eta = %snapshot.eta,
            "transfer"
        );
    }
    info!(
        active = batch.stats.active_transfers,
        peers = batch.stats.total_peers,
        down = %batch.stats.total_download_str,
        up = %batch.stats.total_upload_str,
        "totals"
    );
}

fn spawn_simulation(
    engine: LoopbackEngine,
    period: Duration,
    bytes_per_second: u64,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = stop.cancelled() => break,
                _ = ticker.tick() => engine.advance(period, bytes_per_second),
            }
        }
    })
}

async fn stop_all(manager: &SessionManager, stop: &CancellationToken, simulation: JoinHandle<()>) {
    stop.cancel();
    manager.shutdown().await;
    if let Err(err) = simulation.await {
        warn!(error = %err, "engine simulation ended abnormally");
    }
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for Ctrl-C; shutting down");
    }
}
