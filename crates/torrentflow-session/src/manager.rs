//! Session manager façade.
//!
//! # Design
//! - Owns the registry, the event bus, the broadcaster task and the engine
//!   collaborator; every mutation goes through the registry.
//! - Identifier collisions are checked before the engine is asked to admit a
//!   transfer, and again atomically on insert.
//! - Status is never stored: pause and resume only command the engine, and
//!   the next tick reflects the change.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use torrentflow_config::{LoadedConfig, ManagerConfig, normalize_config};
use torrentflow_core::{
    InfoHash, MagnetLink, Metainfo, RemovalReport, SeedDescriptor, TransferEngine,
    TransferError, TransferHandle, TransferInspector, TransferMetadata, TransferResult,
    TransferWorkflow,
};
use torrentflow_events::{Event, EventBus, EventId, EventStream, TransferBatch, TransferSnapshot};
use torrentflow_telemetry::Metrics;
use tracing::{debug, info, warn};

use crate::broadcaster::Broadcaster;
use crate::metadata::MetadataWait;
use crate::registry::SessionRegistry;
use crate::session::{SessionOrigin, TransferSession};
use crate::snapshot::build_snapshot;

/// Public entry point for adding, controlling and observing transfers.
pub struct SessionManager {
    engine: Arc<dyn TransferEngine>,
    registry: Arc<SessionRegistry>,
    events: EventBus,
    metrics: Metrics,
    config: ManagerConfig,
    shutdown: CancellationToken,
    broadcaster: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Build a manager over `engine`. Nothing runs until [`Self::start`].
    ///
    /// `config` is clamped to its guard rails first; each adjustment is
    /// logged at `warn`.
    #[must_use]
    pub fn new(engine: Arc<dyn TransferEngine>, config: ManagerConfig, metrics: Metrics) -> Self {
        let LoadedConfig { config, warnings } = normalize_config(config);
        for warning in &warnings {
            warn!(warning = %warning, "manager configuration adjusted");
        }
        Self {
            engine,
            registry: Arc::new(SessionRegistry::new()),
            events: EventBus::with_capacity(config.event_capacity),
            metrics,
            config,
            shutdown: CancellationToken::new(),
            broadcaster: Mutex::new(None),
        }
    }

    /// Spawn the progress broadcaster. Calling it again while it runs, or
    /// after shutdown, does nothing.
    pub fn start(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let mut slot = self
            .broadcaster
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        *slot = Some(
            self.broadcaster_state()
                .spawn(self.config.tick_interval, self.shutdown.child_token()),
        );
        info!(
            tick_ms = self.config.tick_interval.as_millis(),
            "session manager started"
        );
    }

    /// Stop the broadcaster and cancel every pending metadata wait.
    ///
    /// Sessions stay registered; engine transfers are not dropped.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self
            .broadcaster
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task
            && let Err(err) = task.await
        {
            warn!(error = %err, "progress broadcaster ended abnormally");
        }
        info!("session manager stopped");
    }

    /// Run one broadcast tick immediately and return its batch.
    pub async fn tick_now(&self) -> TransferBatch {
        self.broadcaster_state().tick().await
    }

    /// Subscribe to notifications, replaying events newer than
    /// `last_event_id` first.
    #[must_use]
    pub fn subscribe(&self, last_event_id: Option<EventId>) -> EventStream {
        self.events.subscribe(last_event_id)
    }

    /// Event bus carrying batches and notifications.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Metrics updated by the manager and its broadcaster.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Shared session registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    fn broadcaster_state(&self) -> Broadcaster {
        Broadcaster {
            registry: Arc::clone(&self.registry),
            events: self.events.clone(),
            metrics: self.metrics.clone(),
        }
    }

    fn publish(&self, event: Event) {
        self.metrics.inc_event(event.kind());
        let _ = self.events.publish(event);
    }

    fn record<T>(&self, operation: &'static str, result: TransferResult<T>) -> TransferResult<T> {
        match &result {
            Ok(_) => self.metrics.inc_operation(operation, "ok"),
            Err(err) => {
                self.metrics.inc_operation(operation, err.code());
                info!(operation, code = err.code(), error = ?err, "transfer operation rejected");
            }
        }
        result
    }

    async fn ensure_absent(&self, info_hash: InfoHash) -> TransferResult<()> {
        if self.registry.contains(info_hash).await {
            return Err(TransferError::DuplicateId { info_hash });
        }
        Ok(())
    }

    async fn register(
        &self,
        handle: Box<dyn TransferHandle>,
        origin: SessionOrigin,
    ) -> TransferResult<CancellationToken> {
        let lifetime = self.shutdown.child_token();
        let info_hash = handle.info_hash();
        self.registry
            .insert(TransferSession::new(handle, origin, lifetime.clone()))
            .await?;
        debug!(info_hash = %info_hash, origin = origin.as_str(), "session registered");
        Ok(lifetime)
    }

    async fn add_magnet_inner(&self, uri: &str) -> TransferResult<InfoHash> {
        let magnet = MagnetLink::parse(uri)?;
        let info_hash = magnet.info_hash();
        self.ensure_absent(info_hash).await?;

        let handle = self
            .engine
            .add_magnet(&magnet)
            .await
            .map_err(|err| TransferError::engine("add_magnet", Some(info_hash), err))?;
        let signal = handle.metadata_ready();
        let lifetime = self.register(handle, SessionOrigin::Magnet).await?;

        MetadataWait {
            info_hash,
            signal,
            timeout: self.config.metadata_timeout,
            lifetime,
            registry: Arc::clone(&self.registry),
            events: self.events.clone(),
            metrics: self.metrics.clone(),
        }
        .spawn();

        info!(
            info_hash = %info_hash,
            name = magnet.display_name().unwrap_or_default(),
            "magnet transfer registered; waiting for metadata"
        );
        Ok(info_hash)
    }

    async fn add_descriptor_inner(&self, path: &Path) -> TransferResult<InfoHash> {
        let metainfo = Metainfo::load(path).await?;
        let info_hash = metainfo.info_hash();
        self.ensure_absent(info_hash).await?;

        let handle = self
            .engine
            .add_descriptor(&metainfo)
            .await
            .map_err(|err| TransferError::engine("add_descriptor", Some(info_hash), err))?;
        if let Err(err) = handle.request_all_pieces() {
            handle.drop_transfer();
            return Err(TransferError::engine(
                "request_all_pieces",
                Some(info_hash),
                err,
            ));
        }
        self.register(handle, SessionOrigin::Descriptor).await?;

        let name = metainfo.metadata().name.clone();
        info!(info_hash = %info_hash, name = %name, path = %path.display(), "descriptor transfer added");
        self.publish(Event::TransferAdded { info_hash, name });
        Ok(info_hash)
    }

    async fn add_local_inner(&self, paths: Vec<PathBuf>) -> TransferResult<InfoHash> {
        let seed = SeedDescriptor::build(
            paths,
            self.config.seed_piece_length,
            self.config.seed_trackers.clone(),
        )
        .await?;
        let info_hash = seed.metainfo().info_hash();
        self.ensure_absent(info_hash).await?;

        let handle = self
            .engine
            .add_seed_only(&seed)
            .await
            .map_err(|err| TransferError::engine("add_seed_only", Some(info_hash), err))?;
        self.register(handle, SessionOrigin::LocalSeed).await?;

        let name = seed.metainfo().metadata().name.clone();
        info!(
            info_hash = %info_hash,
            name = %name,
            files = seed.sources().len(),
            "local files added for seeding"
        );
        self.publish(Event::TransferAdded { info_hash, name });
        Ok(info_hash)
    }

    async fn pause_inner(&self, info_hash: InfoHash) -> TransferResult<()> {
        self.registry
            .with_session(info_hash, |session| {
                session.handle().cancel_all_piece_requests()
            })
            .await?
            .map_err(|err| TransferError::engine("cancel_all_piece_requests", Some(info_hash), err))?;
        info!(info_hash = %info_hash, "transfer paused");
        self.publish(Event::TransferPaused { info_hash });
        Ok(())
    }

    async fn resume_inner(&self, info_hash: InfoHash) -> TransferResult<()> {
        self.registry
            .with_session(info_hash, |session| session.handle().request_all_pieces())
            .await?
            .map_err(|err| TransferError::engine("request_all_pieces", Some(info_hash), err))?;
        info!(info_hash = %info_hash, "transfer resumed");
        self.publish(Event::TransferResumed { info_hash });
        Ok(())
    }

    async fn remove_inner(
        &self,
        info_hash: InfoHash,
        delete_files: bool,
    ) -> TransferResult<RemovalReport> {
        let session = self.registry.remove(info_hash).await?;
        let origin = session.origin();
        let metadata = session.handle().metadata();
        session.handle().drop_transfer();
        drop(session);

        let mut report = RemovalReport::for_transfer(info_hash);
        if delete_files {
            match metadata {
                Some(metadata) => {
                    delete_payload(&self.config.download_dir, &metadata, &mut report).await;
                }
                None => debug!(info_hash = %info_hash, "metadata unknown; no files to delete"),
            }
        }

        info!(
            info_hash = %info_hash,
            origin = origin.as_str(),
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "transfer removed"
        );
        self.publish(Event::TransferRemoved {
            info_hash,
            deleted_files: report.deleted.len(),
            failed_files: report.failed.len(),
        });
        Ok(report)
    }
}

#[async_trait]
impl TransferWorkflow for SessionManager {
    async fn add_magnet(&self, uri: &str) -> TransferResult<InfoHash> {
        let result = self.add_magnet_inner(uri).await;
        self.record("add_magnet", result)
    }

    async fn add_descriptor_file(&self, path: &Path) -> TransferResult<InfoHash> {
        let result = self.add_descriptor_inner(path).await;
        self.record("add_descriptor_file", result)
    }

    async fn add_local_for_seeding(&self, paths: Vec<PathBuf>) -> TransferResult<InfoHash> {
        let result = self.add_local_inner(paths).await;
        self.record("add_local_for_seeding", result)
    }

    async fn pause(&self, id: InfoHash) -> TransferResult<()> {
        let result = self.pause_inner(id).await;
        self.record("pause", result)
    }

    async fn resume(&self, id: InfoHash) -> TransferResult<()> {
        let result = self.resume_inner(id).await;
        self.record("resume", result)
    }

    async fn remove(&self, id: InfoHash, delete_files: bool) -> TransferResult<RemovalReport> {
        let result = self.remove_inner(id, delete_files).await;
        self.record("remove", result)
    }
}

#[async_trait]
impl TransferInspector for SessionManager {
    async fn list(&self) -> Vec<TransferSnapshot> {
        self.registry.views().await.iter().map(build_snapshot).collect()
    }

    async fn get(&self, id: InfoHash) -> TransferResult<TransferSnapshot> {
        self.registry.view(id).await.map(|view| build_snapshot(&view))
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Delete every payload file below `download_dir`, recording each outcome.
async fn delete_payload(download_dir: &Path, metadata: &TransferMetadata, report: &mut RemovalReport) {
    for file in &metadata.files {
        let path = download_dir.join(&file.path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "payload file deleted");
                report.deleted.push(path);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to delete payload file");
                report.failed.push((path, err.to_string()));
            }
        }
    }

    // Multi-file layouts keep their files under a directory named after the
    // transfer; prune it deepest first once empty.
    if metadata.files.iter().any(|file| file.path.components().count() > 1) {
        let root = download_dir.join(&metadata.name);
        let mut dirs: Vec<PathBuf> = metadata
            .files
            .iter()
            .flat_map(|file| file.path.ancestors().skip(1))
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| download_dir.join(dir))
            .filter(|dir| dir.starts_with(&root))
            .collect();
        dirs.sort();
        dirs.dedup();
        dirs.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));
        for dir in dirs {
            if let Err(err) = tokio::fs::remove_dir(&dir).await {
                debug!(path = %dir.display(), error = %err, "transfer directory left in place");
            }
        }
    }
}
