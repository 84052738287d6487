//! In-memory engine collaborator with no networking.
//!
//! Transfers live in a shared table and are driven from the outside: tests
//! script metadata arrival, counters, peers and failures, and the binary
//! calls [`LoopbackEngine::advance`] to simulate traffic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use torrentflow_config::ManagerConfig;
use torrentflow_config::defaults::DEFAULT_LISTEN_PORT;
use torrentflow_core::{
    FileCompletion, InfoHash, MagnetLink, MetadataNotifier, MetadataSignal, Metainfo,
    SeedDescriptor, TransferCounters, TransferEngine, TransferHandle, TransferMetadata,
    metadata_channel,
};
use tracing::debug;

/// Engine-level settings taken from the manager configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Port peers would connect to.
    pub listen_port: u16,
    /// Whether peers can be found without trackers.
    pub enable_dht: bool,
    /// Whether downloads keep uploading once complete.
    pub seed_after_download: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_LISTEN_PORT,
            enable_dht: true,
            seed_after_download: true,
        }
    }
}

impl EngineOptions {
    /// Engine settings carried by `config`.
    #[must_use]
    pub const fn from_config(config: &ManagerConfig) -> Self {
        Self {
            listen_port: config.listen_port,
            enable_dht: config.enable_dht,
            seed_after_download: config.seed_after_download,
        }
    }
}

/// Loopback engine shared by clones.
#[derive(Clone, Default)]
pub struct LoopbackEngine {
    inner: Arc<Mutex<EngineState>>,
}

#[derive(Default)]
struct EngineState {
    options: EngineOptions,
    transfers: HashMap<InfoHash, Arc<LoopbackTransfer>>,
    rejection: Option<String>,
}

struct LoopbackTransfer {
    info_hash: InfoHash,
    notifier: MetadataNotifier,
    state: Mutex<TransferState>,
}

#[derive(Default)]
struct TransferState {
    name: Option<String>,
    metadata: Option<TransferMetadata>,
    bytes_completed: u64,
    bytes_read: u64,
    bytes_written: u64,
    active_peers: u32,
    known_peers: u32,
    connected_seeds: u32,
    requesting: bool,
    dropped: bool,
    seed_only: bool,
    counter_failure: Option<String>,
    request_count: usize,
}

struct LoopbackHandle {
    transfer: Arc<LoopbackTransfer>,
}

impl LoopbackEngine {
    /// Engine with no transfers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with no transfers using `options`.
    #[must_use]
    pub fn with_options(options: EngineOptions) -> Self {
        debug!(
            listen_port = options.listen_port,
            dht = options.enable_dht,
            seed_after_download = options.seed_after_download,
            "loopback engine configured"
        );
        Self {
            inner: Arc::new(Mutex::new(EngineState {
                options,
                ..EngineState::default()
            })),
        }
    }

    /// Settings the engine was built with.
    #[must_use]
    pub fn options(&self) -> EngineOptions {
        self.lock().options
    }

    /// Make every subsequent add fail with `reason`, or accept adds again
    /// with `None`.
    pub fn reject_adds(&self, reason: Option<&str>) {
        self.lock().rejection = reason.map(str::to_string);
    }

    /// Deliver metadata for a transfer and fire its readiness signal.
    ///
    /// Returns `false` when the transfer is unknown.
    pub fn resolve_metadata(&self, info_hash: InfoHash, metadata: TransferMetadata) -> bool {
        let Some(transfer) = self.transfer(info_hash) else {
            return false;
        };
        {
            let mut state = transfer.lock();
            state.name = Some(metadata.name.clone());
            state.metadata = Some(metadata);
        }
        transfer.notifier.notify();
        true
    }

    /// Set verified bytes on disk, capped at the known total.
    pub fn set_progress(&self, info_hash: InfoHash, bytes_completed: u64) {
        self.update(info_hash, |state| {
            state.bytes_completed = state
                .metadata
                .as_ref()
                .map_or(bytes_completed, |metadata| {
                    bytes_completed.min(metadata.total_length())
                });
        });
    }

    /// Add payload bytes exchanged with peers.
    pub fn add_traffic(&self, info_hash: InfoHash, read: u64, written: u64) {
        self.update(info_hash, |state| {
            state.bytes_read = state.bytes_read.saturating_add(read);
            state.bytes_written = state.bytes_written.saturating_add(written);
        });
    }

    /// Rewind the wire counters, as an engine does after a restart.
    pub fn reset_traffic(&self, info_hash: InfoHash) {
        self.update(info_hash, |state| {
            state.bytes_read = 0;
            state.bytes_written = 0;
        });
    }

    /// Set peer counts.
    pub fn set_peers(&self, info_hash: InfoHash, active: u32, known: u32, seeds: u32) {
        self.update(info_hash, |state| {
            state.active_peers = active;
            state.known_peers = known;
            state.connected_seeds = seeds;
        });
    }

    /// Make counter reads fail with `reason`, or succeed again with `None`.
    pub fn fail_counters(&self, info_hash: InfoHash, reason: Option<&str>) {
        self.update(info_hash, |state| {
            state.counter_failure = reason.map(str::to_string);
        });
    }

    /// Whether the transfer is currently requesting pieces.
    #[must_use]
    pub fn is_requesting(&self, info_hash: InfoHash) -> Option<bool> {
        self.transfer(info_hash)
            .map(|transfer| transfer.lock().requesting)
    }

    /// Whether the transfer was dropped.
    #[must_use]
    pub fn is_dropped(&self, info_hash: InfoHash) -> Option<bool> {
        self.transfer(info_hash).map(|transfer| transfer.lock().dropped)
    }

    /// Whether the transfer was admitted for seeding only.
    #[must_use]
    pub fn is_seed_only(&self, info_hash: InfoHash) -> Option<bool> {
        self.transfer(info_hash)
            .map(|transfer| transfer.lock().seed_only)
    }

    /// Number of times all pieces were requested.
    #[must_use]
    pub fn request_count(&self, info_hash: InfoHash) -> Option<usize> {
        self.transfer(info_hash)
            .map(|transfer| transfer.lock().request_count)
    }

    /// Transfers known to the engine, including dropped ones.
    #[must_use]
    pub fn transfer_count(&self) -> usize {
        self.lock().transfers.len()
    }

    /// Simulate `elapsed` of traffic at `bytes_per_second`.
    ///
    /// Requesting transfers with metadata gain one peer if they have none and
    /// download until complete; complete transfers with peers upload at a
    /// quarter of the rate. Without `seed_after_download`, finished downloads
    /// disconnect their peers instead; seed-only transfers always upload.
    pub fn advance(&self, elapsed: Duration, bytes_per_second: u64) {
        let budget = scale(bytes_per_second, elapsed);
        let (transfers, keep_seeding) = {
            let engine = self.lock();
            let transfers: Vec<_> = engine.transfers.values().cloned().collect();
            (transfers, engine.options.seed_after_download)
        };
        for transfer in transfers {
            let mut state = transfer.lock();
            if state.dropped {
                continue;
            }
            let Some(total) = state.metadata.as_ref().map(TransferMetadata::total_length) else {
                continue;
            };
            if state.bytes_completed < total && state.requesting {
                state.active_peers = state.active_peers.max(1);
                state.known_peers = state.known_peers.max(state.active_peers);
                let gained = budget.min(total - state.bytes_completed);
                state.bytes_completed += gained;
                state.bytes_read = state.bytes_read.saturating_add(gained);
            } else if state.bytes_completed >= total
                && state.active_peers > 0
                && (keep_seeding || state.seed_only)
            {
                state.bytes_written = state.bytes_written.saturating_add(budget / 4);
            }
            if state.bytes_completed >= total && !keep_seeding && !state.seed_only {
                state.active_peers = 0;
                state.connected_seeds = 0;
            }
        }
    }

    fn admit(
        &self,
        info_hash: InfoHash,
        name: Option<String>,
        metadata: Option<TransferMetadata>,
        seed_only: bool,
    ) -> Result<Box<dyn TransferHandle>> {
        let mut engine = self.lock();
        if let Some(reason) = &engine.rejection {
            bail!("{reason}");
        }
        if let Some(existing) = engine.transfers.get(&info_hash)
            && !existing.lock().dropped
        {
            debug!(info_hash = %info_hash, "loopback transfer already present");
            return Ok(Box::new(LoopbackHandle {
                transfer: Arc::clone(existing),
            }));
        }

        let (notifier, _) = metadata_channel(metadata.is_some());
        let bytes_completed = if seed_only {
            metadata.as_ref().map_or(0, TransferMetadata::total_length)
        } else {
            0
        };
        let transfer = Arc::new(LoopbackTransfer {
            info_hash,
            notifier,
            state: Mutex::new(TransferState {
                name,
                metadata,
                bytes_completed,
                seed_only,
                ..TransferState::default()
            }),
        });
        engine.transfers.insert(info_hash, Arc::clone(&transfer));
        debug!(info_hash = %info_hash, seed_only, "loopback transfer admitted");
        Ok(Box::new(LoopbackHandle { transfer }))
    }

    fn transfer(&self, info_hash: InfoHash) -> Option<Arc<LoopbackTransfer>> {
        self.lock().transfers.get(&info_hash).cloned()
    }

    fn update(&self, info_hash: InfoHash, apply: impl FnOnce(&mut TransferState)) {
        if let Some(transfer) = self.transfer(info_hash) {
            apply(&mut transfer.lock());
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TransferEngine for LoopbackEngine {
    async fn add_magnet(&self, magnet: &MagnetLink) -> Result<Box<dyn TransferHandle>> {
        if magnet.trackers().is_empty() && !self.options().enable_dht {
            bail!("magnet has no trackers and the DHT is disabled");
        }
        self.admit(
            magnet.info_hash(),
            magnet.display_name().map(str::to_string),
            None,
            false,
        )
    }

    async fn add_descriptor(&self, metainfo: &Metainfo) -> Result<Box<dyn TransferHandle>> {
        let metadata = metainfo.metadata().clone();
        self.admit(
            metainfo.info_hash(),
            Some(metadata.name.clone()),
            Some(metadata),
            false,
        )
    }

    async fn add_seed_only(&self, seed: &SeedDescriptor) -> Result<Box<dyn TransferHandle>> {
        let metainfo = seed.metainfo();
        let metadata = metainfo.metadata().clone();
        self.admit(
            metainfo.info_hash(),
            Some(metadata.name.clone()),
            Some(metadata),
            true,
        )
    }
}

impl LoopbackTransfer {
    fn lock(&self) -> MutexGuard<'_, TransferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TransferHandle for LoopbackHandle {
    fn info_hash(&self) -> InfoHash {
        self.transfer.info_hash
    }

    fn name(&self) -> Option<String> {
        self.transfer.lock().name.clone()
    }

    fn metadata(&self) -> Option<TransferMetadata> {
        self.transfer.lock().metadata.clone()
    }

    fn counters(&self) -> Result<TransferCounters> {
        let state = self.transfer.lock();
        if let Some(reason) = &state.counter_failure {
            bail!("{reason}");
        }
        if state.dropped {
            bail!("transfer {} was dropped", self.transfer.info_hash);
        }
        Ok(TransferCounters {
            bytes_completed: state.bytes_completed,
            total_length: state.metadata.as_ref().map(TransferMetadata::total_length),
            bytes_read: state.bytes_read,
            bytes_written: state.bytes_written,
            active_peers: state.active_peers,
            known_peers: state.known_peers,
            connected_seeds: state.connected_seeds,
        })
    }

    fn file_completion(&self) -> Vec<FileCompletion> {
        let state = self.transfer.lock();
        let Some(metadata) = &state.metadata else {
            return Vec::new();
        };
        // Pieces are assumed to land in file order.
        let mut remaining = state.bytes_completed;
        metadata
            .files
            .iter()
            .map(|entry| {
                let bytes_completed = remaining.min(entry.length);
                remaining -= bytes_completed;
                FileCompletion {
                    entry: entry.clone(),
                    bytes_completed,
                }
            })
            .collect()
    }

    fn metadata_ready(&self) -> MetadataSignal {
        self.transfer.notifier.subscribe()
    }

    fn request_all_pieces(&self) -> Result<()> {
        let mut state = self.transfer.lock();
        if state.dropped {
            bail!("transfer {} was dropped", self.transfer.info_hash);
        }
        if !state.seed_only {
            state.requesting = true;
            state.request_count += 1;
        }
        Ok(())
    }

    fn cancel_all_piece_requests(&self) -> Result<()> {
        let mut state = self.transfer.lock();
        if state.dropped {
            bail!("transfer {} was dropped", self.transfer.info_hash);
        }
        state.requesting = false;
        state.active_peers = 0;
        state.connected_seeds = 0;
        Ok(())
    }

    fn drop_transfer(&self) {
        let mut state = self.transfer.lock();
        state.dropped = true;
        state.requesting = false;
        state.active_peers = 0;
        state.connected_seeds = 0;
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    reason = "simulated budgets are small and non-negative"
)]
fn scale(bytes_per_second: u64, elapsed: Duration) -> u64 {
    (bytes_per_second as f64 * elapsed.as_secs_f64()) as u64
}
