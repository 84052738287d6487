//! Engine collaborator traits and the façade traits exposed to callers.

use std::path::{Path, PathBuf};

use anyhow::bail;
use async_trait::async_trait;
use tokio::sync::watch;
use torrentflow_events::{InfoHash, TransferSnapshot};

use crate::error::TransferResult;
use crate::model::{
    FileCompletion, MagnetLink, Metainfo, RemovalReport, SeedDescriptor, TransferCounters,
    TransferMetadata,
};

/// Primary engine trait implemented by protocol adapters.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Start resolving a transfer from a magnet link; metadata may arrive later.
    async fn add_magnet(&self, magnet: &MagnetLink) -> anyhow::Result<Box<dyn TransferHandle>>;

    /// Admit a transfer whose descriptor is already known.
    async fn add_descriptor(&self, metainfo: &Metainfo) -> anyhow::Result<Box<dyn TransferHandle>>;

    /// Admit local files for seeding only; default implementation reports
    /// lack of support.
    async fn add_seed_only(
        &self,
        seed: &SeedDescriptor,
    ) -> anyhow::Result<Box<dyn TransferHandle>> {
        let _ = seed;
        bail!("seed-only transfers not supported by this engine");
    }
}

/// Engine-side object for one transfer.
///
/// Every method is a cheap, non-blocking read or command; the session layer
/// calls them while holding registry locks.
pub trait TransferHandle: Send + Sync {
    /// Content identifier.
    fn info_hash(&self) -> InfoHash;

    /// Best known display name (may come from a magnet `dn` before metadata).
    fn name(&self) -> Option<String>;

    /// Resolved metadata, `None` until the engine has it.
    fn metadata(&self) -> Option<TransferMetadata>;

    /// Point-in-time counters.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine can no longer report on the transfer.
    fn counters(&self) -> anyhow::Result<TransferCounters>;

    /// Per-file completion; empty until metadata is known.
    fn file_completion(&self) -> Vec<FileCompletion>;

    /// Signal that resolves once metadata is available.
    fn metadata_ready(&self) -> MetadataSignal;

    /// Request every piece.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine rejects the request.
    fn request_all_pieces(&self) -> anyhow::Result<()>;

    /// Cancel outstanding requests for every piece.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine rejects the request.
    fn cancel_all_piece_requests(&self) -> anyhow::Result<()>;

    /// Detach the transfer from the engine. Data on disk is untouched.
    fn drop_transfer(&self);
}

/// Creates a linked metadata notifier and signal.
#[must_use]
pub fn metadata_channel(resolved: bool) -> (MetadataNotifier, MetadataSignal) {
    let (sender, receiver) = watch::channel(resolved);
    (MetadataNotifier { sender }, MetadataSignal { receiver })
}

/// Engine-side half of a metadata readiness signal.
#[derive(Debug)]
pub struct MetadataNotifier {
    sender: watch::Sender<bool>,
}

impl MetadataNotifier {
    /// Mark metadata as available. Repeated calls are harmless.
    pub fn notify(&self) {
        self.sender.send_replace(true);
    }

    /// Another signal observing this notifier.
    #[must_use]
    pub fn subscribe(&self) -> MetadataSignal {
        MetadataSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Whether [`Self::notify`] has been called.
    #[must_use]
    pub fn is_notified(&self) -> bool {
        *self.sender.borrow()
    }
}

/// One-shot readiness signal observed by the session layer.
#[derive(Debug, Clone)]
pub struct MetadataSignal {
    receiver: watch::Receiver<bool>,
}

impl MetadataSignal {
    /// Whether metadata is already available.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until metadata is available.
    ///
    /// Returns `false` if the engine dropped the notifier first, in which case
    /// metadata will never arrive.
    pub async fn ready(mut self) -> bool {
        if self.is_ready() {
            return true;
        }
        self.receiver.wait_for(|ready| *ready).await.is_ok()
    }
}

/// Mutating façade over the session registry.
#[async_trait]
pub trait TransferWorkflow: Send + Sync {
    /// Register a transfer from a magnet URI.
    async fn add_magnet(&self, uri: &str) -> TransferResult<InfoHash>;

    /// Register a transfer from a descriptor file.
    async fn add_descriptor_file(&self, path: &Path) -> TransferResult<InfoHash>;

    /// Register local files for seeding.
    async fn add_local_for_seeding(&self, paths: Vec<PathBuf>) -> TransferResult<InfoHash>;

    /// Stop requesting pieces.
    async fn pause(&self, id: InfoHash) -> TransferResult<()>;

    /// Resume requesting pieces.
    async fn resume(&self, id: InfoHash) -> TransferResult<()>;

    /// Remove a transfer, optionally deleting its payload.
    async fn remove(&self, id: InfoHash, delete_files: bool) -> TransferResult<RemovalReport>;
}

/// Read-only façade over the session registry.
#[async_trait]
pub trait TransferInspector: Send + Sync {
    /// Snapshot of every session.
    async fn list(&self) -> Vec<TransferSnapshot>;

    /// Snapshot of one session.
    async fn get(&self, id: InfoHash) -> TransferResult<TransferSnapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct MagnetOnly;

    #[async_trait]
    impl TransferEngine for MagnetOnly {
        async fn add_magnet(&self, _magnet: &MagnetLink) -> anyhow::Result<Box<dyn TransferHandle>> {
            bail!("offline")
        }

        async fn add_descriptor(
            &self,
            _metainfo: &Metainfo,
        ) -> anyhow::Result<Box<dyn TransferHandle>> {
            bail!("offline")
        }
    }

    #[tokio::test]
    async fn seed_only_defaults_to_unsupported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"payload").expect("write");
        let seed = SeedDescriptor::build(vec![path], 16, Vec::new())
            .await
            .expect("seed");
        let err = MagnetOnly
            .add_seed_only(&seed)
            .await
            .err()
            .expect("unsupported");
        assert!(err.to_string().contains("not supported"));
    }

    #[tokio::test]
    async fn signal_resolves_after_notify() {
        let (notifier, signal) = metadata_channel(false);
        assert!(!signal.is_ready());
        let waiter = tokio::spawn(signal.ready());
        notifier.notify();
        notifier.notify();
        assert!(notifier.is_notified());
        let resolved = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("resolves in time")
            .expect("task joins");
        assert!(resolved);
    }

    #[tokio::test]
    async fn signal_reports_abandoned_notifier() {
        let (notifier, signal) = metadata_channel(false);
        drop(notifier);
        assert!(!signal.ready().await);

        let (notifier, _) = metadata_channel(true);
        let late = notifier.subscribe();
        drop(notifier);
        assert!(late.ready().await);
    }
}
