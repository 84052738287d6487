//! Session registry with paired rate trackers.
//!
//! # Design
//! - Sessions and both tracker maps live behind one `RwLock`, so every
//!   reader sees a state that existed at a single instant and trackers are
//!   created and removed together with their session.
//! - Tokio's lock is write-preferring and fair, so a stream of readers cannot
//!   starve an insert or removal.
//! - Only [`SessionRegistry::sample_all`] mutates trackers; read-only views
//!   reuse the rate computed by the last tick.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use torrentflow_core::{
    FileCompletion, InfoHash, RateTracker, TransferCounters, TransferError, TransferResult,
};
use tracing::warn;

use crate::session::TransferSession;

/// Concurrency-safe store of live sessions keyed by content identifier.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    state: RwLock<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    sessions: HashMap<InfoHash, TransferSession>,
    download: HashMap<InfoHash, RateTracker>,
    upload: HashMap<InfoHash, RateTracker>,
}

/// Counters and rates of one session read at a single instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    /// Content identifier.
    pub info_hash: InfoHash,
    /// Best known display name.
    pub name: Option<String>,
    /// Engine counters.
    pub counters: TransferCounters,
    /// Per-file completion, empty until metadata is known.
    pub files: Vec<FileCompletion>,
    /// Download rate in bytes per second.
    pub download_rate: u64,
    /// Upload rate in bytes per second.
    pub upload_rate: u64,
    /// Session creation time.
    pub added_at: DateTime<Utc>,
}

/// A session whose counters could not be read during a tick.
#[derive(Debug)]
pub struct SamplingFailure {
    /// Affected session.
    pub info_hash: InfoHash,
    /// Reason reported by the engine.
    pub error: anyhow::Error,
}

impl SessionRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and its rate trackers.
    ///
    /// Trackers start from the session's current wire counters so traffic
    /// that happened before registration is not reported as a burst.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::DuplicateId`] if the identifier is taken; the
    /// rejected session is dropped without touching the engine transfer.
    pub async fn insert(&self, session: TransferSession) -> TransferResult<()> {
        let info_hash = session.info_hash();
        let now = now();
        let (read, written) = session
            .handle()
            .counters()
            .map_or((0, 0), |counters| (counters.bytes_read, counters.bytes_written));

        let mut state = self.state.write().await;
        if state.sessions.contains_key(&info_hash) {
            return Err(TransferError::DuplicateId { info_hash });
        }
        state
            .download
            .insert(info_hash, RateTracker::starting_at(read, now));
        state
            .upload
            .insert(info_hash, RateTracker::starting_at(written, now));
        state.sessions.insert(info_hash, session);
        Ok(())
    }

    /// Remove a session and its trackers, cancelling its lifetime token.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::NotFound`] if the identifier is absent.
    pub async fn remove(&self, info_hash: InfoHash) -> TransferResult<TransferSession> {
        let session = {
            let mut state = self.state.write().await;
            let session = state
                .sessions
                .remove(&info_hash)
                .ok_or(TransferError::NotFound { info_hash })?;
            state.download.remove(&info_hash);
            state.upload.remove(&info_hash);
            session
        };
        session.lifetime().cancel();
        Ok(session)
    }

    /// Whether a session is registered under the identifier.
    pub async fn contains(&self, info_hash: InfoHash) -> bool {
        self.state.read().await.sessions.contains_key(&info_hash)
    }

    /// Number of registered sessions.
    pub async fn len(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.sessions.is_empty()
    }

    /// Identifiers of every registered session.
    pub async fn ids(&self) -> Vec<InfoHash> {
        self.state.read().await.sessions.keys().copied().collect()
    }

    /// Run `f` against one session under the read lock.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::NotFound`] if the identifier is absent.
    pub async fn with_session<F, R>(&self, info_hash: InfoHash, f: F) -> TransferResult<R>
    where
        F: FnOnce(&TransferSession) -> R + Send,
    {
        let state = self.state.read().await;
        state
            .sessions
            .get(&info_hash)
            .map(f)
            .ok_or(TransferError::NotFound { info_hash })
    }

    /// Read-only view of one session using the last computed rates.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::NotFound`] if the identifier is absent and
    /// [`TransferError::EngineFailure`] if its counters cannot be read.
    pub async fn view(&self, info_hash: InfoHash) -> TransferResult<SessionView> {
        let state = self.state.read().await;
        let session = state
            .sessions
            .get(&info_hash)
            .ok_or(TransferError::NotFound { info_hash })?;
        state
            .view_of(session)
            .map_err(|err| TransferError::engine("counters", Some(info_hash), err))
    }

    /// Read-only views of every session using the last computed rates.
    ///
    /// Sessions whose counters cannot be read are left out.
    pub async fn views(&self) -> Vec<SessionView> {
        let state = self.state.read().await;
        state
            .sessions
            .values()
            .filter_map(|session| match state.view_of(session) {
                Ok(view) => Some(view),
                Err(err) => {
                    warn!(info_hash = %session.info_hash(), error = %err, "session counters unavailable");
                    None
                }
            })
            .collect()
    }

    /// Sample every session's counters at `now` and advance its trackers.
    ///
    /// Runs under the write lock so the whole registry is sampled at one
    /// point in time. A session whose counters cannot be read keeps its
    /// trackers unchanged and is reported as a failure; the others are
    /// still sampled.
    pub async fn sample_all(&self, now: Instant) -> Vec<Result<SessionView, SamplingFailure>> {
        let mut guard = self.state.write().await;
        let RegistryState {
            sessions,
            download,
            upload,
        } = &mut *guard;

        sessions
            .values()
            .map(|session| {
                let info_hash = session.info_hash();
                let handle = session.handle();
                let counters = handle
                    .counters()
                    .map_err(|error| SamplingFailure { info_hash, error })?;
                let (Some(down), Some(up)) = (download.get_mut(&info_hash), upload.get_mut(&info_hash))
                else {
                    return Err(SamplingFailure {
                        info_hash,
                        error: anyhow::anyhow!("rate trackers missing"),
                    });
                };
                Ok(SessionView {
                    info_hash,
                    name: handle.name(),
                    counters,
                    files: handle.file_completion(),
                    download_rate: down.sample(counters.bytes_read, now),
                    upload_rate: up.sample(counters.bytes_written, now),
                    added_at: session.added_at(),
                })
            })
            .collect()
    }

    #[cfg(test)]
    async fn trackers_match_sessions(&self) -> bool {
        let state = self.state.read().await;
        state.sessions.len() == state.download.len()
            && state.sessions.len() == state.upload.len()
            && state
                .sessions
                .keys()
                .all(|id| state.download.contains_key(id) && state.upload.contains_key(id))
    }
}

impl RegistryState {
    fn view_of(&self, session: &TransferSession) -> anyhow::Result<SessionView> {
        let info_hash = session.info_hash();
        let handle = session.handle();
        let counters = handle.counters()?;
        let rate = |trackers: &HashMap<InfoHash, RateTracker>| {
            trackers
                .get(&info_hash)
                .map_or(0, RateTracker::current_rate)
        };
        Ok(SessionView {
            info_hash,
            name: handle.name(),
            counters,
            files: handle.file_completion(),
            download_rate: rate(&self.download),
            upload_rate: rate(&self.upload),
            added_at: session.added_at(),
        })
    }
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
