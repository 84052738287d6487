//! One tracked transfer.

use std::fmt;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use torrentflow_core::{InfoHash, TransferHandle};

/// How a session entered the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    /// Added from a magnet link; metadata may still be pending.
    Magnet,
    /// Added from a `.torrent` descriptor file.
    Descriptor,
    /// Built from local files and seeded only.
    LocalSeed,
}

impl SessionOrigin {
    /// Stable label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Magnet => "magnet",
            Self::Descriptor => "descriptor",
            Self::LocalSeed => "local_seed",
        }
    }
}

/// Registry entry owning the engine handle of one transfer.
///
/// The identifier is taken from the handle once and never changes. The
/// lifetime token is cancelled when the session leaves the registry so
/// background work tied to it can stop.
pub struct TransferSession {
    info_hash: InfoHash,
    handle: Box<dyn TransferHandle>,
    added_at: DateTime<Utc>,
    origin: SessionOrigin,
    lifetime: CancellationToken,
}

impl TransferSession {
    /// Wrap an engine handle, stamping the creation time.
    #[must_use]
    pub fn new(
        handle: Box<dyn TransferHandle>,
        origin: SessionOrigin,
        lifetime: CancellationToken,
    ) -> Self {
        Self {
            info_hash: handle.info_hash(),
            handle,
            added_at: Utc::now(),
            origin,
            lifetime,
        }
    }

    /// Content identifier.
    #[must_use]
    pub const fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    /// Engine handle.
    #[must_use]
    pub fn handle(&self) -> &dyn TransferHandle {
        self.handle.as_ref()
    }

    /// Creation time.
    #[must_use]
    pub const fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    /// How the session was created.
    #[must_use]
    pub const fn origin(&self) -> SessionOrigin {
        self.origin
    }

    /// Token cancelled when the session is removed.
    #[must_use]
    pub const fn lifetime(&self) -> &CancellationToken {
        &self.lifetime
    }
}

impl fmt::Debug for TransferSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferSession")
            .field("info_hash", &self.info_hash)
            .field("added_at", &self.added_at)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}
