//! Bounded wait for magnet metadata.
//!
//! Each magnet session gets one task that ends on the first of: metadata
//! arrival, the timeout, or cancellation of the session's lifetime token.
//! The task never acts on a session that has left the registry.

#![allow(clippy::redundant_pub_crate)]

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use torrentflow_core::{InfoHash, MetadataSignal, TransferError};
use torrentflow_events::{Event, EventBus};
use torrentflow_telemetry::Metrics;
use tracing::{debug, info, warn};

use crate::registry::SessionRegistry;
use crate::snapshot::METADATA_PLACEHOLDER;

/// How a metadata wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    /// Metadata arrived and pieces were requested.
    Resolved,
    /// The timeout elapsed first; the session stays registered.
    TimedOut,
    /// The engine dropped the readiness signal.
    Abandoned,
    /// The session was removed or the manager shut down.
    Cancelled,
}

pub(crate) struct MetadataWait {
    pub(crate) info_hash: InfoHash,
    pub(crate) signal: MetadataSignal,
    pub(crate) timeout: Duration,
    pub(crate) lifetime: CancellationToken,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) events: EventBus,
    pub(crate) metrics: Metrics,
}

impl MetadataWait {
    pub(crate) fn spawn(self) -> JoinHandle<WaitOutcome> {
        tokio::spawn(self.run())
    }

    pub(crate) async fn run(self) -> WaitOutcome {
        let Self {
            info_hash,
            signal,
            timeout,
            lifetime,
            registry,
            events,
            metrics,
        } = self;

        let outcome = tokio::select! {
            biased;
            () = lifetime.cancelled() => WaitOutcome::Cancelled,
            ready = signal.ready() => {
                if ready { WaitOutcome::Resolved } else { WaitOutcome::Abandoned }
            }
            () = tokio::time::sleep(timeout) => WaitOutcome::TimedOut,
        };

        match outcome {
            WaitOutcome::Resolved => {
                let requested = registry
                    .with_session(info_hash, |session| {
                        let handle = session.handle();
                        let name = handle
                            .name()
                            .unwrap_or_else(|| METADATA_PLACEHOLDER.to_string());
                        (handle.request_all_pieces(), name)
                    })
                    .await;
                match requested {
                    Ok((Ok(()), name)) => {
                        info!(info_hash = %info_hash, name = %name, "metadata resolved; downloading");
                        metrics.inc_event("transfer_added");
                        let _ = events.publish(Event::TransferAdded { info_hash, name });
                    }
                    Ok((Err(err), _)) => {
                        warn!(info_hash = %info_hash, error = %err, "metadata resolved but piece request failed");
                    }
                    Err(TransferError::NotFound { .. }) => {
                        debug!(info_hash = %info_hash, "session removed before metadata arrived");
                        return WaitOutcome::Cancelled;
                    }
                    Err(err) => {
                        warn!(info_hash = %info_hash, error = %err, "metadata follow-up failed");
                    }
                }
            }
            WaitOutcome::TimedOut => {
                // Published under the registry read lock so a concurrent
                // removal either precedes the check or follows the event.
                let timed_out = TransferError::MetadataTimeout {
                    info_hash,
                    waited: timeout,
                };
                let published = registry
                    .with_session(info_hash, |_| {
                        warn!(
                            info_hash = %info_hash,
                            waited_secs = timeout.as_secs(),
                            error = ?timed_out,
                            "metadata did not arrive in time; session kept"
                        );
                        metrics.inc_metadata_timeout();
                        metrics.inc_event("metadata_timeout");
                        events.publish(Event::MetadataTimeout {
                            info_hash,
                            waited_secs: timeout.as_secs(),
                        })
                    })
                    .await;
                if published.is_err() {
                    debug!(info_hash = %info_hash, "session removed before metadata timed out");
                    return WaitOutcome::Cancelled;
                }
            }
            WaitOutcome::Abandoned => {
                warn!(info_hash = %info_hash, "engine abandoned the metadata signal");
            }
            WaitOutcome::Cancelled => {
                debug!(info_hash = %info_hash, "metadata wait cancelled");
            }
        }
        outcome
    }
}
