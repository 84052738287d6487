//! Periodic progress broadcaster.
//!
//! # Design
//! - One task per manager, woken by a fixed interval and stopped only by the
//!   manager's shutdown token.
//! - Every tick samples the whole registry at one instant, then publishes one
//!   batch on the event bus. Publication never waits on subscribers.
//! - A session whose counters fail is reported on its own and skipped; the
//!   rest of the tick proceeds.

#![allow(clippy::redundant_pub_crate)]

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use torrentflow_events::{Event, EventBus, TransferBatch};
use torrentflow_telemetry::Metrics;
use tracing::{debug, trace, warn};

use crate::registry::SessionRegistry;
use crate::snapshot::{aggregate, build_snapshot};

/// Shared state a tick needs.
#[derive(Clone)]
pub(crate) struct Broadcaster {
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) events: EventBus,
    pub(crate) metrics: Metrics,
}

impl Broadcaster {
    /// Run ticks every `period` until `shutdown` fires.
    pub(crate) fn spawn(self, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(period_ms = period.as_millis(), "progress broadcaster started");
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let _ = self.tick().await;
                    }
                }
            }
            debug!("progress broadcaster stopped");
        })
    }

    /// Sample every session once and publish the resulting batch.
    pub(crate) async fn tick(&self) -> TransferBatch {
        let started = Instant::now();
        let outcomes = self.registry.sample_all(started.into_std()).await;
        let sessions = outcomes.len();

        let mut snapshots = Vec::with_capacity(sessions);
        for outcome in outcomes {
            match outcome {
                Ok(view) => snapshots.push(build_snapshot(&view)),
                Err(failure) => {
                    warn!(
                        info_hash = %failure.info_hash,
                        error = %failure.error,
                        "skipping session whose counters could not be read"
                    );
                    self.metrics.inc_sampling_failure();
                    self.publish(Event::SamplingFailed {
                        info_hash: failure.info_hash,
                        message: failure.error.to_string(),
                    });
                }
            }
        }

        let stats = aggregate(&snapshots);
        self.metrics.observe_tick(
            sessions,
            stats.active_transfers,
            stats.total_peers,
            stats.total_download,
            stats.total_upload,
            started.elapsed(),
        );
        trace!(
            sessions,
            active = stats.active_transfers,
            download_bps = stats.total_download,
            upload_bps = stats.total_upload,
            "broadcast tick"
        );

        let batch = TransferBatch { snapshots, stats };
        self.publish(Event::TransfersUpdated(batch.clone()));
        batch
    }

    fn publish(&self, event: Event) {
        self.metrics.inc_event(event.kind());
        let _ = self.events.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use tokio_stream::StreamExt;
    use torrentflow_core::{InfoHash, MagnetLink, TransferEngine, TransferStatus};

    use super::*;
    use crate::loopback::LoopbackEngine;
    use crate::session::{SessionOrigin, TransferSession};

    async fn broadcaster_with(engine: &LoopbackEngine, seeds: &[u8]) -> Broadcaster {
        let registry = Arc::new(SessionRegistry::new());
        for seed in seeds {
            let uri = format!(
                "magnet:?xt=urn:btih:{}",
                InfoHash::from_bytes([*seed; 20]).to_hex()
            );
            let handle = engine
                .add_magnet(&MagnetLink::parse(&uri).expect("magnet"))
                .await
                .expect("add");
            registry
                .insert(TransferSession::new(
                    handle,
                    SessionOrigin::Magnet,
                    CancellationToken::new(),
                ))
                .await
                .expect("insert");
        }
        Broadcaster {
            registry,
            events: EventBus::new(),
            metrics: Metrics::new().expect("metrics"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tick_publishes_batch_and_isolates_failures() {
        let engine = LoopbackEngine::new();
        let broadcaster = broadcaster_with(&engine, &[1, 2, 3]).await;
        let mut stream = broadcaster.events.subscribe(None);
        engine.fail_counters(InfoHash::from_bytes([2; 20]), Some("gone"));
        engine.set_peers(InfoHash::from_bytes([3; 20]), 2, 4, 0);
        tokio::time::advance(Duration::from_secs(1)).await;

        let batch = broadcaster.tick().await;
        assert_eq!(batch.snapshots.len(), 2);
        assert_eq!(batch.stats.active_transfers, 2);
        assert_eq!(batch.stats.total_peers, 2);
        assert!(batch.snapshots.iter().any(|s| s.status == TransferStatus::Downloading));

        let first = stream.next().await.expect("failure event");
        assert!(matches!(first.event, Event::SamplingFailed { ref message, .. } if message == "gone"));
        let second = stream.next().await.expect("batch event");
        assert!(matches!(second.event, Event::TransfersUpdated(ref published) if published == &batch));

        let metrics = broadcaster.metrics.snapshot();
        assert_eq!(metrics.ticks_total, 1);
        assert_eq!(metrics.sampling_failures_total, 1);
        assert_eq!(metrics.tracked_sessions, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rates_follow_wire_counters_and_never_go_negative() {
        let engine = LoopbackEngine::new();
        let broadcaster = broadcaster_with(&engine, &[7]).await;
        let id = InfoHash::from_bytes([7; 20]);

        engine.add_traffic(id, 3_000, 500);
        tokio::time::advance(Duration::from_secs(2)).await;
        let batch = broadcaster.tick().await;
        assert_eq!(batch.snapshots[0].download_speed, 1_500);
        assert_eq!(batch.snapshots[0].upload_speed, 250);
        assert_eq!(batch.stats.total_download, 1_500);

        engine.reset_traffic(id);
        tokio::time::advance(Duration::from_secs(1)).await;
        let batch = broadcaster.tick().await;
        assert_eq!(batch.snapshots[0].download_speed, 0);
        assert_eq!(batch.snapshots[0].upload_speed, 0);

        let batch = broadcaster.tick().await;
        assert_eq!(batch.snapshots[0].download_speed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_ticks_until_shutdown() {
        let engine = LoopbackEngine::new();
        let broadcaster = broadcaster_with(&engine, &[9]).await;
        let events = broadcaster.events.clone();
        let metrics = broadcaster.metrics.clone();
        let shutdown = CancellationToken::new();
        let task = broadcaster.spawn(Duration::from_secs(1), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(metrics.snapshot().ticks_total, 3);
        shutdown.cancel();
        task.await.expect("broadcaster joins");

        let published = events.last_event_id().expect("batches were published");
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(events.last_event_id(), Some(published));
    }
}
