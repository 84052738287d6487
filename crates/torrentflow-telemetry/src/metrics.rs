//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Gauges mirror the latest broadcast tick; counters accumulate for the
//!   process lifetime.

use std::sync::Arc;
use std::time::Duration;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared by the manager and the binary.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    tracked_sessions: IntGauge,
    active_transfers: IntGauge,
    total_peers: IntGauge,
    download_bytes_per_second: IntGauge,
    upload_bytes_per_second: IntGauge,
    tick_duration_ms: IntGauge,
    ticks_total: IntCounter,
    sampling_failures_total: IntCounter,
    metadata_timeouts_total: IntCounter,
    operations_total: IntCounterVec,
    events_emitted_total: IntCounterVec,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Sessions present in the registry at the last tick.
    pub tracked_sessions: i64,
    /// Sessions not yet fully complete at the last tick.
    pub active_transfers: i64,
    /// Connected peers across all sessions at the last tick.
    pub total_peers: i64,
    /// Aggregate download rate at the last tick.
    pub download_bytes_per_second: i64,
    /// Aggregate upload rate at the last tick.
    pub upload_bytes_per_second: i64,
    /// Broadcaster ticks completed.
    pub ticks_total: u64,
    /// Sessions skipped because their counters could not be read.
    pub sampling_failures_total: u64,
    /// Metadata waits that timed out.
    pub metadata_timeouts_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// created or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let tracked_sessions = gauge(
            &registry,
            "torrentflow_tracked_sessions",
            "Sessions present in the registry",
        )?;
        let active_transfers = gauge(
            &registry,
            "torrentflow_active_transfers",
            "Sessions that are not yet fully complete",
        )?;
        let total_peers = gauge(
            &registry,
            "torrentflow_total_peers",
            "Connected peers across all sessions",
        )?;
        let download_bytes_per_second = gauge(
            &registry,
            "torrentflow_download_bytes_per_second",
            "Aggregate download rate",
        )?;
        let upload_bytes_per_second = gauge(
            &registry,
            "torrentflow_upload_bytes_per_second",
            "Aggregate upload rate",
        )?;
        let tick_duration_ms = gauge(
            &registry,
            "torrentflow_tick_duration_ms",
            "Time spent assembling the latest broadcast tick (ms)",
        )?;
        let ticks_total = counter(
            &registry,
            "torrentflow_ticks_total",
            "Broadcast ticks completed",
        )?;
        let sampling_failures_total = counter(
            &registry,
            "torrentflow_sampling_failures_total",
            "Sessions skipped during a tick because counters could not be read",
        )?;
        let metadata_timeouts_total = counter(
            &registry,
            "torrentflow_metadata_timeouts_total",
            "Metadata waits that timed out",
        )?;
        let operations_total = counter_vec(
            &registry,
            "torrentflow_operations_total",
            "Manager operations by kind and outcome",
            &["operation", "outcome"],
        )?;
        let events_emitted_total = counter_vec(
            &registry,
            "torrentflow_events_emitted_total",
            "Events published by type",
            &["type"],
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                tracked_sessions,
                active_transfers,
                total_peers,
                download_bytes_per_second,
                upload_bytes_per_second,
                tick_duration_ms,
                ticks_total,
                sampling_failures_total,
                metadata_timeouts_total,
                operations_total,
                events_emitted_total,
            }),
        })
    }

    /// Record the aggregate figures of one broadcast tick.
    pub fn observe_tick(
        &self,
        sessions: usize,
        active: usize,
        peers: u32,
        download_bps: u64,
        upload_bps: u64,
        elapsed: Duration,
    ) {
        let inner = &self.inner;
        inner.tracked_sessions.set(saturating_i64(sessions as u64));
        inner.active_transfers.set(saturating_i64(active as u64));
        inner.total_peers.set(i64::from(peers));
        inner.download_bytes_per_second.set(saturating_i64(download_bps));
        inner.upload_bytes_per_second.set(saturating_i64(upload_bps));
        inner.tick_duration_ms.set(Self::duration_to_ms(elapsed));
        inner.ticks_total.inc();
    }

    /// Increment the sampling failure counter.
    pub fn inc_sampling_failure(&self) {
        self.inner.sampling_failures_total.inc();
    }

    /// Increment the metadata timeout counter.
    pub fn inc_metadata_timeout(&self) {
        self.inner.metadata_timeouts_total.inc();
    }

    /// Count a manager operation by name and outcome (`ok` or an error code).
    pub fn inc_operation(&self, operation: &str, outcome: &str) {
        self.inner
            .operations_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    /// Increment the emitted event counter for the specific event type.
    pub fn inc_event(&self, event_type: &str) {
        self.inner
            .events_emitted_total
            .with_label_values(&[event_type])
            .inc();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        MetricsSnapshot {
            tracked_sessions: inner.tracked_sessions.get(),
            active_transfers: inner.active_transfers.get(),
            total_peers: inner.total_peers.get(),
            download_bytes_per_second: inner.download_bytes_per_second.get(),
            upload_bytes_per_second: inner.upload_bytes_per_second.get(),
            ticks_total: inner.ticks_total.get(),
            sampling_failures_total: inner.sampling_failures_total.get(),
            metadata_timeouts_total: inner.metadata_timeouts_total.get(),
        }
    }

    /// Convert a duration to milliseconds saturating at `i64::MAX`.
    pub(crate) fn duration_to_ms(duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
    }
}

fn gauge(registry: &Registry, name: &'static str, help: &str) -> Result<IntGauge> {
    let gauge = IntGauge::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })?;
    registry
        .register(Box::new(gauge.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })?;
    Ok(gauge)
}

fn counter(registry: &Registry, name: &'static str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })?;
    Ok(counter)
}

fn counter_vec(
    registry: &Registry,
    name: &'static str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsCollector { name, source })?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })?;
    Ok(counter)
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_to_ms_saturates_on_large_values() {
        let duration = Duration::from_secs(u64::MAX / 2);
        assert_eq!(Metrics::duration_to_ms(duration), i64::MAX);
    }

    #[test]
    fn metrics_snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.observe_tick(3, 2, 7, 4_096, u64::MAX, Duration::from_millis(4));
        metrics.inc_sampling_failure();
        metrics.inc_metadata_timeout();
        metrics.inc_operation("add_magnet", "ok");
        metrics.inc_event("transfers_updated");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tracked_sessions, 3);
        assert_eq!(snapshot.active_transfers, 2);
        assert_eq!(snapshot.total_peers, 7);
        assert_eq!(snapshot.download_bytes_per_second, 4_096);
        assert_eq!(snapshot.upload_bytes_per_second, i64::MAX);
        assert_eq!(snapshot.ticks_total, 1);
        assert_eq!(snapshot.sampling_failures_total, 1);
        assert_eq!(snapshot.metadata_timeouts_total, 1);

        let rendered = metrics.render()?;
        assert!(rendered.contains("torrentflow_operations_total"));
        assert!(rendered.contains("operation=\"add_magnet\""));
        assert!(rendered.contains("torrentflow_tick_duration_ms 4"));
        Ok(())
    }

    #[test]
    fn snapshot_serialises_for_health_reporting() -> Result<()> {
        let metrics = Metrics::new()?;
        let json = serde_json::to_value(metrics.snapshot()).expect("serialise");
        assert_eq!(json["ticks_total"], 0);
        Ok(())
    }
}
