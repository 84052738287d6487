//! Helpers for awaiting events in tests.

use std::time::Duration;

use tokio::time::timeout;
use tokio_stream::StreamExt;
use torrentflow_events::{EventEnvelope, EventStream};

/// Wait for the next event satisfying `predicate`, skipping others.
///
/// Returns `None` if the stream ends or `limit` elapses first.
pub async fn next_matching<F>(
    stream: &mut EventStream,
    limit: Duration,
    mut predicate: F,
) -> Option<EventEnvelope>
where
    F: FnMut(&EventEnvelope) -> bool,
{
    timeout(limit, async {
        while let Some(envelope) = stream.next().await {
            if predicate(&envelope) {
                return Some(envelope);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

/// Drain everything currently buffered without waiting for new events.
pub async fn drain_ready(stream: &mut EventStream) -> Vec<EventEnvelope> {
    let mut drained = Vec::new();
    while let Ok(Some(envelope)) = timeout(Duration::ZERO, stream.next()).await {
        drained.push(envelope);
    }
    drained
}

#[cfg(test)]
mod tests {
    use super::*;
    use torrentflow_events::{Event, EventBus, InfoHash};

    #[tokio::test]
    async fn next_matching_skips_unrelated_events() {
        let bus = EventBus::with_capacity(8);
        let mut stream = bus.subscribe(None);
        let _ = bus.publish(Event::TransferPaused {
            info_hash: InfoHash::from_bytes([1; 20]),
        });
        let wanted = bus.publish(Event::TransferResumed {
            info_hash: InfoHash::from_bytes([1; 20]),
        });

        let found = next_matching(&mut stream, Duration::from_secs(1), |env| {
            matches!(env.event, Event::TransferResumed { .. })
        })
        .await
        .expect("resumed event");
        assert_eq!(found.id, wanted);
    }

    #[tokio::test]
    async fn next_matching_gives_up_after_limit() {
        let bus = EventBus::with_capacity(8);
        let mut stream = bus.subscribe(None);
        let found = next_matching(&mut stream, Duration::from_millis(20), |_| true).await;
        assert!(found.is_none());
        assert!(drain_ready(&mut stream).await.is_empty());
    }
}
