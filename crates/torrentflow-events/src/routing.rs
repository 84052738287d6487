//! Event bus routing.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::broadcast::{self, Sender};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};

/// Stream handed to subscribers: replayed backlog first, then live events.
///
/// Subscribers that fall behind the broadcast buffer silently skip the
/// events they missed.
pub type EventStream = Pin<Box<dyn Stream<Item = EventEnvelope> + Send>>;

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    replay: Arc<Mutex<VecDeque<EventEnvelope>>>,
    replay_capacity: usize,
    next_id: Arc<Mutex<EventId>>,
}

impl EventBus {
    /// Construct a bus with a custom replay capacity (minimum one).
    #[must_use]
    pub fn with_capacity(replay_capacity: usize) -> Self {
        let replay_capacity = replay_capacity.max(1);
        let (sender, _) = broadcast::channel(replay_capacity);
        Self {
            sender,
            replay: Arc::new(Mutex::new(VecDeque::with_capacity(replay_capacity))),
            replay_capacity,
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Construct a bus with the default replay capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Subscribe to the bus, replaying buffered events newer than
    /// `last_event_id` before switching to live delivery.
    #[must_use]
    pub fn subscribe(&self, last_event_id: Option<EventId>) -> EventStream {
        let receiver = self.sender.subscribe();
        let backlog = last_event_id.map_or_else(Vec::new, |id| self.backlog_since(id));
        let floor = backlog
            .last()
            .map(|env| env.id)
            .or(last_event_id)
            .unwrap_or(0);

        let live = BroadcastStream::new(receiver)
            .filter_map(Result::ok)
            .filter(move |env| env.id > floor);
        Box::pin(tokio_stream::iter(backlog).chain(live))
    }

    /// Publish an event to all subscribers without waiting on any of them.
    pub fn send(&self, event: Event) -> EventId {
        let mut next = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
        let id = *next;
        *next = next.saturating_add(1);

        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };
        {
            let mut replay = self.lock_replay();
            if replay.len() == self.replay_capacity {
                let _ = replay.pop_front();
            }
            replay.push_back(envelope.clone());
        }
        // Sent while the id lock is held so subscribers observe ids in order.
        let _ = self.sender.send(envelope);
        drop(next);
        id
    }

    /// Publish and return the assigned event id.
    #[must_use]
    pub fn publish(&self, event: Event) -> EventId {
        self.send(event)
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Last event id observed in the replay buffer.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.lock_replay().back().map(|env| env.id)
    }

    /// Collect a backlog of events emitted after the specified id.
    #[must_use]
    pub fn backlog_since(&self, id: EventId) -> Vec<EventEnvelope> {
        let replay = self.lock_replay();
        replay.iter().filter(|env| env.id > id).cloned().collect()
    }

    fn lock_replay(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        self.replay.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
