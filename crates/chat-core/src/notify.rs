//! Notification sink: the non-blocking channel the protocol core uses to
//! tell a surrounding UI (or a test) what happened, without the core ever
//! depending on a UI framework.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

/// Events the core pushes out to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A free-form diagnostic line, forwarded from core logging for UIs that
    /// want to surface it directly rather than reading process logs.
    Log(String),
    /// The known user roster changed.
    UsersUpdated,
    /// `username` came online.
    Online(String),
    /// `username` went offline.
    Offline(String),
    /// A new message arrived, `from` is `None` for a public broadcast.
    NewMsg(Option<String>),
    /// The connection to the peer was lost (heartbeat timeout or transport
    /// failure).
    ConnectionLost,
    /// An operation was attempted that requires authentication first.
    NotLogin,
}

/// Non-blocking delivery channel for [`Event`]s. Implementations must never
/// block the caller; a full channel drops the event and counts it rather
/// than applying backpressure to protocol logic.
pub trait NotificationSink: Send + Sync {
    /// Deliver `event`. Must not block.
    fn notify(&self, event: Event);

    /// Number of events dropped so far because the sink was full or closed.
    fn dropped(&self) -> u64 {
        0
    }
}

/// A sink backed by a bounded `tokio::sync::mpsc` channel. Overflow drops
/// the event and increments a counter instead of blocking the sender.
#[derive(Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

impl ChannelSink {
    /// Create a sink and its paired receiver with the given channel
    /// capacity.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, event: Event) {
        if self.sender.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// An in-memory sink that records every delivered event, for test
/// assertions.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<std::sync::Mutex<Vec<Event>>>,
    dropped: Arc<AtomicU64>,
}

impl RecordingSink {
    /// Create an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event delivered so far, in delivery order.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("recording sink poisoned").clone()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, event: Event) {
        self.events
            .lock()
            .expect("recording sink poisoned")
            .push(event);
    }

    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
