//! Correlates outstanding requests to their responses over a connectionless
//! transport: allocates correlation ids, parks the caller, and wakes it on
//! a matching response, a timeout, or endpoint shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::frame::Frame;

/// Errors surfaced while waiting on a [`RequestHandle`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    /// No response arrived within the caller-supplied timeout.
    #[error("request timed out")]
    RequestTimeout,
    /// The endpoint was shut down while this request was outstanding.
    #[error("endpoint closed")]
    EndpointClosed,
}

/// A table of correlation id → pending response channel, shared by the
/// endpoint's receive loop (which completes slots) and callers (which
/// allocate and await them).
#[derive(Clone)]
pub struct RequestTable {
    pending: Arc<DashMap<u32, oneshot::Sender<Frame>>>,
    next_id: Arc<AtomicU32>,
}

impl RequestTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Allocate a fresh correlation id and a handle the caller can `wait`
    /// on. Ids wrap at `u32::MAX` and skip both zero (reserved to mean "no
    /// correlation", used by events) and any id currently in flight.
    #[must_use]
    pub fn allocate(&self) -> RequestHandle {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id == 0 {
                continue;
            }
            if self.pending.contains_key(&id) {
                continue;
            }
            let (sender, receiver) = oneshot::channel();
            self.pending.insert(id, sender);
            return RequestHandle {
                id,
                receiver: Some(receiver),
                table: self.pending.clone(),
            };
        }
    }

    /// Complete the slot for `frame.corr_id`, if one is outstanding.
    /// Returns `true` if a waiting caller was matched, `false` if the id
    /// had no pending slot (a late or spurious response, dropped
    /// harmlessly).
    pub fn complete(&self, frame: Frame) -> bool {
        if let Some((_, sender)) = self.pending.remove(&frame.corr_id) {
            let _ = sender.send(frame);
            true
        } else {
            false
        }
    }

    /// Number of requests currently outstanding.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Shut down the table: every outstanding slot's sender is dropped,
    /// which wakes its waiter with [`RequestError::EndpointClosed`].
    pub fn close(&self) {
        let outstanding = self.pending.len();
        self.pending.clear();
        if outstanding > 0 {
            tracing::debug!(outstanding, "request table closed with requests in flight");
        }
    }
}

impl Default for RequestTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A single outstanding request. Dropping the handle before it resolves
/// (task cancellation) releases its slot and id immediately.
pub struct RequestHandle {
    id: u32,
    receiver: Option<oneshot::Receiver<Frame>>,
    table: Arc<DashMap<u32, oneshot::Sender<Frame>>>,
}

impl RequestHandle {
    /// The correlation id assigned to this request.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Await the matching response, or [`RequestError::RequestTimeout`] if
    /// none arrives within `timeout`, or [`RequestError::EndpointClosed`]
    /// if the table was shut down first.
    ///
    /// # Errors
    ///
    /// See variant docs on [`RequestError`].
    pub async fn wait(mut self, timeout: Duration) -> Result<Frame, RequestError> {
        let receiver = self.receiver.take().expect("wait called once");
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(_)) => Err(RequestError::EndpointClosed),
            Err(_) => Err(RequestError::RequestTimeout),
        }
    }
}

impl Drop for RequestHandle {
    fn drop(&mut self) {
        // Harmless if `complete` or `close` already removed this id.
        self.table.remove(&self.id);
    }
}
