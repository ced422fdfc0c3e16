//! # Umbral Chat Core
//!
//! The datagram protocol core shared by the Umbral chat client and server:
//! wire framing, request/response correlation over an unordered lossy
//! transport, the chat history data model, an injectable notification sink,
//! and timekeeping.
//!
//! This crate is deliberately UI-free and transport-free: it is exercised
//! directly by `chat-server` and `chat-client`, which wire it to
//! `chat-transport`'s `Transport` trait and to whichever notification sink
//! the embedding shell supplies.
//!
//! ## Module layout
//!
//! - [`frame`]: wire codec — the outer datagram envelope (cleartext
//!   handshake vs. sealed post-handshake frame) and the inner
//!   `dir/corr_id/op/body` header.
//! - [`proto`]: opcode-specific request/response/event payloads built on
//!   `frame`'s primitives.
//! - [`request_table`]: correlates outstanding requests to responses, with
//!   timeout and cancellation.
//! - [`chat_entry`]: chat history entries and the bounded FIFO log that
//!   holds them.
//! - [`notify`]: the non-blocking [`notify::NotificationSink`] events flow
//!   out through.
//! - [`time`]: injectable monotonic/wall clock.
//! - [`error`]: error types spanning the wire codec and crypto layer.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chat_entry;
pub mod error;
pub mod frame;
pub mod notify;
pub mod proto;
pub mod request_table;
pub mod time;

pub use error::Error;
pub use frame::{ClearFrame, Datagram, Direction, Frame, MAX_DATAGRAM_SIZE, OpCode};
pub use notify::{ChannelSink, Event, NotificationSink, RecordingSink};
pub use request_table::{RequestError, RequestHandle, RequestTable};
pub use time::{Clock, FakeClock, SystemClock, WallClock};

/// Protocol version, bumped on any incompatible wire-format change.
pub const PROTOCOL_VERSION: u8 = 1;

/// Default per-request timeout (seconds), absent a caller override.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Default heartbeat interval (seconds) between client-emitted heartbeats
/// and the server's reap threshold.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 60;

/// Default number of entries retained per chat log (public or per-peer)
/// before the oldest entry is FIFO-evicted.
pub const DEFAULT_CHAT_HISTORY_CAPACITY: usize = 256;
