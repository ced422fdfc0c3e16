//! # Umbral Chat Transport
//!
//! The `Transport` abstraction the datagram endpoint is built on: one
//! socket, async `send_to`/`recv_from`, and byte/packet counters. Two
//! implementations are provided:
//!
//! - [`udp_async::AsyncUdpTransport`] — a real Tokio UDP socket, used by the
//!   `chat-server`/`chat-client` binaries.
//! - [`mock::MockTransport`] — an in-memory, channel-backed pair, used by
//!   tests so the endpoint's receive/timer loops can be exercised
//!   deterministically without binding real sockets.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod mock;
pub mod transport;
pub mod udp_async;

pub use mock::MockTransport;
pub use transport::{Transport, TransportError, TransportResult, TransportStats};
pub use udp_async::AsyncUdpTransport;
