//! In-memory `Transport` for deterministic tests.
//!
//! Two [`MockTransport`]s created with [`MockTransport::pair`] are wired
//! directly to each other's inbound queue, so tests can drive the real
//! endpoint receive/timer loops without binding a socket or depending on
//! OS scheduling.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::transport::{Transport, TransportError, TransportResult, TransportStats};

/// A datagram queued for delivery to a [`MockTransport`].
struct Packet {
    from: SocketAddr,
    data: Vec<u8>,
}

/// An in-memory transport endpoint, paired with exactly one peer.
pub struct MockTransport {
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Packet>,
    inbound: Mutex<mpsc::UnboundedReceiver<Packet>>,
    // Deliveries that arrived before the endpoint stitched itself together,
    // or an un-popped packet peeked by a previous recv_from call.
    backlog: Mutex<VecDeque<Packet>>,
    closed: Arc<AtomicBool>,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    send_errors: AtomicU64,
    recv_errors: AtomicU64,
}

impl MockTransport {
    /// Create two transports wired to each other: anything `a` sends is
    /// delivered to `b`'s `recv_from`, and vice versa.
    #[must_use]
    pub fn pair(addr_a: SocketAddr, addr_b: SocketAddr) -> (Arc<Self>, Arc<Self>) {
        let (tx_to_b, rx_for_b) = mpsc::unbounded_channel();
        let (tx_to_a, rx_for_a) = mpsc::unbounded_channel();

        let a = Arc::new(Self {
            local_addr: addr_a,
            peer_addr: addr_b,
            outbound: tx_to_b,
            inbound: Mutex::new(rx_for_a),
            backlog: Mutex::new(VecDeque::new()),
            closed: Arc::new(AtomicBool::new(false)),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            recv_errors: AtomicU64::new(0),
        });
        let b = Arc::new(Self {
            local_addr: addr_b,
            peer_addr: addr_a,
            outbound: tx_to_a,
            inbound: Mutex::new(rx_for_b),
            backlog: Mutex::new(VecDeque::new()),
            closed: Arc::new(AtomicBool::new(false)),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            recv_errors: AtomicU64::new(0),
        });
        (a, b)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> TransportResult<usize> {
        if self.closed.load(Ordering::Acquire) {
            self.send_errors.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::Closed);
        }
        if addr != self.peer_addr {
            self.send_errors.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::Other(format!(
                "mock transport has no route to {addr}"
            )));
        }
        let packet = Packet {
            from: self.local_addr,
            data: buf.to_vec(),
        };
        self.outbound.send(packet).map_err(|_| {
            self.send_errors.fetch_add(1, Ordering::Relaxed);
            TransportError::Closed
        })?;
        self.bytes_sent.fetch_add(buf.len() as u64, Ordering::Relaxed);
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> TransportResult<(usize, SocketAddr)> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let packet = {
            let mut backlog = self.backlog.lock().await;
            if let Some(packet) = backlog.pop_front() {
                packet
            } else {
                drop(backlog);
                let mut inbound = self.inbound.lock().await;
                match inbound.recv().await {
                    Some(packet) => packet,
                    None => return Err(TransportError::Closed),
                }
            }
        };
        if packet.data.len() > buf.len() {
            self.recv_errors.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::Other(
                "mock datagram larger than caller buffer".into(),
            ));
        }
        buf[..packet.data.len()].copy_from_slice(&packet.data);
        self.bytes_received
            .fetch_add(packet.data.len() as u64, Ordering::Relaxed);
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        Ok((packet.data.len(), packet.from))
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.local_addr)
    }

    async fn close(&self) -> TransportResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn stats(&self) -> TransportStats {
        TransportStats {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
        }
    }
}
