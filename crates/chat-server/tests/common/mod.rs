//! Shared test harness: a raw protocol-level client that performs the
//! handshake by hand and drives requests against a live [`ServerEndpoint`]
//! over real loopback UDP, the way `chat-client` will but without depending
//! on it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chat_core::frame::{ClearFrame, Datagram, Frame};
use chat_core::proto::{EventBody, RequestBody, ResponseBody};
use chat_core::time::SystemClock;
use chat_core::{Direction as FrameDirection, NotificationSink, RecordingSink};
use chat_crypto::envelope::{Direction as EnvelopeDirection, Envelope};
use chat_crypto::x25519::{PrivateKey, PublicKey};
use chat_server::{ServerConfig, ServerEndpoint, UserStore};
use chat_transport::transport::Transport;
use chat_transport::udp_async::AsyncUdpTransport;
use rand_core::OsRng;
use tokio::time::timeout;

/// Bring up a server endpoint on an ephemeral loopback port, backed by a
/// fresh user store in a temp directory. Returns the bound address, the
/// sink that observes every server-side notification, and a shutdown
/// handle.
pub async fn spawn_server() -> (SocketAddr, Arc<RecordingSink>, tokio::sync::oneshot::Sender<()>) {
    let dir = tempfile::tempdir().unwrap();
    let store = UserStore::open(
        dir.path().join("users.bin"),
        chat_crypto::password::PasswordParams::low_cost_for_tests(),
    )
    .unwrap();

    let transport = Arc::new(
        AsyncUdpTransport::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap())
            .await
            .unwrap(),
    );
    let addr = transport.local_addr().unwrap();

    let sink = Arc::new(RecordingSink::new());
    let config = ServerConfig {
        bind_addr: addr,
        heartbeat_interval: Duration::from_millis(150),
        ..ServerConfig::default()
    };

    let endpoint = Arc::new(ServerEndpoint::new(
        transport,
        store,
        sink.clone() as Arc<dyn NotificationSink>,
        Arc::new(SystemClock),
        config,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let _ = endpoint.run(shutdown_rx).await;
    });

    // Give the spawned task a moment to start its recv loop.
    tokio::time::sleep(Duration::from_millis(20)).await;

    (addr, sink, shutdown_tx)
}

/// A hand-rolled protocol client for exercising a live server over real
/// loopback UDP.
pub struct TestClient {
    transport: AsyncUdpTransport,
    server_addr: SocketAddr,
    envelope: Envelope,
    corr_id: u32,
    pending_events: Vec<EventBody>,
}

impl TestClient {
    pub async fn connect(server_addr: SocketAddr) -> Self {
        let transport = AsyncUdpTransport::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap())
            .await
            .unwrap();

        let private = PrivateKey::generate(&mut OsRng);
        let public = private.public_key();

        let hello = Datagram::Clear(ClearFrame::Hello {
            client_pub_key: public.to_bytes(),
        })
        .encode()
        .unwrap();
        transport.send_to(&hello, server_addr).await.unwrap();

        let mut buf = vec![0u8; 2048];
        let (len, _) = timeout(Duration::from_secs(2), transport.recv_from(&mut buf))
            .await
            .expect("handshake ack timeout")
            .unwrap();
        let Datagram::Clear(ClearFrame::HelloAck { server_pub_key }) =
            Datagram::decode(&buf[..len]).unwrap()
        else {
            panic!("expected HelloAck");
        };

        let server_public = PublicKey::from_bytes(server_pub_key);
        let shared = private.exchange(&server_public).expect("valid server key");
        let envelope = Envelope::from_shared_secret(shared.as_bytes(), EnvelopeDirection::ClientToServer);

        Self {
            transport,
            server_addr,
            envelope,
            corr_id: 0,
            pending_events: Vec::new(),
        }
    }

    /// Send a request and wait for its correlated response, stashing any
    /// events that arrive interleaved (server broadcasts can race a direct
    /// reply).
    pub async fn request(&mut self, body: RequestBody) -> ResponseBody {
        self.corr_id += 1;
        let corr_id = self.corr_id;
        let frame = body.into_frame(FrameDirection::Request, corr_id);
        let wire = self.envelope.seal(&frame.encode().unwrap()).unwrap();
        self.transport.send_to(&wire, self.server_addr).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let mut buf = vec![0u8; 65536];
            let (len, _) = timeout(remaining, self.transport.recv_from(&mut buf))
                .await
                .expect("response timeout")
                .unwrap();
            let plaintext = self.envelope.open(&buf[..len]).expect("open response");
            let decoded = Frame::decode(&plaintext).expect("decode response frame");
            match decoded.direction {
                FrameDirection::Response if decoded.corr_id == corr_id => {
                    return ResponseBody::decode(&decoded.body).unwrap();
                }
                FrameDirection::Event => {
                    if let Ok(event) = EventBody::decode(decoded.op, &decoded.body) {
                        self.pending_events.push(event);
                    }
                }
                _ => {}
            }
        }
    }

    /// Send already-sealed bytes directly, bypassing envelope bookkeeping
    /// (for replay tests).
    pub async fn send_raw(&mut self, wire: &[u8]) {
        self.transport.send_to(wire, self.server_addr).await.unwrap();
    }

    pub fn seal(&mut self, body: RequestBody) -> Vec<u8> {
        self.corr_id += 1;
        let frame = body.into_frame(FrameDirection::Request, self.corr_id);
        self.envelope.seal(&frame.encode().unwrap()).unwrap()
    }

    /// Like [`Self::request`], but also returns the exact sealed wire bytes
    /// that were sent, so a caller can resend them verbatim for replay
    /// testing.
    pub async fn request_with_wire(&mut self, body: RequestBody) -> (Vec<u8>, ResponseBody) {
        self.corr_id += 1;
        let corr_id = self.corr_id;
        let frame = body.into_frame(FrameDirection::Request, corr_id);
        let wire = self.envelope.seal(&frame.encode().unwrap()).unwrap();
        self.transport.send_to(&wire, self.server_addr).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let mut buf = vec![0u8; 65536];
            let (len, _) = timeout(remaining, self.transport.recv_from(&mut buf))
                .await
                .expect("response timeout")
                .unwrap();
            let plaintext = self.envelope.open(&buf[..len]).expect("open response");
            let decoded = Frame::decode(&plaintext).expect("decode response frame");
            match decoded.direction {
                FrameDirection::Response if decoded.corr_id == corr_id => {
                    return (wire, ResponseBody::decode(&decoded.body).unwrap());
                }
                FrameDirection::Event => {
                    if let Ok(event) = EventBody::decode(decoded.op, &decoded.body) {
                        self.pending_events.push(event);
                    }
                }
                _ => {}
            }
        }
    }

    /// Drain any events already stashed by `request`, then wait up to
    /// `timeout_ms` for one more to arrive.
    pub async fn next_event(&mut self, timeout_ms: u64) -> Option<EventBody> {
        if !self.pending_events.is_empty() {
            return Some(self.pending_events.remove(0));
        }
        let mut buf = vec![0u8; 65536];
        match timeout(Duration::from_millis(timeout_ms), self.transport.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => {
                let plaintext = self.envelope.open(&buf[..len]).ok()?;
                let frame = Frame::decode(&plaintext).ok()?;
                EventBody::decode(frame.op, &frame.body).ok()
            }
            _ => None,
        }
    }

    /// Whether any further datagram arrives within `timeout_ms` (used to
    /// assert a replayed/duplicate frame produced no second reply).
    pub async fn expect_silence(&mut self, timeout_ms: u64) -> bool {
        let mut buf = vec![0u8; 65536];
        timeout(Duration::from_millis(timeout_ms), self.transport.recv_from(&mut buf))
            .await
            .is_err()
    }
}
