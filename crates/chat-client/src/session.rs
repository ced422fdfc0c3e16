//! The client-side datagram endpoint: a single session targeted at one
//! server address, driving the handshake, request/response correlation, and
//! heartbeat/liveness in a background receive/timer loop, the mirror image
//! of `chat_server::endpoint::ServerEndpoint`.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chat_core::chat_entry::ChatEntry;
use chat_core::frame::{ClearFrame, Datagram, Frame, MAX_DATAGRAM_SIZE};
use chat_core::notify::{Event, NotificationSink};
use chat_core::proto::{EventBody, RequestBody, ResponseBody, StatusInfoWire};
use chat_core::request_table::RequestTable;
use chat_core::time::Clock;
use chat_core::Direction as FrameDirection;
use chat_crypto::envelope::{Direction as EnvelopeDirection, Envelope};
use chat_crypto::x25519::{PrivateKey, PublicKey};
use chat_transport::transport::{Transport, TransportError, TransportStats};
use rand_core::OsRng;
use tokio::sync::oneshot;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::mirror::{Mirror, RosterEntry};

/// Lifecycle state of a [`ClientSession`], per the client state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No handshake attempted yet, or the session has been torn down.
    Disconnected,
    /// `Hello` sent, awaiting `HelloAck`.
    Handshaking,
    /// Handshake complete, no successful login yet.
    ConnectedUnauth,
    /// Bound to a username.
    ConnectedAuth,
}

/// Locally-known facts about the authenticated user, for [`ClientSession::personal_info`].
#[derive(Debug, Clone)]
pub struct PersonalInfo {
    /// The authenticated username, if logged in.
    pub username: Option<String>,
    /// Current state-machine state.
    pub state: ClientState,
}

/// Locally-known facts about the server endpoint, for [`ClientSession::server_info`].
#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// The address this session is connected to.
    pub server_addr: SocketAddr,
    /// Transport-level send/receive counters.
    pub stats: TransportStats,
}

/// A client session: one handshake, one peer, one background receive/timer
/// loop. Operations are plain async methods; the loop that feeds them and
/// the mirror runs for the lifetime of the session.
pub struct ClientSession<T: Transport> {
    transport: Arc<T>,
    server_addr: SocketAddr,
    envelope: Mutex<Envelope>,
    request_table: RequestTable,
    state: Mutex<ClientState>,
    username: Mutex<Option<String>>,
    mirror: Mutex<Mirror>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    config: ClientConfig,
    last_inbound: Mutex<Instant>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl<T: Transport + 'static> ClientSession<T> {
    /// Perform the cleartext handshake against `server_addr` over `transport`
    /// and spawn the background receive/heartbeat loop.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::HandshakeTimeout`] if no `HelloAck` arrives
    /// within `config.handshake_timeout`, [`ClientError::WeakServerKey`] if
    /// the server's public key is a low-order point, or
    /// [`ClientError::Transport`] on a send/receive failure.
    pub async fn connect(
        transport: Arc<T>,
        server_addr: SocketAddr,
        config: ClientConfig,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, ClientError> {
        let ephemeral = PrivateKey::generate(&mut OsRng);
        let hello = Datagram::Clear(ClearFrame::Hello {
            client_pub_key: ephemeral.public_key().to_bytes(),
        })
        .encode()
        .expect("cleartext hello always encodes");
        transport.send_to(&hello, server_addr).await?;

        let mut buf = vec![0u8; 2048];
        let (len, from) = tokio::time::timeout(config.handshake_timeout, transport.recv_from(&mut buf))
            .await
            .map_err(|_| ClientError::HandshakeTimeout)??;

        if from != server_addr {
            return Err(ClientError::HandshakeTimeout);
        }
        let Ok(Datagram::Clear(ClearFrame::HelloAck { server_pub_key })) = Datagram::decode(&buf[..len]) else {
            return Err(ClientError::UnexpectedResponse);
        };

        let server_public = PublicKey::from_bytes(server_pub_key);
        let shared = ephemeral.exchange(&server_public).ok_or(ClientError::WeakServerKey)?;
        let envelope = Envelope::from_shared_secret(shared.as_bytes(), EnvelopeDirection::ClientToServer);

        let session = Arc::new(Self {
            transport,
            server_addr,
            envelope: Mutex::new(envelope),
            request_table: RequestTable::new(),
            state: Mutex::new(ClientState::ConnectedUnauth),
            username: Mutex::new(None),
            mirror: Mutex::new(Mirror::new()),
            sink,
            clock: clock.clone(),
            config,
            last_inbound: Mutex::new(clock.now_monotonic()),
            shutdown: Mutex::new(None),
        });

        session.spawn_background();
        Ok(session)
    }

    fn spawn_background(self: &Arc<Self>) {
        let (tx, rx) = oneshot::channel();
        *self.shutdown.lock().expect("shutdown lock poisoned") = Some(tx);
        let session = Arc::clone(self);
        tokio::spawn(async move {
            session.run_loop(rx).await;
        });
    }

    async fn run_loop(self: Arc<Self>, mut shutdown: oneshot::Receiver<()>) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut ticker = tokio::time::interval(self.config.heartbeat_emit_interval());

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::debug!(addr = %self.server_addr, "client session shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    self.on_tick().await;
                }
                received = self.transport.recv_from(&mut buf) => {
                    match received {
                        Ok((len, from)) if from == self.server_addr => {
                            self.handle_datagram(&buf[..len]).await;
                        }
                        Ok(_) => {}
                        Err(TransportError::Closed) => return,
                        Err(_) => {}
                    }
                }
            }
        }
    }

    async fn on_tick(&self) {
        if *self.state.lock().expect("state lock poisoned") == ClientState::Disconnected {
            return;
        }

        let elapsed = self
            .clock
            .now_monotonic()
            .duration_since(*self.last_inbound.lock().expect("last-inbound lock poisoned"));
        if elapsed > self.config.heartbeat_interval {
            self.mark_disconnected();
            return;
        }

        let handle = self.request_table.allocate();
        let frame = RequestBody::Heartbeat.into_frame(FrameDirection::Request, handle.id());
        // Fire-and-forget: the response (if any) is dropped harmlessly by
        // the request table once `handle` goes out of scope.
        let _ = self.send_sealed(frame).await;
    }

    fn mark_disconnected(&self) {
        let mut state = self.state.lock().expect("state lock poisoned");
        if *state != ClientState::Disconnected {
            *state = ClientState::Disconnected;
            self.sink.notify(Event::ConnectionLost);
        }
    }

    async fn handle_datagram(&self, buf: &[u8]) {
        let Ok(Datagram::Sealed(wire)) = Datagram::decode(buf) else {
            return;
        };
        let plaintext = {
            let mut envelope = self.envelope.lock().expect("envelope lock poisoned");
            match envelope.open(&wire) {
                Ok(p) => p,
                Err(_) => return,
            }
        };
        *self.last_inbound.lock().expect("last-inbound lock poisoned") = self.clock.now_monotonic();

        let Ok(frame) = Frame::decode(&plaintext) else {
            return;
        };

        match frame.direction {
            FrameDirection::Response => {
                self.request_table.complete(frame);
            }
            FrameDirection::Event => {
                if let Ok(event) = EventBody::decode(frame.op, &frame.body) {
                    self.handle_event(event);
                }
            }
            FrameDirection::Request => {
                // A server never sends a client a request.
            }
        }
    }

    fn handle_event(&self, event: EventBody) {
        let mut mirror = self.mirror.lock().expect("mirror lock poisoned");
        match event {
            EventBody::Online { username } => {
                mirror.mark_online(&username);
                drop(mirror);
                self.sink.notify(Event::Online(username));
            }
            EventBody::Offline { username } => {
                mirror.mark_offline(&username);
                drop(mirror);
                self.sink.notify(Event::Offline(username));
            }
            EventBody::NewMsg { from, entry } => {
                mirror.append_if_tracked(from.as_deref(), entry);
                drop(mirror);
                self.sink.notify(Event::NewMsg(from));
            }
            EventBody::UsersUpdated => {
                drop(mirror);
                self.sink.notify(Event::UsersUpdated);
            }
        }
    }

    async fn send_sealed(&self, frame: Frame) -> Result<(), ClientError> {
        let plaintext = frame.encode().map_err(|_| ClientError::UnexpectedResponse)?;
        let sealed = {
            let mut envelope = self.envelope.lock().expect("envelope lock poisoned");
            envelope.seal(&plaintext)
        };
        let wire = match sealed {
            Ok(wire) => wire,
            Err(chat_crypto::CryptoError::NonceOverflow) => {
                tracing::warn!(addr = %self.server_addr, "send nonce exhausted, session requires rehandshake");
                self.mark_disconnected();
                return Err(ClientError::NonceExhausted);
            }
            Err(_) => return Err(ClientError::UnexpectedResponse),
        };
        self.transport.send_to(&wire, self.server_addr).await?;
        Ok(())
    }

    async fn request(&self, body: RequestBody) -> Result<ResponseBody, ClientError> {
        let handle = self.request_table.allocate();
        let frame = body.into_frame(FrameDirection::Request, handle.id());
        self.send_sealed(frame).await?;
        let response = handle.wait(self.config.request_timeout).await?;
        ResponseBody::decode(&response.body).map_err(|_| ClientError::UnexpectedResponse)
    }

    fn require_not_authenticated(&self) -> Result<(), ClientError> {
        if *self.state.lock().expect("state lock poisoned") == ClientState::ConnectedAuth {
            return Err(ClientError::AlreadyAuthenticated);
        }
        Ok(())
    }

    fn require_authenticated(&self) -> Result<(), ClientError> {
        if *self.state.lock().expect("state lock poisoned") != ClientState::ConnectedAuth {
            self.sink.notify(Event::NotLogin);
            return Err(ClientError::NotAuthenticated);
        }
        Ok(())
    }

    fn into_result(response: ResponseBody) -> Result<ResponseBody, ClientError> {
        match response {
            ResponseBody::Error { kind, message } => Err(ClientError::from_server(kind, message)),
            other => Ok(other),
        }
    }

    /// Register a new account. Does not log in.
    ///
    /// # Errors
    ///
    /// [`ClientError::UserExists`], or a transport/timeout failure.
    pub async fn register(&self, username: impl Into<String>, password: impl Into<String>) -> Result<(), ClientError> {
        let body = RequestBody::Register {
            username: username.into(),
            password: password.into(),
        };
        Self::into_result(self.request(body).await?)?;
        Ok(())
    }

    /// Authenticate as `username`. On success the server evicts any prior
    /// session under that name.
    ///
    /// # Errors
    ///
    /// [`ClientError::AlreadyAuthenticated`] if already logged in,
    /// [`ClientError::CredentialInvalid`] on a bad password, or a
    /// transport/timeout failure.
    pub async fn login(&self, username: impl Into<String>, password: impl Into<String>) -> Result<(), ClientError> {
        self.require_not_authenticated()?;
        let username = username.into();
        let body = RequestBody::Login {
            username: username.clone(),
            password: password.into(),
        };
        Self::into_result(self.request(body).await?)?;
        *self.username.lock().expect("username lock poisoned") = Some(username);
        *self.state.lock().expect("state lock poisoned") = ClientState::ConnectedAuth;
        Ok(())
    }

    /// Log out, releasing the server's username binding.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotAuthenticated`], or a transport/timeout failure.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.require_authenticated()?;
        Self::into_result(self.request(RequestBody::Logout).await?)?;
        *self.username.lock().expect("username lock poisoned") = None;
        *self.state.lock().expect("state lock poisoned") = ClientState::ConnectedUnauth;
        Ok(())
    }

    /// Change the authenticated user's password.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotAuthenticated`], [`ClientError::CredentialInvalid`]
    /// if `old` does not match, or a transport/timeout failure.
    pub async fn change_password(
        &self,
        old: impl Into<String>,
        new: impl Into<String>,
    ) -> Result<(), ClientError> {
        self.require_authenticated()?;
        let body = RequestBody::ChangePassword {
            old: old.into(),
            new: new.into(),
        };
        Self::into_result(self.request(body).await?)?;
        Ok(())
    }

    /// Send a chat message; `recipient = None` broadcasts to the public log.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotAuthenticated`], [`ClientError::EmptyMessage`],
    /// [`ClientError::RecipientUnknown`], [`ClientError::RecipientOffline`],
    /// or a transport/timeout failure.
    pub async fn say(&self, recipient: Option<String>, text: impl Into<String>) -> Result<(), ClientError> {
        self.require_authenticated()?;
        let text = text.into();
        if text.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let body = RequestBody::Say { recipient, text };
        Self::into_result(self.request(body).await?)?;
        Ok(())
    }

    /// Fetch a chatroom status summary (online count, public log length).
    ///
    /// # Errors
    ///
    /// A transport/timeout failure.
    pub async fn fetch_chatroom_status(&self) -> Result<StatusInfoWire, ClientError> {
        match Self::into_result(self.request(RequestBody::FetchStatus).await?)? {
            ResponseBody::Status(status) => Ok(status),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Fetch the chat log for `peer` (`None` for public), updating the
    /// local mirror, and return the fetched entries.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotAuthenticated`], or a transport/timeout failure.
    pub async fn get_chats(&self, peer: Option<String>) -> Result<Vec<ChatEntry>, ClientError> {
        self.require_authenticated()?;
        let body = RequestBody::GetChats { peer: peer.clone() };
        match Self::into_result(self.request(body).await?)? {
            ResponseBody::Chats(entries) => {
                self.mirror
                    .lock()
                    .expect("mirror lock poisoned")
                    .set_chats(peer.as_deref(), entries.clone());
                Ok(entries)
            }
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Fetch the full user roster, updating the local mirror, and return it.
    ///
    /// # Errors
    ///
    /// A transport/timeout failure.
    pub async fn get_user_info(&self) -> Result<Vec<RosterEntry>, ClientError> {
        match Self::into_result(self.request(RequestBody::GetUsers).await?)? {
            ResponseBody::Users(users) => {
                let mut mirror = self.mirror.lock().expect("mirror lock poisoned");
                mirror.set_roster(users);
                Ok(mirror.roster())
            }
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Locally-known facts about the authenticated user; no round trip.
    #[must_use]
    pub fn personal_info(&self) -> PersonalInfo {
        PersonalInfo {
            username: self.username.lock().expect("username lock poisoned").clone(),
            state: *self.state.lock().expect("state lock poisoned"),
        }
    }

    /// Locally-known facts about the server endpoint; no round trip.
    #[must_use]
    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            server_addr: self.server_addr,
            stats: self.transport.stats(),
        }
    }

    /// Current state-machine state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        *self.state.lock().expect("state lock poisoned")
    }

    /// The most recently fetched roster, without issuing a request.
    #[must_use]
    pub fn cached_roster(&self) -> Vec<RosterEntry> {
        self.mirror.lock().expect("mirror lock poisoned").roster()
    }

    /// The most recently fetched chat log for `peer`, without issuing a
    /// request.
    #[must_use]
    pub fn cached_chats(&self, peer: Option<&str>) -> Vec<ChatEntry> {
        self.mirror.lock().expect("mirror lock poisoned").chats(peer)
    }

    /// Tear down the session: logs out if authenticated, stops the
    /// background loop, and completes any outstanding requests with
    /// [`chat_core::request_table::RequestError::EndpointClosed`].
    pub async fn disconnect(&self) {
        if *self.state.lock().expect("state lock poisoned") == ClientState::ConnectedAuth {
            let _ = self.logout().await;
        }
        if let Some(tx) = self.shutdown.lock().expect("shutdown lock poisoned").take() {
            let _ = tx.send(());
        }
        self.request_table.close();
        *self.state.lock().expect("state lock poisoned") = ClientState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::notify::RecordingSink;
    use chat_core::time::SystemClock;
    use chat_transport::mock::MockTransport;
    use std::net::SocketAddr;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[tokio::test]
    async fn connect_times_out_without_a_server() {
        let (client, _server) = MockTransport::pair(addr(1), addr(2));
        // `_server` is kept alive (so `send_to` succeeds) but nothing ever
        // reads from it or answers the hello, so the handshake times out.
        let config = ClientConfig {
            handshake_timeout: Duration::from_millis(50),
            ..ClientConfig::default()
        };
        let result = ClientSession::connect(
            client,
            addr(2),
            config,
            Arc::new(RecordingSink::new()),
            Arc::new(SystemClock),
        )
        .await;
        assert!(matches!(result, Err(ClientError::HandshakeTimeout)));
    }

    #[test]
    fn personal_info_starts_unauthenticated() {
        // Constructing a PersonalInfo directly (without a live transport)
        // exercises the struct shape used by the CLI's `whoami`-style
        // command.
        let info = PersonalInfo {
            username: None,
            state: ClientState::ConnectedUnauth,
        };
        assert!(info.username.is_none());
        assert_eq!(info.state, ClientState::ConnectedUnauth);
    }
}
