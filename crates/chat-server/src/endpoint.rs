//! The server datagram endpoint: a single receive/timer loop wiring
//! [`Transport`], [`SessionRegistry`], [`UserStore`], and [`ChatroomState`]
//! into the handshake and request dispatch described by the protocol.
//!
//! Every datagram is handled sequentially by one task, which is what lets
//! the registry and chatroom state get away with a plain `Mutex` instead of
//! per-shard locking: there is never more than one mutator in flight.

use std::net::SocketAddr;
use std::sync::Arc;

use chat_core::frame::{ClearFrame, Datagram, Frame};
use chat_core::notify::{Event, NotificationSink};
use chat_core::proto::{RequestBody, ResponseBody, StatusInfoWire, UserInfoWire};
use chat_core::time::Clock;
use chat_core::Direction as FrameDirection;
use chat_crypto::envelope::{Direction as EnvelopeDirection, Envelope};
use chat_crypto::x25519::{PrivateKey, PublicKey};
use chat_transport::transport::{Transport, TransportError};
use rand_core::OsRng;

use crate::chatroom::ChatroomState;
use crate::config::ServerConfig;
use crate::registry::{Session, SessionRegistry};
use crate::store::UserStore;

/// Wires the session registry, user store, and chatroom state to a
/// [`Transport`] and runs the server's receive/timer loop.
pub struct ServerEndpoint<T: Transport> {
    transport: Arc<T>,
    registry: SessionRegistry,
    store: UserStore,
    chatroom: ChatroomState,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    config: ServerConfig,
}

impl<T: Transport> ServerEndpoint<T> {
    /// Build an endpoint over an already-bound transport.
    #[must_use]
    pub fn new(
        transport: Arc<T>,
        store: UserStore,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        config: ServerConfig,
    ) -> Self {
        let registry = SessionRegistry::new(config.heartbeat_interval);
        let chatroom = ChatroomState::new(config.chat_history_capacity);
        Self {
            transport,
            registry,
            store,
            chatroom,
            sink,
            clock,
            config,
        }
    }

    /// Run the receive/timer loop until `shutdown` resolves or the
    /// transport closes.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if `recv_from` fails for a reason other
    /// than the transport being closed (which ends the loop cleanly).
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::oneshot::Receiver<()>) -> Result<(), TransportError> {
        let mut buf = vec![0u8; chat_core::frame::MAX_DATAGRAM_SIZE];
        let mut reap_ticker = tokio::time::interval(self.config.reap_interval());

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::info!("server endpoint shutting down");
                    return Ok(());
                }
                _ = reap_ticker.tick() => {
                    self.reap_tick().await;
                }
                received = self.transport.recv_from(&mut buf) => {
                    match received {
                        Ok((len, from)) => self.handle_datagram(&buf[..len], from).await,
                        Err(TransportError::Closed) => return Ok(()),
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    async fn handle_datagram(&self, buf: &[u8], from: SocketAddr) {
        let datagram = match Datagram::decode(buf) {
            Ok(d) => d,
            Err(_) => return,
        };

        match datagram {
            Datagram::Clear(ClearFrame::Hello { client_pub_key }) => {
                self.handle_hello(from, client_pub_key).await;
            }
            Datagram::Clear(ClearFrame::HelloAck { .. }) => {
                // A server never receives its own acknowledgement back.
            }
            Datagram::Sealed(wire) => self.handle_sealed(from, &wire).await,
        }
    }

    async fn handle_hello(&self, from: SocketAddr, client_pub_key: [u8; 32]) {
        let client_public = PublicKey::from_bytes(client_pub_key);
        let ephemeral = PrivateKey::generate(&mut OsRng);
        let server_public = ephemeral.public_key();

        let Some(shared) = ephemeral.exchange(&client_public) else {
            tracing::debug!(%from, "rejected handshake: low-order client public key");
            return;
        };

        let envelope = Envelope::from_shared_secret(shared.as_bytes(), EnvelopeDirection::ServerToClient);
        let now = self.clock.now_monotonic();
        let (_session, evicted_username) =
            self.registry.upsert_unauth(from, client_pub_key, envelope, now);

        if let Some(username) = evicted_username {
            // The address had a prior (possibly authenticated) session that
            // this fresh handshake displaces, e.g. a rehandshake after nonce
            // exhaustion. Treat it like any other departure.
            self.on_user_offline(&username, None).await;
        }

        let ack = Datagram::Clear(ClearFrame::HelloAck {
            server_pub_key: server_public.to_bytes(),
        });
        if let Ok(wire) = ack.encode() {
            let _ = self.transport.send_to(&wire, from).await;
        }
    }

    async fn handle_sealed(&self, from: SocketAddr, wire: &[u8]) {
        let Some(session) = self.registry.get(&from) else {
            // No handshake on file for this address; drop silently rather
            // than reward an attacker probing for a reaction.
            return;
        };

        let now_mono = self.clock.now_monotonic();
        let plaintext = match session.open(wire) {
            Ok(p) => p,
            Err(_) => {
                if session.record_failure(now_mono) {
                    self.close_session(&session).await;
                }
                return;
            }
        };
        session.record_success(now_mono);
        self.registry.touch(&from, now_mono);

        let Ok(frame) = Frame::decode(&plaintext) else {
            return;
        };

        if frame.direction != FrameDirection::Request {
            // The server never expects a Response or Event from a client.
            return;
        }

        self.handle_request(&session, frame).await;
    }

    async fn handle_request(&self, session: &Arc<Session>, frame: Frame) {
        let corr_id = frame.corr_id;
        let op = frame.op;
        let Ok(body) = RequestBody::decode(op, &frame.body) else {
            return;
        };

        let response = self.dispatch(session, body).await;
        let resp_frame = response.into_frame(op, corr_id);
        self.send_sealed(session, resp_frame).await;
    }

    async fn dispatch(&self, session: &Arc<Session>, body: RequestBody) -> ResponseBody {
        match body {
            RequestBody::Login { username, password } => {
                self.handle_login(session, username, password).await
            }
            RequestBody::Register { username, password } => self.handle_register(username, password),
            RequestBody::Logout => self.handle_logout(session).await,
            RequestBody::ChangePassword { old, new } => self.handle_change_password(session, old, new),
            RequestBody::Say { recipient, text } => self.handle_say(session, recipient, text).await,
            RequestBody::GetChats { peer } => self.handle_get_chats(session, peer),
            RequestBody::GetUsers => self.handle_get_users(),
            RequestBody::FetchStatus => self.handle_fetch_status(),
            RequestBody::Heartbeat => ResponseBody::Ok,
        }
    }

    async fn handle_login(&self, session: &Arc<Session>, username: String, password: String) -> ResponseBody {
        if session.username().is_some() {
            return error_response(crate::error::RegistryError::AlreadyAuthenticated.kind());
        }
        if let Err(e) = self.store.verify(&username, &password) {
            return error_response(e.kind());
        }
        match self.registry.authenticate(session, username.clone()) {
            Err(e) => error_response(e.kind()),
            Ok(evicted_addr) => {
                if evicted_addr.is_some() {
                    // The evicted peer's table entry survives as
                    // unauthenticated, so it is no longer in
                    // `authenticated_sessions()` and needs no exclusion.
                    self.on_user_offline(&username, None).await;
                }
                self.on_user_online(&username, Some(session.peer_addr)).await;
                ResponseBody::Ok
            }
        }
    }

    fn handle_register(&self, username: String, password: String) -> ResponseBody {
        match self.store.register(&username, &password) {
            Ok(()) => ResponseBody::Ok,
            Err(e) => error_response(e.kind()),
        }
    }

    async fn handle_logout(&self, session: &Arc<Session>) -> ResponseBody {
        let Some(username) = session.username() else {
            return error_response(crate::error::RegistryError::NotAuthenticated.kind());
        };
        self.registry.remove(&session.peer_addr);
        self.on_user_offline(&username, None).await;
        ResponseBody::Ok
    }

    fn handle_change_password(&self, session: &Arc<Session>, old: String, new: String) -> ResponseBody {
        let Some(username) = session.username() else {
            return error_response(crate::error::RegistryError::NotAuthenticated.kind());
        };
        match self.store.change_password(&username, &old, &new) {
            Ok(()) => ResponseBody::Ok,
            Err(e) => error_response(e.kind()),
        }
    }

    async fn handle_say(&self, session: &Arc<Session>, recipient: Option<String>, text: String) -> ResponseBody {
        let Some(username) = session.username() else {
            return error_response(crate::error::RegistryError::NotAuthenticated.kind());
        };
        if text.is_empty() {
            return error_response(crate::error::ChatError::EmptyMessage.kind());
        }

        let now = self.clock.now_wall();
        match recipient {
            None => {
                let entry = self.chatroom.post_public(&username, &text, now);
                self.sink.notify(Event::NewMsg(None));
                self.broadcast_event_to_all(
                    chat_core::proto::EventBody::NewMsg { from: None, entry },
                    Some(session.peer_addr),
                )
                .await;
                ResponseBody::Ok
            }
            Some(to) => {
                if !self.store.contains(&to) {
                    return error_response(crate::error::ChatError::RecipientUnknown.kind());
                }
                if !self.registry.is_online(&to) {
                    return error_response(crate::error::ChatError::RecipientOffline.kind());
                }
                let entry = self.chatroom.post_private(&username, &to, &text, now);
                self.sink.notify(Event::NewMsg(Some(username.clone())));
                self.send_event_to_user(
                    &to,
                    chat_core::proto::EventBody::NewMsg {
                        from: Some(username.clone()),
                        entry,
                    },
                )
                .await;
                ResponseBody::Ok
            }
        }
    }

    fn handle_get_chats(&self, session: &Arc<Session>, peer: Option<String>) -> ResponseBody {
        let Some(username) = session.username() else {
            return error_response(crate::error::RegistryError::NotAuthenticated.kind());
        };
        ResponseBody::Chats(self.chatroom.get_chats(&username, peer.as_deref()))
    }

    fn handle_get_users(&self) -> ResponseBody {
        let users = self
            .store
            .all_usernames()
            .into_iter()
            .map(|name| {
                let online = self.registry.is_online(&name);
                UserInfoWire { name, online }
            })
            .collect();
        ResponseBody::Users(users)
    }

    fn handle_fetch_status(&self) -> ResponseBody {
        ResponseBody::Status(StatusInfoWire {
            online_count: self.registry.online_count() as u32,
            public_log_len: self.chatroom.public_len() as u32,
        })
    }

    /// `exclude`, when set, is the address of the session the change is
    /// *about* — it already knows its own state change from the direct
    /// response to its request, so the roster push would be redundant.
    async fn on_user_online(&self, username: &str, exclude: Option<SocketAddr>) {
        let now = self.clock.now_wall();
        self.chatroom.post_presence(username, true, now);
        self.sink.notify(Event::Online(username.to_owned()));
        self.broadcast_event_to_all(
            chat_core::proto::EventBody::Online { username: username.to_owned() },
            exclude,
        )
        .await;
        self.broadcast_event_to_all(chat_core::proto::EventBody::UsersUpdated, exclude)
            .await;
    }

    async fn on_user_offline(&self, username: &str, exclude: Option<SocketAddr>) {
        let now = self.clock.now_wall();
        self.chatroom.post_presence(username, false, now);
        self.sink.notify(Event::Offline(username.to_owned()));
        self.broadcast_event_to_all(
            chat_core::proto::EventBody::Offline { username: username.to_owned() },
            exclude,
        )
        .await;
        self.broadcast_event_to_all(chat_core::proto::EventBody::UsersUpdated, exclude)
            .await;
    }

    async fn reap_tick(&self) {
        let now = self.clock.now_monotonic();
        let removed = self.registry.reap(now);
        for session in removed {
            if let Some(username) = session.username() {
                self.on_user_offline(&username, None).await;
            }
        }
    }

    async fn close_session(&self, session: &Arc<Session>) {
        self.registry.remove(&session.peer_addr);
        if let Some(username) = session.username() {
            self.on_user_offline(&username, None).await;
        }
    }

    async fn send_sealed(&self, session: &Arc<Session>, frame: Frame) {
        let Ok(plaintext) = frame.encode() else {
            return;
        };
        match session.seal(&plaintext) {
            Ok(wire) => {
                let _ = self.transport.send_to(&wire, session.peer_addr).await;
            }
            Err(chat_crypto::CryptoError::NonceOverflow) => {
                tracing::warn!(addr = %session.peer_addr, "send nonce exhausted, forcing rehandshake");
                self.close_session(session).await;
            }
            Err(_) => {}
        }
    }

    async fn send_event_to_user(&self, username: &str, event: chat_core::proto::EventBody) {
        if let Some(session) = self.registry.get_by_username(username) {
            self.send_sealed(&session, event.into_frame()).await;
        }
    }

    async fn broadcast_event_to_all(&self, event: chat_core::proto::EventBody, exclude: Option<SocketAddr>) {
        for session in self.registry.authenticated_sessions() {
            if Some(session.peer_addr) == exclude {
                continue;
            }
            self.send_sealed(&session, event.clone().into_frame()).await;
        }
    }
}

fn error_response(kind: &'static str) -> ResponseBody {
    ResponseBody::Error {
        kind: kind.to_owned(),
        message: kind.to_owned(),
    }
}
