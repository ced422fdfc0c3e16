//! Session registry: the server's peer table, indexed by address and by
//! authenticated username, with heartbeat-driven reap.
//!
//! The registry is mutated exclusively by the server's single receive/timer
//! loop (see `chat-server::endpoint`), so the `Mutex` below exists for
//! `Send`/`Sync` and interior mutability rather than to arbitrate real
//! contention; it is never held across an `.await`, matching the "one
//! mutual-exclusion guard, no suspension while held" rule for this
//! component.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chat_crypto::envelope::Envelope;

use crate::error::RegistryError;

/// A session is either unauthenticated or bound to exactly one username.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake complete, no successful login yet.
    UnauthConnected,
    /// Bound to a username.
    Authenticated,
}

/// Runtime per-peer session state.
pub struct Session {
    /// The peer's socket address; the registry's primary index key.
    pub peer_addr: SocketAddr,
    /// The peer's ephemeral X25519 public key, as presented at handshake.
    pub pub_key: [u8; 32],
    /// Sealed-frame envelope for this peer pair (send/recv nonce state).
    envelope: Mutex<Envelope>,
    username: Mutex<Option<String>>,
    last_heartbeat: Mutex<Instant>,
    consecutive_errors: Mutex<(u32, Instant)>,
}

impl Session {
    fn new(peer_addr: SocketAddr, pub_key: [u8; 32], envelope: Envelope, now: Instant) -> Self {
        Self {
            peer_addr,
            pub_key,
            envelope: Mutex::new(envelope),
            username: Mutex::new(None),
            last_heartbeat: Mutex::new(now),
            consecutive_errors: Mutex::new((0, now)),
        }
    }

    /// The username this session is authenticated as, if any.
    #[must_use]
    pub fn username(&self) -> Option<String> {
        self.username.lock().expect("session username lock poisoned").clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.username().is_some() {
            SessionState::Authenticated
        } else {
            SessionState::UnauthConnected
        }
    }

    /// Seal a plaintext payload for this peer.
    ///
    /// # Errors
    ///
    /// Propagates [`chat_crypto::CryptoError::NonceOverflow`] if the send
    /// counter would wrap; the caller must tear the session down and force
    /// a rehandshake.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, chat_crypto::CryptoError> {
        self.envelope
            .lock()
            .expect("session envelope lock poisoned")
            .seal(plaintext)
    }

    /// Open a sealed wire frame from this peer.
    ///
    /// # Errors
    ///
    /// Propagates [`chat_crypto::CryptoError::DecryptionFailed`] /
    /// [`chat_crypto::CryptoError::ReplayRejected`] from the envelope.
    pub fn open(&self, wire: &[u8]) -> Result<Vec<u8>, chat_crypto::CryptoError> {
        self.envelope
            .lock()
            .expect("session envelope lock poisoned")
            .open(wire)
    }

    fn touch(&self, now: Instant) {
        *self.last_heartbeat.lock().expect("heartbeat lock poisoned") = now;
    }

    fn last_heartbeat(&self) -> Instant {
        *self.last_heartbeat.lock().expect("heartbeat lock poisoned")
    }

    /// Record a frame decode/MAC failure from this peer. Returns `true` if
    /// the failure streak has crossed the close threshold (32 failures
    /// within 10 seconds) and the session should be torn down.
    pub fn record_failure(&self, now: Instant) -> bool {
        let mut guard = self
            .consecutive_errors
            .lock()
            .expect("error-streak lock poisoned");
        let (count, window_start) = *guard;
        if now.duration_since(window_start) > Duration::from_secs(10) {
            *guard = (1, now);
            false
        } else {
            let next = count + 1;
            *guard = (next, window_start);
            next >= 32
        }
    }

    /// Reset the failure streak on any successfully authenticated frame.
    pub fn record_success(&self, now: Instant) {
        *self
            .consecutive_errors
            .lock()
            .expect("error-streak lock poisoned") = (0, now);
    }
}

struct RegistryInner {
    by_addr: HashMap<SocketAddr, Arc<Session>>,
    by_username: HashMap<String, SocketAddr>,
}

/// The server's peer table: one entry per connected peer address, plus a
/// secondary index from authenticated username back to address.
pub struct SessionRegistry {
    heartbeat_interval: Duration,
    inner: Mutex<RegistryInner>,
}

impl SessionRegistry {
    /// Create an empty registry with the given heartbeat (reap) interval.
    #[must_use]
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            heartbeat_interval,
            inner: Mutex::new(RegistryInner {
                by_addr: HashMap::new(),
                by_username: HashMap::new(),
            }),
        }
    }

    /// Look up the session for a peer address, if one exists.
    #[must_use]
    pub fn get(&self, addr: &SocketAddr) -> Option<Arc<Session>> {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .by_addr
            .get(addr)
            .cloned()
    }

    /// Create (or replace) an unauthenticated session for `addr`. If a
    /// session already existed at this address, it is discarded; if it was
    /// authenticated, its username mapping is released and the caller
    /// should treat it as having gone offline (the endpoint emits the
    /// corresponding `Offline` notification and chat entry).
    ///
    /// Returns the new session and, if one was replaced, the username that
    /// should be reported offline.
    pub fn upsert_unauth(
        &self,
        addr: SocketAddr,
        pub_key: [u8; 32],
        envelope: Envelope,
        now: Instant,
    ) -> (Arc<Session>, Option<String>) {
        let session = Arc::new(Session::new(addr, pub_key, envelope, now));
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let evicted_username = inner.by_addr.remove(&addr).and_then(|old| {
            let username = old.username();
            if let Some(ref u) = username {
                inner.by_username.remove(u);
            }
            username
        });
        inner.by_addr.insert(addr, session.clone());
        (session, evicted_username)
    }

    /// Bind `session` to `username`, evicting any other session currently
    /// authenticated under that name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyAuthenticated`] if `session` already
    /// has a username bound.
    ///
    /// Returns the evicted peer address (if any prior session existed for
    /// this username) so the caller can tear it down and notify it.
    pub fn authenticate(
        &self,
        session: &Arc<Session>,
        username: String,
    ) -> Result<Option<SocketAddr>, RegistryError> {
        if session.username().is_some() {
            return Err(RegistryError::AlreadyAuthenticated);
        }

        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let evicted = inner.by_username.insert(username.clone(), session.peer_addr);
        let evicted_addr = evicted.filter(|addr| *addr != session.peer_addr);
        if let Some(addr) = evicted_addr {
            // The evicted session's peer table entry stays put (it reverts
            // to unauthenticated); only its username binding is released.
            // A later request from that address is rejected with
            // `NotAuthenticated` rather than looking like an unknown peer.
            if let Some(old) = inner.by_addr.get(&addr) {
                *old.username.lock().expect("username lock poisoned") = None;
            }
        }
        *session.username.lock().expect("username lock poisoned") = Some(username);
        Ok(evicted_addr)
    }

    /// Reset the heartbeat clock for `addr`'s session, if one exists.
    pub fn touch(&self, addr: &SocketAddr, now: Instant) {
        if let Some(session) = self.get(addr) {
            session.touch(now);
        }
    }

    /// Remove and return the session for `addr`, releasing its username
    /// binding if authenticated. Used for explicit `Logout` and for
    /// tearing down a session after a decode-failure streak.
    #[must_use]
    pub fn remove(&self, addr: &SocketAddr) -> Option<Arc<Session>> {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let session = inner.by_addr.remove(addr)?;
        if let Some(username) = session.username() {
            inner.by_username.remove(&username);
        }
        Some(session)
    }

    /// Remove every session whose last heartbeat predates `now -
    /// heartbeat_interval`. Returns the removed sessions so the caller can
    /// emit `Offline` for the authenticated ones.
    pub fn reap(&self, now: Instant) -> Vec<Arc<Session>> {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let expired: Vec<SocketAddr> = inner
            .by_addr
            .iter()
            .filter(|(_, session)| {
                now.duration_since(session.last_heartbeat()) > self.heartbeat_interval
            })
            .map(|(addr, _)| *addr)
            .collect();

        let mut removed = Vec::with_capacity(expired.len());
        for addr in expired {
            if let Some(session) = inner.by_addr.remove(&addr) {
                if let Some(username) = session.username() {
                    inner.by_username.remove(&username);
                }
                removed.push(session);
            }
        }
        removed
    }

    /// Number of sessions currently tracked (authenticated or not).
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.lock().expect("registry lock poisoned").by_addr.len()
    }

    /// Number of currently authenticated sessions.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .by_username
            .len()
    }

    /// Whether `username` currently has an authenticated session.
    #[must_use]
    pub fn is_online(&self, username: &str) -> bool {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .by_username
            .contains_key(username)
    }

    /// The session currently authenticated as `username`, if any.
    #[must_use]
    pub fn get_by_username(&self, username: &str) -> Option<Arc<Session>> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        let addr = inner.by_username.get(username)?;
        inner.by_addr.get(addr).cloned()
    }

    /// Every currently authenticated session, for event broadcast.
    #[must_use]
    pub fn authenticated_sessions(&self) -> Vec<Arc<Session>> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner
            .by_username
            .values()
            .filter_map(|addr| inner.by_addr.get(addr).cloned())
            .collect()
    }
}
