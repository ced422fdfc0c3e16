//! Chatroom state: public broadcast log and per-peer private conversation
//! logs, each bounded and FIFO-evicting.
//!
//! Recipient validity (`RecipientUnknown`/`RecipientOffline`) is checked by
//! the caller against the user store and session registry before posting;
//! this component only owns log storage and fan-out, matching the
//! component boundary in the protocol design.

use std::collections::HashMap;
use std::sync::Mutex;

use chat_core::chat_entry::{BoundedLog, ChatEntry, ChatKind};
use chat_core::time::WallClock;

/// Public/private message fan-out and per-recipient history.
///
/// Private logs are keyed `(owner, peer)`: a message between `alice` and
/// `bob` is appended to both `(alice, bob)` and `(bob, alice)`, so either
/// side's [`ChatroomState::get_chats`] call with the other as `peer`
/// returns the same shared conversation.
pub struct ChatroomState {
    capacity: usize,
    public: Mutex<BoundedLog>,
    private: Mutex<HashMap<(String, String), BoundedLog>>,
}

impl ChatroomState {
    /// Create empty chatroom state with the given per-log capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            public: Mutex::new(BoundedLog::new(capacity)),
            private: Mutex::new(HashMap::new()),
        }
    }

    /// Append a private message to both participants' shared log.
    pub fn post_private(&self, from: &str, to: &str, text: &str, now: WallClock) -> ChatEntry {
        let entry = ChatEntry::new(now, from, ChatKind::Message(text.to_owned()));
        let mut private = self.private.lock().expect("chatroom lock poisoned");
        private
            .entry((from.to_owned(), to.to_owned()))
            .or_insert_with(|| BoundedLog::new(self.capacity))
            .push(entry.clone());
        private
            .entry((to.to_owned(), from.to_owned()))
            .or_insert_with(|| BoundedLog::new(self.capacity))
            .push(entry.clone());
        entry
    }

    /// Append a public broadcast message.
    pub fn post_public(&self, from: &str, text: &str, now: WallClock) -> ChatEntry {
        let entry = ChatEntry::new(now, from, ChatKind::Message(text.to_owned()));
        self.public
            .lock()
            .expect("chatroom lock poisoned")
            .push(entry.clone());
        entry
    }

    /// Append an online/offline presence entry to the public log and to
    /// every peer log that already contains `user` (i.e. peers who have
    /// previously chatted with or seen `user`).
    pub fn post_presence(&self, user: &str, online: bool, now: WallClock) -> ChatEntry {
        let kind = if online { ChatKind::Online } else { ChatKind::Offline };
        let entry = ChatEntry::new(now, user, kind);

        self.public
            .lock()
            .expect("chatroom lock poisoned")
            .push(entry.clone());

        let mut private = self.private.lock().expect("chatroom lock poisoned");
        let touched: Vec<String> = private
            .keys()
            .filter(|(owner, peer)| peer == user && owner != user)
            .map(|(owner, _)| owner.clone())
            .collect();
        for owner in touched {
            private
                .get_mut(&(owner, user.to_owned()))
                .expect("key came from this map")
                .push(entry.clone());
        }
        entry
    }

    /// Fetch history: the public log if `peer` is `None`, otherwise the
    /// private conversation `user` has with `peer`.
    #[must_use]
    pub fn get_chats(&self, user: &str, peer: Option<&str>) -> Vec<ChatEntry> {
        match peer {
            None => self.public.lock().expect("chatroom lock poisoned").entries(),
            Some(peer) => self
                .private
                .lock()
                .expect("chatroom lock poisoned")
                .get(&(user.to_owned(), peer.to_owned()))
                .map(BoundedLog::entries)
                .unwrap_or_default(),
        }
    }

    /// Number of entries currently in the public log.
    #[must_use]
    pub fn public_len(&self) -> usize {
        self.public.lock().expect("chatroom lock poisoned").len()
    }
}
