//! Local mirror of the slice of server state the client cares about: the
//! known user roster and chat history, keyed by peer (or the public
//! sentinel). Updated on explicit fetches and on server-pushed events; never
//! written to from anywhere else.

use std::collections::HashMap;

use chat_core::chat_entry::{ChatEntry, PUBLIC_SENTINEL};
use chat_core::proto::UserInfoWire;

/// A roster entry as surfaced to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    /// The username.
    pub name: String,
    /// Whether the user currently has an authenticated session.
    pub online: bool,
}

/// The client's local mirror of roster and chat history.
///
/// This is a passive cache: it never issues requests of its own. The
/// session drives it from fetch responses and pushed events.
#[derive(Debug, Default)]
pub struct Mirror {
    roster: HashMap<String, bool>,
    logs: HashMap<String, Vec<ChatEntry>>,
}

impl Mirror {
    /// An empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster wholesale, as returned by a `GetUsers` fetch.
    pub fn set_roster(&mut self, users: Vec<UserInfoWire>) {
        self.roster = users.into_iter().map(|u| (u.name, u.online)).collect();
    }

    /// Replace the chat log for `peer` (`None` for the public log), as
    /// returned by a `GetChats` fetch.
    pub fn set_chats(&mut self, peer: Option<&str>, entries: Vec<ChatEntry>) {
        self.logs.insert(log_key(peer), entries);
    }

    /// Mark `username` online in the roster, inserting it if the client has
    /// not fetched the roster yet.
    pub fn mark_online(&mut self, username: &str) {
        self.roster.insert(username.to_owned(), true);
    }

    /// Mark `username` offline in the roster, inserting it if the client has
    /// not fetched the roster yet.
    pub fn mark_offline(&mut self, username: &str) {
        self.roster.insert(username.to_owned(), false);
    }

    /// Append a freshly-arrived message to the cached log it belongs to, if
    /// that log has been fetched at least once. Logs that were never
    /// fetched stay empty until an explicit `get_chats` call, rather than
    /// silently growing from a partial view.
    pub fn append_if_tracked(&mut self, peer: Option<&str>, entry: ChatEntry) {
        if let Some(log) = self.logs.get_mut(&log_key(peer)) {
            log.push(entry);
        }
    }

    /// Current roster snapshot, sorted by name for stable display.
    #[must_use]
    pub fn roster(&self) -> Vec<RosterEntry> {
        let mut entries: Vec<RosterEntry> = self
            .roster
            .iter()
            .map(|(name, online)| RosterEntry {
                name: name.clone(),
                online: *online,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Cached chat log for `peer` (`None` for public), empty if never
    /// fetched.
    #[must_use]
    pub fn chats(&self, peer: Option<&str>) -> Vec<ChatEntry> {
        self.logs.get(&log_key(peer)).cloned().unwrap_or_default()
    }
}

fn log_key(peer: Option<&str>) -> String {
    peer.unwrap_or(PUBLIC_SENTINEL).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::chat_entry::ChatKind;
    use chat_core::time::WallClock;

    fn entry(speaker: &str) -> ChatEntry {
        ChatEntry::new(WallClock::from_unix_seconds(1), speaker, ChatKind::Message("hi".into()))
    }

    #[test]
    fn roster_reflects_presence_pushes_before_any_fetch() {
        let mut mirror = Mirror::new();
        mirror.mark_online("alice");
        assert_eq!(
            mirror.roster(),
            vec![RosterEntry {
                name: "alice".into(),
                online: true
            }]
        );
        mirror.mark_offline("alice");
        assert_eq!(mirror.roster()[0].online, false);
    }

    #[test]
    fn untracked_log_stays_empty_until_fetched() {
        let mut mirror = Mirror::new();
        mirror.append_if_tracked(Some("bob"), entry("bob"));
        assert!(mirror.chats(Some("bob")).is_empty());

        mirror.set_chats(Some("bob"), vec![entry("bob")]);
        mirror.append_if_tracked(Some("bob"), entry("alice"));
        assert_eq!(mirror.chats(Some("bob")).len(), 2);
    }

    #[test]
    fn public_and_private_logs_are_distinct() {
        let mut mirror = Mirror::new();
        mirror.set_chats(None, vec![entry("alice")]);
        mirror.set_chats(Some("alice"), vec![entry("alice"), entry("alice")]);
        assert_eq!(mirror.chats(None).len(), 1);
        assert_eq!(mirror.chats(Some("alice")).len(), 2);
    }
}
