//! In-memory conversation model
//!
//! The merged view of snapshot and push data. Only the sync engine mutates
//! it; subscribers receive immutable `Arc<Model>` snapshots. Collections sit
//! behind `Arc` so publishing a new snapshot only copies what changed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::models::{Conversation, Message, User};

/// Messages of one conversation
///
/// Stored in arrival order with an id set for at-most-once insertion.
/// Display order is produced on read by a stable sort on
/// `(created_at, id)`.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    arrived: Vec<Message>,
    ids: HashSet<String>,
}

impl MessageLog {
    /// Insert unless a message with the same id is already present
    pub fn insert(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        self.arrived.push(message);
        true
    }

    /// Replace with a fetched history
    ///
    /// Messages already held but missing from the snapshot are kept: they
    /// were pushed after the snapshot was taken on the server.
    pub fn merge_snapshot(&mut self, snapshot: Vec<Message>) {
        let previous = std::mem::take(&mut self.arrived);
        self.ids.clear();

        for message in snapshot.into_iter().chain(previous) {
            self.insert(message);
        }
    }

    /// Messages in display order
    pub fn ordered(&self) -> Vec<&Message> {
        let mut messages: Vec<&Message> = self.arrived.iter().collect();
        messages.sort_by(|a, b| a.display_cmp(b));
        messages
    }

    /// Messages in the order they were applied
    pub fn arrivals(&self) -> &[Message] {
        &self.arrived
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.arrived.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrived.is_empty()
    }
}

/// Everything the presentation layer can read
#[derive(Debug, Clone, Default)]
pub struct Model {
    me: Option<User>,
    friends: Arc<Vec<User>>,
    conversations: Arc<Vec<Conversation>>,
    logs: HashMap<String, Arc<MessageLog>>,
    viewing: Option<String>,
    notice: Option<String>,
}

impl Model {
    /// Empty model for a freshly established session
    pub fn for_user(me: User) -> Self {
        Self {
            me: Some(me),
            ..Self::default()
        }
    }

    // ==================== Reads ====================

    pub fn me(&self) -> Option<&User> {
        self.me.as_ref()
    }

    pub fn friends(&self) -> &[User] {
        &self.friends
    }

    pub fn friend(&self, id: &str) -> Option<&User> {
        self.friends.iter().find(|f| f.id == id)
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Conversation with a peer, looked up by username (case-insensitive)
    pub fn conversation_with(&self, username: &str) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|c| c.peer.username.eq_ignore_ascii_case(username))
    }

    /// Messages of a conversation in display order
    pub fn messages(&self, dm_id: &str) -> Vec<&Message> {
        self.logs
            .get(dm_id)
            .map(|log| log.ordered())
            .unwrap_or_default()
    }

    pub fn log(&self, dm_id: &str) -> Option<&MessageLog> {
        self.logs.get(dm_id).map(Arc::as_ref)
    }

    /// Currently viewed conversation
    pub fn viewing(&self) -> Option<&str> {
        self.viewing.as_deref()
    }

    /// Transient notification, if one is showing
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Whether anything session-scoped is held
    pub fn is_empty(&self) -> bool {
        self.me.is_none()
            && self.friends.is_empty()
            && self.conversations.is_empty()
            && self.logs.is_empty()
    }

    // ==================== Mutations (engine only) ====================

    pub(crate) fn set_me(&mut self, me: User) {
        self.me = Some(me);
    }

    /// Structurally replace the friends set
    ///
    /// Peers of existing conversations pick up the fresher identity.
    pub(crate) fn replace_friends(&mut self, friends: Vec<User>) {
        let mut seen = HashSet::new();
        let friends: Vec<User> = friends
            .into_iter()
            .filter(|f| seen.insert(f.id.clone()))
            .collect();

        let by_id: HashMap<&str, &User> = friends.iter().map(|f| (f.id.as_str(), f)).collect();
        if self
            .conversations
            .iter()
            .any(|c| by_id.get(c.peer.id.as_str()).is_some_and(|f| **f != c.peer))
        {
            for conversation in Arc::make_mut(&mut self.conversations) {
                if let Some(friend) = by_id.get(conversation.peer.id.as_str()) {
                    conversation.peer = (*friend).clone();
                }
            }
        }

        self.friends = Arc::new(friends);
    }

    /// Structurally replace the conversation list
    ///
    /// Keeps one conversation per peer and refreshes matching friends.
    pub(crate) fn replace_conversations(&mut self, conversations: Vec<Conversation>) {
        let mut seen_ids = HashSet::new();
        let mut seen_peers = HashSet::new();
        let conversations: Vec<Conversation> = conversations
            .into_iter()
            .filter(|c| seen_ids.insert(c.id.clone()) && seen_peers.insert(c.peer.id.clone()))
            .collect();

        let peers: HashMap<&str, &User> = conversations
            .iter()
            .map(|c| (c.peer.id.as_str(), &c.peer))
            .collect();
        if self
            .friends
            .iter()
            .any(|f| peers.get(f.id.as_str()).is_some_and(|p| **p != *f))
        {
            for friend in Arc::make_mut(&mut self.friends) {
                if let Some(peer) = peers.get(friend.id.as_str()) {
                    *friend = (*peer).clone();
                }
            }
        }

        self.conversations = Arc::new(conversations);
    }

    /// Make sure a message log exists for a conversation id
    pub(crate) fn ensure_log(&mut self, dm_id: &str) {
        self.logs.entry(dm_id.to_string()).or_default();
    }

    /// At-most-once insert; creates the log if needed
    pub(crate) fn insert_message(&mut self, dm_id: &str, message: Message) -> bool {
        let log = self.logs.entry(dm_id.to_string()).or_default();
        if log.contains(&message.id) {
            return false;
        }
        Arc::make_mut(log).insert(message)
    }

    pub(crate) fn replace_messages(&mut self, dm_id: &str, messages: Vec<Message>) {
        let log = self.logs.entry(dm_id.to_string()).or_default();
        Arc::make_mut(log).merge_snapshot(messages);
    }

    pub(crate) fn set_viewing(&mut self, dm_id: Option<String>) {
        self.viewing = dm_id;
    }

    pub(crate) fn set_notice(&mut self, notice: Option<String>) {
        self.notice = notice;
    }
}
