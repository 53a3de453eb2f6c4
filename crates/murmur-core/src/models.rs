//! Data models for murmur
//!
//! Defines the entities shared by the server contracts and the in-memory
//! model: users, conversations and messages. Timestamps are milliseconds
//! since the Unix epoch, as the server produces them.

use std::cmp::Ordering;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A user, either ourselves or a peer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Stable identifier, never changes once issued
    pub id: String,
    /// Display name
    pub username: String,
    /// Ids of this user's friends
    #[serde(default)]
    pub friends: Vec<String>,
    /// Avatar as a data URL
    #[serde(default)]
    pub avatar: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            friends: Vec::new(),
            avatar: None,
        }
    }
}

/// A 1:1 conversation between us and one peer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    /// Conversation id; the merge key for messages
    pub id: String,
    /// The other member
    pub peer: User,
    /// Creation time (ms)
    pub created_at: i64,
}

/// One chat line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Globally unique id
    pub id: String,
    /// Conversation this message belongs to
    pub dm_id: String,
    /// Author user id
    pub author_id: String,
    /// Text content
    pub content: String,
    /// Creation time (ms)
    pub created_at: i64,
}

impl Message {
    /// Total display order: creation time, ties broken by id
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }

    /// Creation time as a UTC timestamp
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.created_at).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, created_at: i64) -> Message {
        Message {
            id: id.to_string(),
            dm_id: "d1".to_string(),
            author_id: "u1".to_string(),
            content: "hi".to_string(),
            created_at,
        }
    }

    #[test]
    fn test_display_order_uses_time_then_id() {
        let early = message("m9", 50);
        let late = message("m1", 100);
        assert_eq!(early.display_cmp(&late), Ordering::Less);

        let a = message("a", 100);
        let b = message("b", 100);
        assert_eq!(a.display_cmp(&b), Ordering::Less);
        assert_eq!(b.display_cmp(&a), Ordering::Greater);
    }

    #[test]
    fn test_user_defaults_when_fields_missing() {
        let user: User = serde_json::from_str(r#"{"id":"u1","username":"bob"}"#).unwrap();
        assert!(user.friends.is_empty());
        assert!(user.avatar.is_none());
    }

    #[test]
    fn test_conversation_from_server_json() {
        let json = r#"{
            "id": "d1",
            "peer": {"id": "u2", "username": "bob", "friends": ["u1"], "avatar": null},
            "created_at": 1700000000000
        }"#;
        let conversation: Conversation = serde_json::from_str(json).unwrap();
        assert_eq!(conversation.peer.username, "bob");
        assert_eq!(conversation.peer.friends, vec!["u1".to_string()]);
    }

    #[test]
    fn test_message_timestamp() {
        let msg = message("m1", 1_700_000_000_000);
        let ts = msg.timestamp().unwrap();
        assert_eq!(ts.timestamp_millis(), 1_700_000_000_000);
    }
}
