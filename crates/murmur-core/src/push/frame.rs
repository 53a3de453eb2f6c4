//! Push frame types
//!
//! Inbound frames are JSON text objects discriminated by `type`.

use serde::Deserialize;

use crate::models::{Message, User};

/// One notification received on the push channel
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum PushFrame {
    /// Greeting sent right after the connection is accepted
    #[serde(rename = "hello")]
    Hello {
        user: User,
        #[serde(default)]
        ts: i64,
    },

    /// Our friends list changed; carries no payload
    #[serde(rename = "friends:update")]
    FriendsChanged,

    /// A conversation exists (or was just created) with a peer
    #[serde(rename = "dm:ready")]
    ConversationReady {
        dm_id: String,
        #[serde(default)]
        peer_id: Option<String>,
    },

    /// A message was posted in a conversation
    #[serde(rename = "message:new")]
    MessageNew { dm_id: String, message: Message },

    /// Any type this client does not know about
    #[serde(other)]
    Unknown,
}

impl PushFrame {
    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Wire name of the frame type, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            PushFrame::Hello { .. } => "hello",
            PushFrame::FriendsChanged => "friends:update",
            PushFrame::ConversationReady { .. } => "dm:ready",
            PushFrame::MessageNew { .. } => "message:new",
            PushFrame::Unknown => "unknown",
        }
    }
}
