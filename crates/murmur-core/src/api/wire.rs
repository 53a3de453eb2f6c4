//! Request and response bodies of the chat server's HTTP endpoints

use serde::{Deserialize, Serialize};

use crate::models::{Conversation, Message, User};

#[derive(Debug, Clone, Serialize)]
pub struct Credentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsernameBody<'a> {
    pub username: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMessageBody<'a> {
    pub dm_id: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct PasswordBody<'a> {
    pub old_password: &'a str,
    pub new_password: &'a str,
}

/// `None` clears the avatar
#[derive(Debug, Clone, Serialize)]
pub struct AvatarBody<'a> {
    pub avatar_data_url: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeResponse {
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FriendsResponse {
    pub friends: Vec<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DmsResponse {
    pub dms: Vec<Conversation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddFriendResponse {
    pub dm_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageResponse {
    pub message: Message,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub ts: i64,
}

/// Error body of a non-2xx response
///
/// `detail` is usually a string; request validation failures carry a list
/// of objects instead, which is rendered as JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        match self.detail? {
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }
}
