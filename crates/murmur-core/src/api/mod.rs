//! Chat server HTTP API
//!
//! Snapshot reads (full-state pulls) and mutations, both plain
//! request/response calls authenticated with the session token.
//!
//! ## Usage
//!
//! ```ignore
//! let client = ApiClient::new("http://127.0.0.1:8000")?;
//! let (token, user) = client.login("alice", "secret1").await?;
//! let friends = client.friends(&token).await?;
//! ```

mod client;
pub mod validate;
mod wire;

use std::future::Future;

pub use client::ApiClient;
pub use wire::HealthResponse;

use crate::error::ApiResult;
use crate::models::{Conversation, Message, User};

/// Full-state reads used by the sync engine
///
/// Implementations are stateless beyond the token they are handed and must
/// not cache or retry.
pub trait SnapshotFetcher: Send + Sync + 'static {
    /// Identity behind a token
    fn me(&self, token: &str) -> impl Future<Output = ApiResult<User>> + Send;

    fn friends(&self, token: &str) -> impl Future<Output = ApiResult<Vec<User>>> + Send;

    fn conversations(&self, token: &str)
        -> impl Future<Output = ApiResult<Vec<Conversation>>> + Send;

    /// Full history of one conversation
    fn messages(
        &self,
        token: &str,
        dm_id: &str,
    ) -> impl Future<Output = ApiResult<Vec<Message>>> + Send;
}
