//! Murmur Core Library
//!
//! This crate provides the client side of murmur, a real-time direct
//! messaging service: it keeps an in-memory view of one user's friends,
//! conversations and messages in sync with the chat server.
//!
//! # Architecture
//!
//! - **Snapshots**: full-state pulls over HTTP, the source of truth
//! - **Push channel**: WebSocket notifications, unordered and at-least-once
//! - **Sync engine**: merges both into one model that survives reconnects
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let client = Arc::new(ApiClient::from_config(&config)?);
//! let session = Arc::new(SessionStore::new());
//!
//! let engine = SyncEngine::spawn(
//!     Arc::clone(&session),
//!     Arc::clone(&client),
//!     Arc::new(WsConnector::new(&config.push_url())),
//!     EngineConfig::from_config(&config),
//! );
//!
//! let (token, _) = client.login("alice", "secret1").await?;
//! session.confirm(client.as_ref(), &token).await?;
//! ```
//!
//! # Modules
//!
//! - `session`: Token and identity ownership, session epochs
//! - `api`: HTTP snapshot reads and mutations
//! - `push`: WebSocket push channel
//! - `sync`: Sync engine and the in-memory model
//! - `models`: Users, conversations and messages
//! - `config`: Application configuration

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod push;
pub mod session;
pub mod sync;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, SnapshotFetcher};
pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use models::{Conversation, Message, User};
pub use push::{PushConnector, PushFrame, WsConnector};
pub use session::{Session, SessionStore, TokenFile};
pub use sync::{EngineConfig, EngineHandle, EngineState, Model, ModelEvent, SyncEngine};
