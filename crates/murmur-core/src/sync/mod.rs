//! Real-time synchronization
//!
//! Merges full-state snapshots and push notifications into one in-memory
//! [`Model`] that converges to server state and survives reconnects.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized -> Bootstrapping -> Live <-> Reconnecting
//!                        \            |          /
//!                         +------> TornDown <---+
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let handle = SyncEngine::spawn(session, fetcher, connector, EngineConfig::default());
//! let mut events = handle.subscribe();
//! while let Ok(event) = events.recv().await {
//!     let model = handle.model();
//!     // render
//! }
//! ```

mod engine;
mod model;
mod state;
mod toast;

pub use engine::{EngineConfig, EngineHandle, SyncEngine};
pub use model::{MessageLog, Model};
pub use state::{EngineState, ModelEvent};
