//! Push channel
//!
//! Long-lived WebSocket that delivers an unordered, at-least-once stream of
//! notifications for the current session.
//!
//! ## Protocol
//!
//! 1. Connect to `/ws?token=<session token>`
//! 2. Receive JSON text frames with a `type` discriminator
//! 3. On disconnect, the consumer decides whether and when to reopen
//!
//! ## Usage
//!
//! ```ignore
//! let connector = WsConnector::new("ws://127.0.0.1:8000/ws");
//! let sink = PushSink::new(|signal| println!("{:?}", signal));
//! let handle = connector.open(&token, sink).await?;
//! // ...
//! handle.close();
//! ```

mod channel;
mod frame;

use std::future::Future;

pub use channel::{ChannelSignal, PushHandle, PushSink, WsConnector};
pub use frame::PushFrame;

use crate::error::ApiResult;

/// Opens push channels for a session token
pub trait PushConnector: Send + Sync + 'static {
    /// Open a channel delivering to `sink`
    ///
    /// Fails if the transport cannot be established or the token is rejected.
    fn open(&self, token: &str, sink: PushSink)
        -> impl Future<Output = ApiResult<PushHandle>> + Send;
}
