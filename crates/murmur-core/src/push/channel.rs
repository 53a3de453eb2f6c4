//! WebSocket push channel
//!
//! One long-lived connection per session. Frames are handed to a
//! [`PushSink`]; an unexpected closure is reported to the sink exactly once.
//! The channel never reconnects by itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::frame::PushFrame;
use super::PushConnector;
use crate::error::{ApiError, ApiResult};

/// Handshake timeout
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// What the channel reports to its consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    /// A well-formed frame
    Frame(PushFrame),
    /// The connection was lost; sent once per connection
    Closed(String),
}

/// Consumer side of a push channel
///
/// Cloning shares the closed flag, so all clones together report at most
/// one closure and deliver nothing after it.
#[derive(Clone)]
pub struct PushSink {
    deliver: Arc<dyn Fn(ChannelSignal) + Send + Sync>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for PushSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushSink")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PushSink {
    pub fn new(deliver: impl Fn(ChannelSignal) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Hand a frame to the consumer; ignored once closed
    pub fn deliver(&self, frame: PushFrame) {
        if !self.is_closed() {
            (self.deliver)(ChannelSignal::Frame(frame));
        }
    }

    /// Report closure; only the first call reaches the consumer
    pub fn closed(&self, reason: impl Into<String>) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            (self.deliver)(ChannelSignal::Closed(reason.into()));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Handle to an open push channel
///
/// Closing (or dropping) the handle releases the transport. A local close is
/// not reported to the sink.
#[derive(Debug)]
pub struct PushHandle {
    shutdown: Option<oneshot::Sender<()>>,
}

impl PushHandle {
    /// Wrap the shutdown trigger of a running channel task
    pub fn new(shutdown: oneshot::Sender<()>) -> Self {
        Self {
            shutdown: Some(shutdown),
        }
    }

    pub fn close(mut self) {
        self.signal_shutdown();
    }

    fn signal_shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for PushHandle {
    fn drop(&mut self) {
        self.signal_shutdown();
    }
}

/// Production connector for the server's `/ws` endpoint
#[derive(Debug, Clone)]
pub struct WsConnector {
    /// WebSocket URL, e.g. `ws://127.0.0.1:8000/ws`
    url: String,
    handshake_timeout: Duration,
}

impl WsConnector {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Connection URL with the token as query parameter
    fn url_for(&self, token: &str) -> ApiResult<String> {
        let mut url = reqwest::Url::parse(&self.url)
            .map_err(|e| ApiError::Invalid(format!("Invalid push URL '{}': {}", self.url, e)))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url.to_string())
    }
}

impl PushConnector for WsConnector {
    async fn open(&self, token: &str, sink: PushSink) -> ApiResult<PushHandle> {
        let url = self.url_for(token)?;
        debug!("Connecting to {}", self.url);

        let (ws_stream, _response) =
            match tokio::time::timeout(self.handshake_timeout, connect_async(url.as_str())).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(ApiError::ChannelClosed(format!(
                        "Timeout connecting to {}. Check that the server is running.",
                        self.url
                    )))
                }
            };

        info!("Push channel connected to {}", self.url);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(run_channel(ws_stream, sink, shutdown_rx));

        Ok(PushHandle::new(shutdown_tx))
    }
}

/// Read frames until the connection drops or the handle is closed
async fn run_channel(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    sink: PushSink,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("Push channel closed locally");
                write.close().await.ok();
                return;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match PushFrame::parse(&text) {
                        Ok(frame) => {
                            debug!("Push frame: {}", frame.kind());
                            sink.deliver(frame);
                        }
                        Err(e) => warn!("Dropping malformed push frame: {}", e),
                    },
                    Some(Ok(Message::Binary(data))) => {
                        warn!("Dropping binary push frame ({} bytes)", data.len());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!("closed by server ({})", f.code))
                            .unwrap_or_else(|| "closed by server".to_string());
                        sink.closed(reason);
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        sink.closed(e.to_string());
                        return;
                    }
                    None => {
                        sink.closed("connection ended");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::accept_async;

    fn collecting_sink() -> (PushSink, mpsc::UnboundedReceiver<ChannelSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = PushSink::new(move |signal| {
            let _ = tx.send(signal);
        });
        (sink, rx)
    }

    async fn next_signal(rx: &mut mpsc::UnboundedReceiver<ChannelSignal>) -> ChannelSignal {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for signal")
            .expect("sink dropped")
    }

    #[test]
    fn test_sink_reports_closure_once() {
        let (sink, mut rx) = collecting_sink();
        let clone = sink.clone();

        sink.closed("first");
        clone.closed("second");
        clone.deliver(PushFrame::FriendsChanged);

        assert_eq!(rx.try_recv().unwrap(), ChannelSignal::Closed("first".into()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_url_carries_token() {
        let connector = WsConnector::new("ws://127.0.0.1:8000/ws");
        assert_eq!(
            connector.url_for("abc 123").unwrap(),
            "ws://127.0.0.1:8000/ws?token=abc+123"
        );
        assert!(WsConnector::new("not a url").url_for("t").is_err());
    }

    #[tokio::test]
    async fn test_frames_then_single_closure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(socket).await.unwrap();
            ws.send(Message::Text(r#"{"type":"friends:update"}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text("{broken".into())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"dm:ready","dm_id":"d1"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.ok();
        });

        let (sink, mut rx) = collecting_sink();
        let connector = WsConnector::new(&format!("ws://{}/ws", addr));
        let _handle = connector.open("tok", sink).await.unwrap();

        assert_eq!(
            next_signal(&mut rx).await,
            ChannelSignal::Frame(PushFrame::FriendsChanged)
        );
        assert_eq!(
            next_signal(&mut rx).await,
            ChannelSignal::Frame(PushFrame::ConversationReady {
                dm_id: "d1".into(),
                peer_id: None
            })
        );
        assert!(matches!(next_signal(&mut rx).await, ChannelSignal::Closed(_)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_local_close_is_not_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(socket).await.unwrap();
            // Drain until the client goes away
            while let Some(Ok(_)) = ws.next().await {}
            let _ = done_tx.send(());
        });

        let (sink, mut rx) = collecting_sink();
        let connector = WsConnector::new(&format!("ws://{}/ws", addr));
        let handle = connector.open("tok", sink).await.unwrap();

        handle.close();
        tokio::time::timeout(Duration::from_secs(5), done_rx)
            .await
            .unwrap()
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rejected_upgrade_is_unauthorized() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
        });

        let (sink, _rx) = collecting_sink();
        let connector = WsConnector::new(&format!("ws://{}/ws", addr));
        let err = connector.open("bogus", sink).await.unwrap_err();
        assert!(err.is_auth());
    }
}
