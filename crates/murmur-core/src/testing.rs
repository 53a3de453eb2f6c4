//! In-process fakes for the server contracts

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::api::SnapshotFetcher;
use crate::error::{ApiError, ApiResult};
use crate::models::{Conversation, Message, User};
use crate::push::{PushConnector, PushFrame, PushHandle, PushSink};

pub(crate) fn conversation(id: &str, peer: User) -> Conversation {
    Conversation {
        id: id.to_string(),
        peer,
        created_at: 1,
    }
}

pub(crate) fn message(id: &str, dm_id: &str, content: &str, created_at: i64) -> Message {
    Message {
        id: id.to_string(),
        dm_id: dm_id.to_string(),
        author_id: "u2".to_string(),
        content: content.to_string(),
        created_at,
    }
}

#[derive(Debug, Default)]
struct ServerState {
    me: Option<User>,
    users: Vec<User>,
    friends: Vec<User>,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    revoked: bool,
    delay: Duration,
    fail_me: Option<ApiError>,
    fail_friends: Option<ApiError>,
}

/// Server answering snapshot reads from memory
#[derive(Debug)]
pub(crate) struct FakeServer {
    state: Mutex<ServerState>,
    friends_fetches: AtomicUsize,
}

impl FakeServer {
    /// The only token the server accepts
    pub(crate) const TOKEN: &'static str = "token-alice";

    pub(crate) fn new(me: User) -> Self {
        let state = ServerState {
            users: vec![me.clone()],
            me: Some(me),
            ..ServerState::default()
        };
        Self {
            state: Mutex::new(state),
            friends_fetches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_friends(&self, friends: Vec<User>) {
        let mut state = self.state.lock().unwrap();
        for friend in &friends {
            if !state.users.iter().any(|u| u.id == friend.id) {
                state.users.push(friend.clone());
            }
        }
        state.friends = friends;
    }

    pub(crate) fn add_user(&self, user: User) {
        self.state.lock().unwrap().users.push(user);
    }

    pub(crate) fn add_conversation(&self, conversation: Conversation) {
        self.state.lock().unwrap().conversations.push(conversation);
    }

    pub(crate) fn add_message(&self, message: Message) {
        self.state.lock().unwrap().messages.push(message);
    }

    /// Befriend a registered user, creating the conversation
    pub(crate) fn add_friend(&self, token: &str, username: &str) -> ApiResult<String> {
        let mut state = self.state.lock().unwrap();
        authorize(&state, token)?;

        let peer = state
            .users
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned()
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
        if state.me.as_ref().is_some_and(|me| me.id == peer.id) {
            return Err(ApiError::Rejected {
                status: 400,
                message: "You cannot add yourself".to_string(),
            });
        }

        if !state.friends.iter().any(|f| f.id == peer.id) {
            state.friends.push(peer.clone());
        }
        let dm_id = format!("dm-{}", peer.id);
        if !state.conversations.iter().any(|c| c.id == dm_id) {
            state.conversations.push(conversation(&dm_id, peer));
        }
        Ok(dm_id)
    }

    /// Reject the token from now on
    pub(crate) fn revoke(&self) {
        self.state.lock().unwrap().revoked = true;
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    pub(crate) fn fail_next_me(&self, err: ApiError) {
        self.state.lock().unwrap().fail_me = Some(err);
    }

    pub(crate) fn fail_next_friends(&self, err: ApiError) {
        self.state.lock().unwrap().fail_friends = Some(err);
    }

    pub(crate) fn friends_fetches(&self) -> usize {
        self.friends_fetches.load(Ordering::SeqCst)
    }

    /// Run `read` under the lock, then wait out the configured delay
    async fn read<T>(
        &self,
        read: impl FnOnce(&mut ServerState) -> ApiResult<T>,
    ) -> ApiResult<T> {
        let (result, delay) = {
            let mut state = self.state.lock().unwrap();
            (read(&mut state), state.delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

fn authorize(state: &ServerState, token: &str) -> ApiResult<()> {
    if state.revoked || token != FakeServer::TOKEN {
        return Err(ApiError::Unauthorized("Invalid token".to_string()));
    }
    Ok(())
}

impl SnapshotFetcher for FakeServer {
    async fn me(&self, token: &str) -> ApiResult<User> {
        self.read(|state| {
            if let Some(err) = state.fail_me.take() {
                return Err(err);
            }
            authorize(state, token)?;
            state
                .me
                .clone()
                .ok_or_else(|| ApiError::Unauthorized("Invalid token".to_string()))
        })
        .await
    }

    async fn friends(&self, token: &str) -> ApiResult<Vec<User>> {
        self.friends_fetches.fetch_add(1, Ordering::SeqCst);
        self.read(|state| {
            if let Some(err) = state.fail_friends.take() {
                return Err(err);
            }
            authorize(state, token)?;
            Ok(state.friends.clone())
        })
        .await
    }

    async fn conversations(&self, token: &str) -> ApiResult<Vec<Conversation>> {
        self.read(|state| {
            authorize(state, token)?;
            Ok(state.conversations.clone())
        })
        .await
    }

    async fn messages(&self, token: &str, dm_id: &str) -> ApiResult<Vec<Message>> {
        self.read(|state| {
            authorize(state, token)?;
            if !state.conversations.iter().any(|c| c.id == dm_id) {
                return Err(ApiError::NotFound("DM not found".to_string()));
            }
            Ok(state
                .messages
                .iter()
                .filter(|m| m.dm_id == dm_id)
                .cloned()
                .collect())
        })
        .await
    }
}

/// Connector handing out in-memory channels
#[derive(Debug, Default)]
pub(crate) struct FakeConnector {
    sinks: Mutex<Vec<PushSink>>,
    shutdowns: Mutex<Vec<oneshot::Receiver<()>>>,
    fail_next: Mutex<Option<ApiError>>,
    /// Close reason reported on the sink before the next open returns
    drop_next: Mutex<Option<String>>,
    opens: AtomicUsize,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_next_open(&self, err: ApiError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    /// The next channel opens but the server drops it before `open` returns
    pub(crate) fn drop_next_open(&self, reason: &str) {
        *self.drop_next.lock().unwrap() = Some(reason.to_string());
    }

    /// Number of open attempts so far
    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of channels handed out
    pub(crate) fn channels(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    pub(crate) fn latest_sink(&self) -> PushSink {
        self.sinks
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no channel opened")
    }

    /// Deliver a frame on the most recent channel
    pub(crate) fn push(&self, frame: PushFrame) {
        self.latest_sink().deliver(frame);
    }

    /// Simulate the server dropping the most recent channel
    pub(crate) fn drop_connection(&self) {
        self.latest_sink().closed("connection reset");
    }

    /// Whether the consumer closed the `index`-th channel
    pub(crate) fn is_closed(&self, index: usize) -> bool {
        let mut shutdowns = self.shutdowns.lock().unwrap();
        match shutdowns.get_mut(index) {
            Some(rx) => !matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)),
            None => false,
        }
    }
}

impl PushConnector for FakeConnector {
    async fn open(&self, _token: &str, sink: PushSink) -> ApiResult<PushHandle> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_next.lock().unwrap().take() {
            return Err(err);
        }

        let (tx, rx) = oneshot::channel();
        if let Some(reason) = self.drop_next.lock().unwrap().take() {
            sink.closed(reason);
        }
        self.sinks.lock().unwrap().push(sink);
        self.shutdowns.lock().unwrap().push(rx);
        Ok(PushHandle::new(tx))
    }
}
