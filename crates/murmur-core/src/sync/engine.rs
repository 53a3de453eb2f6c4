//! Synchronization engine
//!
//! The engine is a single tokio task and the only writer of the [`Model`].
//! Everything that can change the model reaches it as a message:
//! session changes from the [`SessionStore`], commands from an
//! [`EngineHandle`], and results of the network work it spawned (snapshot
//! fetches, channel opens, reconnect and notice timers). Because one task
//! applies all of them in arrival order, no locking is needed around the
//! collections.
//!
//! Spawned work is tagged with the session epoch it started under, and push
//! signals additionally with the channel generation. Results whose tags no
//! longer match are dropped, which is how a torn-down session or a replaced
//! channel stops affecting the model.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::model::Model;
use super::state::{EngineState, ModelEvent};
use super::toast::Toasts;
use crate::api::SnapshotFetcher;
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::models::{Conversation, Message, User};
use crate::push::{ChannelSignal, PushConnector, PushFrame, PushHandle, PushSink};
use crate::session::{Session, SessionStore};

/// Capacity of the change notification channel
const EVENT_CAPACITY: usize = 256;

/// Configuration for the sync engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Initial reconnect delay
    pub initial_reconnect_delay: Duration,
    /// Maximum reconnect delay
    pub max_reconnect_delay: Duration,
    /// How long a transient notice stays visible
    pub notice_duration: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            notice_duration: Duration::from_secs(3),
        }
    }
}

impl EngineConfig {
    pub fn from_config(config: &Config) -> Self {
        let (initial_reconnect_delay, max_reconnect_delay) = config.reconnect_delays();
        Self {
            initial_reconnect_delay,
            max_reconnect_delay,
            notice_duration: config.toast_duration(),
        }
    }
}

/// Requests from the presentation layer
#[derive(Debug)]
enum Command {
    View(String),
    Refresh,
    DismissNotice,
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// A snapshot-able collection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Resource {
    Friends,
    Conversations,
    Messages(String),
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Friends => f.write_str("friends"),
            Resource::Conversations => f.write_str("conversations"),
            Resource::Messages(_) => f.write_str("messages"),
        }
    }
}

#[derive(Debug)]
enum Payload {
    Friends(Vec<User>),
    Conversations(Vec<Conversation>),
    Messages(Vec<Message>),
}

/// Results of spawned work, tagged with what they belong to
#[derive(Debug)]
enum Input {
    Channel {
        epoch: u64,
        generation: u64,
        signal: ChannelSignal,
    },
    ChannelOpened {
        epoch: u64,
        generation: u64,
        result: ApiResult<PushHandle>,
    },
    ReconnectDue {
        epoch: u64,
        generation: u64,
    },
    Fetched {
        epoch: u64,
        seq: u64,
        resource: Resource,
        result: ApiResult<Payload>,
    },
    NoticeExpired(u64),
}

/// State of the push channel
#[derive(Debug)]
enum Link {
    Connecting,
    Open(PushHandle),
    /// Lost (possibly before the open completed); a reconnect is scheduled
    Down,
}

/// Per-session bookkeeping; dropping it closes the channel and stops timers
#[derive(Debug)]
struct LiveSession {
    epoch: u64,
    token: String,
    /// Initial friends/conversations snapshot has settled
    bootstrapped: bool,
    /// Channel was lost and no fresh snapshot has been applied since
    reconnecting: bool,
    link: Link,
    /// Bumped on every channel open
    generation: u64,
    reconnect_delay: Duration,
    reconnect_timer: Option<JoinHandle<()>>,
    /// Bumped on every fetch request
    seq: u64,
    /// Latest outstanding request per resource
    pending: HashMap<Resource, u64>,
    /// Latest applied response per resource
    applied: HashMap<Resource, u64>,
}

impl LiveSession {
    fn new(epoch: u64, token: String, reconnect_delay: Duration) -> Self {
        Self {
            epoch,
            token,
            bootstrapped: false,
            reconnecting: false,
            link: Link::Connecting,
            generation: 0,
            reconnect_delay,
            reconnect_timer: None,
            seq: 0,
            pending: HashMap::new(),
            applied: HashMap::new(),
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }
}

/// Handle to a running sync engine
///
/// Cloneable; the engine stops when every handle is dropped or
/// [`EngineHandle::shutdown`] is called.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    model_rx: watch::Receiver<Arc<Model>>,
    state_rx: watch::Receiver<EngineState>,
    events: broadcast::Sender<ModelEvent>,
}

impl EngineHandle {
    /// Latest published model
    pub fn model(&self) -> Arc<Model> {
        self.model_rx.borrow().clone()
    }

    /// Watch published models
    pub fn watch_model(&self) -> watch::Receiver<Arc<Model>> {
        self.model_rx.clone()
    }

    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
        self.events.subscribe()
    }

    /// Switch the viewed conversation and fetch its history
    pub fn view(&self, dm_id: impl Into<String>) {
        let _ = self.commands.send(Command::View(dm_id.into()));
    }

    /// Re-fetch friends, conversations and the viewed history
    pub fn refresh(&self) {
        let _ = self.commands.send(Command::Refresh);
    }

    pub fn dismiss_notice(&self) {
        let _ = self.commands.send(Command::DismissNotice);
    }

    /// Resolves once every input queued so far has been applied
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// The sync engine task
pub struct SyncEngine<F, C> {
    session: Arc<SessionStore>,
    fetcher: Arc<F>,
    connector: Arc<C>,
    config: EngineConfig,
    inbox_tx: mpsc::UnboundedSender<Input>,
    model: Model,
    model_tx: watch::Sender<Arc<Model>>,
    state_tx: watch::Sender<EngineState>,
    events_tx: broadcast::Sender<ModelEvent>,
    /// Events raised while handling the current input
    outbox: Vec<ModelEvent>,
    dirty: bool,
    live: Option<LiveSession>,
    /// A session existed and was torn down
    ended: bool,
    toasts: Toasts,
}

impl<F: SnapshotFetcher, C: PushConnector> SyncEngine<F, C> {
    /// Spawn the engine
    ///
    /// The engine follows `session`: it bootstraps whenever a session is
    /// established and tears down whenever it is cleared.
    pub fn spawn(
        session: Arc<SessionStore>,
        fetcher: Arc<F>,
        connector: Arc<C>,
        config: EngineConfig,
    ) -> EngineHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (model_tx, model_rx) = watch::channel(Arc::new(Model::default()));
        let (state_tx, state_rx) = watch::channel(EngineState::Uninitialized);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let session_rx = session.subscribe();

        let engine = SyncEngine {
            session,
            fetcher,
            connector,
            toasts: Toasts::new(config.notice_duration),
            config,
            inbox_tx,
            model: Model::default(),
            model_tx,
            state_tx,
            events_tx: events_tx.clone(),
            outbox: Vec::new(),
            dirty: false,
            live: None,
            ended: false,
        };

        tokio::spawn(engine.run(session_rx, command_rx, inbox_rx));

        EngineHandle {
            commands: command_tx,
            model_rx,
            state_rx,
            events: events_tx,
        }
    }

    /// Main loop: one input at a time, publish after each
    async fn run(
        mut self,
        mut session_rx: watch::Receiver<Option<Session>>,
        mut command_rx: mpsc::UnboundedReceiver<Command>,
        mut inbox_rx: mpsc::UnboundedReceiver<Input>,
    ) {
        // Pick up a session established before the engine started
        let initial = session_rx.borrow_and_update().clone();
        self.on_session(initial);
        self.publish();

        loop {
            tokio::select! {
                biased;

                changed = session_rx.changed() => {
                    if changed.is_err() {
                        debug!("Session store dropped");
                        break;
                    }
                    let current = session_rx.borrow_and_update().clone();
                    self.on_session(current);
                }

                command = command_rx.recv() => {
                    match command {
                        Some(Command::Flush(done)) => {
                            while let Ok(input) = inbox_rx.try_recv() {
                                self.handle(input);
                            }
                            self.publish();
                            let _ = done.send(());
                        }
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.on_command(command),
                    }
                }

                Some(input) = inbox_rx.recv() => {
                    self.handle(input);
                }
            }

            self.publish();
        }

        self.teardown();
        self.publish();
        debug!("Sync engine stopped");
    }

    // ==================== Session lifecycle ====================

    fn on_session(&mut self, current: Option<Session>) {
        let Some(session) = current else {
            self.teardown();
            return;
        };

        let same_epoch = self
            .live
            .as_ref()
            .is_some_and(|live| live.epoch == session.epoch);
        if same_epoch {
            if self.model.me() != Some(&session.user) {
                self.model.set_me(session.user);
                self.emit(ModelEvent::IdentityChanged);
            }
            return;
        }

        self.teardown();
        self.bootstrap(session);
    }

    fn bootstrap(&mut self, session: Session) {
        info!(
            "Bootstrapping session for {} (epoch {})",
            session.user.username, session.epoch
        );

        self.model = Model::for_user(session.user);
        self.live = Some(LiveSession::new(
            session.epoch,
            session.token,
            self.config.initial_reconnect_delay,
        ));
        self.emit(ModelEvent::IdentityChanged);

        self.request(Resource::Friends);
        self.request(Resource::Conversations);
        self.open_channel();
    }

    /// Drop all per-session state
    fn teardown(&mut self) {
        let Some(live) = self.live.take() else {
            return;
        };
        info!("Tearing down session (epoch {})", live.epoch);
        drop(live);

        self.model = Model::default();
        self.toasts.dismiss();
        self.ended = true;
        self.emit(ModelEvent::SessionEnded);
    }

    /// The server rejected our token
    fn session_rejected(&mut self, err: &ApiError) {
        warn!("Session rejected by server: {}", err);
        self.session.clear();
    }

    /// Whether a tagged result still belongs to the live session (and channel)
    fn accepts(&self, epoch: u64, generation: Option<u64>) -> bool {
        let Some(live) = self.live.as_ref() else {
            return false;
        };
        live.epoch == epoch
            && self.session.is_current(epoch)
            && generation.map_or(true, |g| g == live.generation)
    }

    // ==================== Inputs ====================

    fn on_command(&mut self, command: Command) {
        match command {
            Command::View(dm_id) => {
                if self.live.is_none() {
                    debug!("Ignoring view change without a session");
                    return;
                }
                self.model.set_viewing(Some(dm_id.clone()));
                self.model.ensure_log(&dm_id);
                self.emit(ModelEvent::ViewChanged {
                    dm_id: Some(dm_id.clone()),
                });
                self.request(Resource::Messages(dm_id));
            }
            Command::Refresh => self.resync(),
            Command::DismissNotice => {
                if self.toasts.dismiss() {
                    self.model.set_notice(None);
                    self.emit(ModelEvent::Notice(None));
                }
            }
            // Handled by the run loop
            Command::Flush(_) | Command::Shutdown => {}
        }
    }

    fn handle(&mut self, input: Input) {
        match input {
            Input::Channel {
                epoch,
                generation,
                signal,
            } => {
                if !self.accepts(epoch, Some(generation)) {
                    debug!("Ignoring signal from a stale push channel");
                    return;
                }
                match signal {
                    ChannelSignal::Frame(frame) => self.apply_frame(frame),
                    ChannelSignal::Closed(reason) => self.on_channel_lost(&reason),
                }
            }

            Input::ChannelOpened {
                epoch,
                generation,
                result,
            } => {
                if !self.accepts(epoch, Some(generation)) {
                    if let Ok(handle) = result {
                        handle.close();
                    }
                    return;
                }
                match result {
                    Ok(handle) => self.on_channel_open(handle),
                    Err(e) if e.is_auth() => self.session_rejected(&e),
                    Err(e) => self.on_channel_lost(&e.to_string()),
                }
            }

            Input::ReconnectDue { epoch, generation } => {
                if !self.accepts(epoch, Some(generation)) {
                    return;
                }
                let down = self
                    .live
                    .as_ref()
                    .is_some_and(|live| matches!(live.link, Link::Down));
                if down {
                    info!("Reopening push channel");
                    self.open_channel();
                }
            }

            Input::Fetched {
                epoch,
                seq,
                resource,
                result,
            } => {
                if !self.accepts(epoch, None) {
                    debug!("Ignoring stale {} snapshot", resource);
                    return;
                }
                self.on_fetched(seq, resource, result);
            }

            Input::NoticeExpired(generation) => {
                if self.toasts.expire(generation) {
                    self.model.set_notice(None);
                    self.emit(ModelEvent::Notice(None));
                }
            }
        }
    }

    fn apply_frame(&mut self, frame: PushFrame) {
        match frame {
            PushFrame::Hello { user, .. } => {
                if self.model.me() != Some(&user) {
                    self.model.set_me(user);
                    self.emit(ModelEvent::IdentityChanged);
                }
            }
            PushFrame::FriendsChanged => self.request(Resource::Friends),
            PushFrame::ConversationReady { dm_id, .. } => {
                self.model.ensure_log(&dm_id);
                self.dirty = true;
                self.request(Resource::Conversations);
            }
            PushFrame::MessageNew { dm_id, message } => {
                let id = message.id.clone();
                if self.model.insert_message(&dm_id, message) {
                    self.emit(ModelEvent::MessagesChanged { dm_id });
                } else {
                    debug!("Duplicate message {} ignored", id);
                }
            }
            PushFrame::Unknown => debug!("Ignoring push frame of unknown type"),
        }
    }

    fn on_fetched(&mut self, seq: u64, resource: Resource, result: ApiResult<Payload>) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        if live.pending.get(&resource) == Some(&seq) {
            live.pending.remove(&resource);
        }

        match result {
            Ok(payload) => {
                let newest = live
                    .applied
                    .get(&resource)
                    .map_or(true, |&applied| seq > applied);
                if newest {
                    live.applied.insert(resource.clone(), seq);
                    self.apply_snapshot(&resource, payload);
                } else {
                    debug!("Dropping out-of-date {} snapshot", resource);
                }
            }
            Err(e) if e.is_auth() => {
                self.session_rejected(&e);
                return;
            }
            Err(e) => {
                warn!("Fetching {} failed: {}", resource, e);
                self.notify(format!("Could not load {}: {}", resource, e));
            }
        }

        self.settle();
    }

    fn apply_snapshot(&mut self, resource: &Resource, payload: Payload) {
        match (resource, payload) {
            (_, Payload::Friends(friends)) => {
                debug!("Applying friends snapshot ({} entries)", friends.len());
                self.model.replace_friends(friends);
                self.emit(ModelEvent::FriendsChanged);
            }
            (_, Payload::Conversations(conversations)) => {
                debug!(
                    "Applying conversations snapshot ({} entries)",
                    conversations.len()
                );
                self.model.replace_conversations(conversations);
                self.emit(ModelEvent::ConversationsChanged);
            }
            (Resource::Messages(dm_id), Payload::Messages(messages)) => {
                debug!("Applying history of {} ({} messages)", dm_id, messages.len());
                self.model.replace_messages(dm_id, messages);
                self.emit(ModelEvent::MessagesChanged {
                    dm_id: dm_id.clone(),
                });
            }
            (other, Payload::Messages(_)) => {
                warn!("Message history delivered for {}", other);
            }
        }
    }

    /// Advance Bootstrapping/Reconnecting once outstanding snapshots settled
    fn settle(&mut self) {
        let Some(live) = self.live.as_mut() else {
            return;
        };

        let initial_pending = live.pending.contains_key(&Resource::Friends)
            || live.pending.contains_key(&Resource::Conversations);
        if !live.bootstrapped && !initial_pending {
            live.bootstrapped = true;
            info!("Initial snapshot settled (epoch {})", live.epoch);
        }

        if live.reconnecting && matches!(live.link, Link::Open(_)) && live.pending.is_empty() {
            live.reconnecting = false;
            info!("Resynchronized after reconnect (epoch {})", live.epoch);
        }
    }

    // ==================== Network work ====================

    /// Fetch a resource in the background
    fn request(&mut self, resource: Resource) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        live.seq += 1;
        let seq = live.seq;
        let epoch = live.epoch;
        live.pending.insert(resource.clone(), seq);

        let token = live.token.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let inbox = self.inbox_tx.clone();
        debug!("Fetching {} (epoch {}, seq {})", resource, epoch, seq);

        tokio::spawn(async move {
            let result = match &resource {
                Resource::Friends => fetcher.friends(&token).await.map(Payload::Friends),
                Resource::Conversations => fetcher
                    .conversations(&token)
                    .await
                    .map(Payload::Conversations),
                Resource::Messages(dm_id) => fetcher
                    .messages(&token, dm_id)
                    .await
                    .map(Payload::Messages),
            };
            let _ = inbox.send(Input::Fetched {
                epoch,
                seq,
                resource,
                result,
            });
        });
    }

    /// Full re-pull: friends, conversations and the viewed history
    fn resync(&mut self) {
        if self.live.is_none() {
            return;
        }
        debug!("Re-fetching full snapshot");
        self.request(Resource::Friends);
        self.request(Resource::Conversations);
        if let Some(dm_id) = self.model.viewing().map(str::to_string) {
            self.request(Resource::Messages(dm_id));
        }
    }

    fn open_channel(&mut self) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        live.generation += 1;
        // Replacing the link drops any previous handle, closing it
        live.link = Link::Connecting;

        let epoch = live.epoch;
        let generation = live.generation;
        let token = live.token.clone();

        let sink_inbox = self.inbox_tx.clone();
        let sink = PushSink::new(move |signal| {
            let _ = sink_inbox.send(Input::Channel {
                epoch,
                generation,
                signal,
            });
        });

        let connector = Arc::clone(&self.connector);
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let result = connector.open(&token, sink).await;
            let _ = inbox.send(Input::ChannelOpened {
                epoch,
                generation,
                result,
            });
        });
    }

    fn on_channel_open(&mut self, handle: PushHandle) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        // The reader may report closure before the open result arrives
        if matches!(live.link, Link::Down) {
            debug!("Push channel closed while opening (epoch {})", live.epoch);
            handle.close();
            return;
        }
        info!("Push channel open (epoch {})", live.epoch);
        live.link = Link::Open(handle);
        live.reconnect_delay = self.config.initial_reconnect_delay;

        // Anything applied before this point may have missed events
        let resync = live.reconnecting || live.bootstrapped;
        if resync {
            self.resync();
        }
        self.settle();
    }

    fn on_channel_lost(&mut self, reason: &str) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        if matches!(live.link, Link::Down) {
            return;
        }
        warn!("Push channel lost: {}", reason);
        live.link = Link::Down;
        live.reconnecting = true;

        let delay = live.reconnect_delay;
        live.reconnect_delay = (delay * 2).min(self.config.max_reconnect_delay);

        let epoch = live.epoch;
        let generation = live.generation;
        let inbox = self.inbox_tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inbox.send(Input::ReconnectDue { epoch, generation });
        });
        if let Some(previous) = live.reconnect_timer.replace(timer) {
            previous.abort();
        }
        debug!("Reconnecting in {:?}", delay);

        self.notify("Connection lost, reconnecting...");
    }

    // ==================== Publishing ====================

    fn notify(&mut self, message: impl Into<String>) {
        let message = message.into();
        let inbox = self.inbox_tx.clone();
        self.toasts.show(message.clone(), move |generation| {
            let _ = inbox.send(Input::NoticeExpired(generation));
        });
        self.model.set_notice(self.toasts.current().map(str::to_string));
        self.emit(ModelEvent::Notice(Some(message)));
    }

    fn emit(&mut self, event: ModelEvent) {
        self.outbox.push(event);
        self.dirty = true;
    }

    fn derive_state(&self) -> EngineState {
        match &self.live {
            None if self.ended => EngineState::TornDown,
            None => EngineState::Uninitialized,
            Some(live) if !live.bootstrapped => EngineState::Bootstrapping,
            Some(live) if live.reconnecting => EngineState::Reconnecting,
            Some(_) => EngineState::Live,
        }
    }

    /// Publish the model, then the state, then the change events
    fn publish(&mut self) {
        let state = self.derive_state();
        let state_changed = *self.state_tx.borrow() != state;
        if state_changed {
            info!("Sync state: {}", state);
            self.outbox.push(ModelEvent::StateChanged(state));
        }

        if self.dirty {
            self.model_tx.send_replace(Arc::new(self.model.clone()));
            self.dirty = false;
        }
        if state_changed {
            self.state_tx.send_replace(state);
        }
        for event in self.outbox.drain(..) {
            let _ = self.events_tx.send(event);
        }
    }
}
