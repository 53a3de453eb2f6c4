//! Live view
//!
//! Runs the sync engine and renders model changes as lines. Lines typed on
//! stdin are sent to the viewed conversation; lines starting with `/` are
//! commands (`/help` lists them).

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use murmur_core::{
    EngineConfig, EngineHandle, EngineState, Message, Model, ModelEvent, SyncEngine, WsConnector,
};

use super::messages::resolve_conversation;
use super::Context;
use crate::output::{format_message, truncate, Output, OutputFormat};

const HELP: &[&str] = &[
    "/view <username|id>  switch conversation",
    "/friends             list friends",
    "/dms                 list conversations",
    "/add <username>      add a friend",
    "/refresh             re-fetch everything",
    "/quit                leave",
    "anything else is sent to the current conversation",
];

/// One rendered line of the live view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Status(String),
    Message { line: String, message: Message },
}

/// Parsed line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Send(String),
    View(String),
    Add(String),
    Friends,
    Conversations,
    Refresh,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Send(line.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match (name, arg) {
        ("view" | "v", arg) if !arg.is_empty() => Input::View(arg.to_string()),
        ("add", arg) if !arg.is_empty() => Input::Add(arg.to_string()),
        ("friends", _) => Input::Friends,
        ("dms", _) => Input::Conversations,
        ("refresh", _) => Input::Refresh,
        ("help" | "?", _) => Input::Help,
        ("quit" | "q" | "exit", _) => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    }
}

/// Turns model changes into lines, printing each message once per view
#[derive(Debug, Default)]
pub struct LiveView {
    viewing: Option<String>,
    /// Messages printed in the current view
    shown: HashSet<String>,
    /// Messages from other conversations already announced
    announced: HashSet<String>,
}

impl LiveView {
    pub fn on_event(&mut self, event: &ModelEvent, model: &Model) -> Vec<Rendered> {
        match event {
            ModelEvent::StateChanged(state) => state_line(*state).into_iter().collect(),
            ModelEvent::ViewChanged { dm_id } => {
                let peer = dm_id.as_deref().map(|id| peer_name(model, id));
                let mut lines = self.switch_view(dm_id.clone(), peer);
                if let Some(dm_id) = dm_id {
                    lines.extend(self.messages_changed(
                        dm_id,
                        &model.messages(dm_id),
                        &peer_name(model, dm_id),
                        |author| author_name(model, author),
                    ));
                }
                lines
            }
            ModelEvent::MessagesChanged { dm_id } => self.messages_changed(
                dm_id,
                &model.messages(dm_id),
                &peer_name(model, dm_id),
                |author| author_name(model, author),
            ),
            ModelEvent::Notice(Some(text)) => vec![Rendered::Status(format!("! {}", text))],
            ModelEvent::SessionEnded => vec![Rendered::Status(
                "Session ended. Log in again with `murmur login <username>`.".to_string(),
            )],
            _ => Vec::new(),
        }
    }

    fn switch_view(&mut self, dm_id: Option<String>, peer: Option<String>) -> Vec<Rendered> {
        self.viewing = dm_id;
        self.shown.clear();
        let header = match peer {
            Some(peer) => format!("== {} ==", peer),
            None => "== no conversation selected ==".to_string(),
        };
        vec![Rendered::Status(header)]
    }

    fn messages_changed(
        &mut self,
        dm_id: &str,
        messages: &[&Message],
        peer: &str,
        author: impl Fn(&str) -> String,
    ) -> Vec<Rendered> {
        let viewed = self.viewing.as_deref() == Some(dm_id);
        let mut lines = Vec::new();

        for message in messages {
            if viewed {
                if self.shown.insert(message.id.clone()) {
                    lines.push(Rendered::Message {
                        line: format_message(message, &author(&message.author_id)),
                        message: (*message).clone(),
                    });
                }
            } else if self.announced.insert(message.id.clone()) {
                lines.push(Rendered::Status(format!(
                    "* {} (with {}): {}",
                    author(&message.author_id),
                    peer,
                    truncate(&message.content, 40)
                )));
            }
        }
        lines
    }
}

/// Event standing in for notifications that were skipped
fn catch_up(model: &Model, state: EngineState) -> ModelEvent {
    if state == EngineState::TornDown {
        return ModelEvent::SessionEnded;
    }
    ModelEvent::ViewChanged {
        dm_id: model.viewing().map(str::to_string),
    }
}

fn state_line(state: EngineState) -> Option<Rendered> {
    let text = match state {
        EngineState::Bootstrapping => "-- loading --",
        EngineState::Live => "-- live --",
        EngineState::Reconnecting => "-- connection lost, reconnecting --",
        EngineState::Uninitialized | EngineState::TornDown => return None,
    };
    Some(Rendered::Status(text.to_string()))
}

fn peer_name(model: &Model, dm_id: &str) -> String {
    model
        .conversation(dm_id)
        .map(|c| c.peer.username.clone())
        .unwrap_or_else(|| dm_id.to_string())
}

fn author_name(model: &Model, author_id: &str) -> String {
    if let Some(me) = model.me().filter(|me| me.id == author_id) {
        return me.username.clone();
    }
    model
        .friend(author_id)
        .map(|f| f.username.clone())
        .or_else(|| {
            model
                .conversations()
                .iter()
                .find(|c| c.peer.id == author_id)
                .map(|c| c.peer.username.clone())
        })
        .unwrap_or_else(|| author_id.to_string())
}

fn print_rendered(output: &Output, rendered: Rendered) {
    match (output.format, rendered) {
        (OutputFormat::Human, Rendered::Status(line))
        | (OutputFormat::Human, Rendered::Message { line, .. }) => println!("{}", line),
        (OutputFormat::Quiet, Rendered::Message { line, .. }) => println!("{}", line),
        (OutputFormat::Quiet, Rendered::Status(_)) => {}
        (OutputFormat::Json, Rendered::Status(line)) => {
            println!("{}", serde_json::json!({"status": line}));
        }
        (OutputFormat::Json, Rendered::Message { message, .. }) => {
            match serde_json::to_string(&message) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!("Could not encode message {}: {}", message.id, e),
            }
        }
    }
}

enum Flow {
    Continue,
    Quit,
}

/// Run the live view until the user quits or the session ends
pub async fn run(ctx: &Context, target: Option<String>, output: &Output) -> Result<()> {
    crate::logging::init_file(&ctx.config);

    let session = ctx.require_session().await?;
    let engine = SyncEngine::spawn(
        Arc::clone(&ctx.session),
        Arc::clone(&ctx.client),
        Arc::new(WsConnector::new(&ctx.config.push_url())),
        EngineConfig::from_config(&ctx.config),
    );
    let mut events = engine.subscribe();
    let mut view = LiveView::default();

    print_rendered(
        output,
        Rendered::Status(format!(
            "Connected to {} as {}. Type /help for commands.",
            ctx.config.server_url, session.user.username
        )),
    );

    // Conversations must be known before a target can be resolved
    let mut state = engine.subscribe_state();
    let _ = state
        .wait_for(|s| {
            matches!(
                s,
                EngineState::Live | EngineState::Reconnecting | EngineState::TornDown
            )
        })
        .await;

    if let Some(target) = target {
        if let Err(e) = execute(ctx, &engine, Input::View(target), output).await {
            print_rendered(output, Rendered::Status(format!("! {:#}", e)));
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Live view skipped {} events, redrawing", skipped);
                        catch_up(&engine.model(), engine.state())
                    }
                    Err(RecvError::Closed) => break,
                };
                let model = engine.model();
                for rendered in view.on_event(&event, &model) {
                    print_rendered(output, rendered);
                }
                if event == ModelEvent::SessionEnded {
                    // Only a rejected token ends the session while watching
                    if let Err(e) = ctx.token_file.remove() {
                        warn!("Could not remove rejected session: {}", e);
                    }
                    break;
                }
            }

            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };
                match execute(ctx, &engine, parse_input(&line), output).await {
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Continue) => {}
                    Err(e) => print_rendered(output, Rendered::Status(format!("! {:#}", e))),
                }
            }

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("Leaving live view");
    engine.shutdown();
    Ok(())
}

async fn execute(ctx: &Context, engine: &EngineHandle, input: Input, output: &Output) -> Result<Flow> {
    let status = |line: String| print_rendered(output, Rendered::Status(line));

    match input {
        Input::Send(text) => {
            let model = engine.model();
            let Some(dm_id) = model.viewing() else {
                bail!("No conversation selected. Use /view <username>.");
            };
            let token = current_token(ctx)?;
            // The message shows up through the push channel
            ctx.client
                .send_message(&token, dm_id, &text)
                .await
                .context("Failed to send")?;
        }
        Input::View(target) => {
            let model = engine.model();
            let conversation = resolve_conversation(model.conversations(), &target)?;
            engine.view(conversation.id.clone());
        }
        Input::Add(username) => {
            let token = current_token(ctx)?;
            let dm_id = ctx
                .client
                .add_friend(&token, &username)
                .await
                .with_context(|| format!("Failed to add {}", username))?;
            status(format!(
                "Added {}. Open the conversation with /view {}",
                username, dm_id
            ));
        }
        Input::Friends => {
            let model = engine.model();
            if model.friends().is_empty() {
                status("No friends yet.".to_string());
            }
            for friend in model.friends() {
                status(format!("  {}", friend.username));
            }
        }
        Input::Conversations => {
            let model = engine.model();
            if model.conversations().is_empty() {
                status("No conversations yet.".to_string());
            }
            for conversation in model.conversations() {
                let marker = if model.viewing() == Some(conversation.id.as_str()) {
                    ">"
                } else {
                    " "
                };
                status(format!(
                    "{} {} ({})",
                    marker, conversation.peer.username, conversation.id
                ));
            }
        }
        Input::Refresh => engine.refresh(),
        Input::Help => {
            for line in HELP {
                status(line.to_string());
            }
        }
        Input::Quit => return Ok(Flow::Quit),
        Input::Empty => {}
        Input::Unknown(line) => bail!("Unknown command: {}. Type /help.", line),
    }
    Ok(Flow::Continue)
}

fn current_token(ctx: &Context) -> Result<String> {
    ctx.session
        .token()
        .context("Not logged in. Run `murmur login <username>` first.")
}
