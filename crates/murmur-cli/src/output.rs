//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use chrono::{Local, TimeZone, Utc};
use serde::Serialize;

use murmur_core::{Conversation, Message, User};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print any serializable value as pretty JSON
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Could not encode output: {}", e),
        }
    }

    /// Print one user
    pub fn print_user(&self, user: &User) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", user.id);
                println!("Username: {}", user.username);
                println!("Friends:  {}", user.friends.len());
                println!(
                    "Avatar:   {}",
                    if user.avatar.is_some() { "set" } else { "(none)" }
                );
            }
            OutputFormat::Json => self.json(user),
            OutputFormat::Quiet => println!("{}", user.username),
        }
    }

    /// Print a list of friends
    pub fn print_users(&self, users: &[User]) {
        match self.format {
            OutputFormat::Human => {
                if users.is_empty() {
                    println!("No friends yet. Add one with `murmur add-friend <username>`.");
                    return;
                }
                for user in users {
                    println!("{} | {}", short_id(&user.id), user.username);
                }
                println!("\n{} friend(s)", users.len());
            }
            OutputFormat::Json => self.json(users),
            OutputFormat::Quiet => {
                for user in users {
                    println!("{}", user.username);
                }
            }
        }
    }

    /// Print a list of conversations
    pub fn print_conversations(&self, conversations: &[Conversation]) {
        match self.format {
            OutputFormat::Human => {
                if conversations.is_empty() {
                    println!("No conversations yet.");
                    return;
                }
                for conversation in conversations {
                    println!(
                        "{} | {} | since {}",
                        conversation.id,
                        conversation.peer.username,
                        format_date(conversation.created_at)
                    );
                }
                println!("\n{} conversation(s)", conversations.len());
            }
            OutputFormat::Json => self.json(conversations),
            OutputFormat::Quiet => {
                for conversation in conversations {
                    println!("{}", conversation.id);
                }
            }
        }
    }

    /// Print a conversation history
    pub fn print_messages(&self, messages: &[&Message], author_name: impl Fn(&str) -> String) {
        match self.format {
            OutputFormat::Human => {
                if messages.is_empty() {
                    println!("No messages yet.");
                    return;
                }
                for message in messages {
                    println!("{}", format_message(message, &author_name(&message.author_id)));
                }
            }
            OutputFormat::Json => self.json(messages),
            OutputFormat::Quiet => {
                for message in messages {
                    println!("{}", message.content);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// One chat line: `[HH:MM] author: content`
pub fn format_message(message: &Message, author: &str) -> String {
    let time = message
        .timestamp()
        .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    format!("[{}] {}: {}", time, author, message.content)
}

fn format_date(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// First 8 characters of an id
fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(i, _)| &id[..i])
}

/// Truncate a string to max characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
