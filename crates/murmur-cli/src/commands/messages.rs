//! Conversation history and sending

use anyhow::{bail, Context as _, Result};

use murmur_core::{Conversation, Message, SnapshotFetcher, User};

use super::Context;
use crate::output::{format_message, Output, OutputFormat};

/// Find a conversation by id or by the peer's username
pub fn resolve_conversation<'a>(
    conversations: &'a [Conversation],
    target: &str,
) -> Result<&'a Conversation> {
    let target = target.trim();
    conversations
        .iter()
        .find(|c| c.id == target)
        .or_else(|| {
            conversations
                .iter()
                .find(|c| c.peer.username.eq_ignore_ascii_case(target))
        })
        .with_context(|| {
            format!(
                "No conversation with '{}'. Add them first with `murmur add-friend {}`.",
                target, target
            )
        })
}

/// Display name of a message author within a conversation
pub fn author_name(me: &User, conversation: &Conversation, author_id: &str) -> String {
    if author_id == me.id {
        me.username.clone()
    } else if author_id == conversation.peer.id {
        conversation.peer.username.clone()
    } else {
        author_id.to_string()
    }
}

async fn find_conversation(ctx: &Context, token: &str, target: &str) -> Result<Conversation> {
    let conversations = ctx
        .client
        .conversations(token)
        .await
        .context("Failed to load conversations")?;
    resolve_conversation(&conversations, target).cloned()
}

pub async fn history(ctx: &Context, target: String, output: &Output) -> Result<()> {
    let session = ctx.require_session().await?;
    let conversation = find_conversation(ctx, &session.token, &target).await?;

    let mut messages = ctx
        .client
        .messages(&session.token, &conversation.id)
        .await
        .context("Failed to load messages")?;
    messages.sort_by(Message::display_cmp);

    let ordered: Vec<&Message> = messages.iter().collect();
    output.print_messages(&ordered, |author_id| {
        author_name(&session.user, &conversation, author_id)
    });
    Ok(())
}

pub async fn send(ctx: &Context, target: String, words: Vec<String>, output: &Output) -> Result<()> {
    let content = words.join(" ");
    if content.trim().is_empty() {
        bail!("Nothing to send");
    }

    let session = ctx.require_session().await?;
    let conversation = find_conversation(ctx, &session.token, &target).await?;
    let message = ctx
        .client
        .send_message(&session.token, &conversation.id, &content)
        .await
        .context("Failed to send message")?;

    match output.format {
        OutputFormat::Json => output.json(&message),
        OutputFormat::Quiet => println!("{}", message.id),
        OutputFormat::Human => println!(
            "{}",
            format_message(&message, &session.user.username)
        ),
    }
    Ok(())
}
