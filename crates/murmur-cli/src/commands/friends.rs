//! Friends and conversation listing

use anyhow::{Context as _, Result};

use murmur_core::SnapshotFetcher;

use super::Context;
use crate::output::{Output, OutputFormat};

pub async fn list(ctx: &Context, output: &Output) -> Result<()> {
    let session = ctx.require_session().await?;
    let friends = ctx
        .client
        .friends(&session.token)
        .await
        .context("Failed to load friends")?;
    output.print_users(&friends);
    Ok(())
}

/// Befriend a user by name; the server opens a conversation with them
pub async fn add(ctx: &Context, username: String, output: &Output) -> Result<()> {
    let session = ctx.require_session().await?;
    let dm_id = ctx
        .client
        .add_friend(&session.token, &username)
        .await
        .with_context(|| format!("Failed to add {}", username.trim()))?;

    match output.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({"username": username.trim(), "dm_id": dm_id})
        ),
        OutputFormat::Quiet => println!("{}", dm_id),
        OutputFormat::Human => output.success(&format!(
            "Added {}. Conversation: {}",
            username.trim(),
            dm_id
        )),
    }
    Ok(())
}

pub async fn conversations(ctx: &Context, output: &Output) -> Result<()> {
    let session = ctx.require_session().await?;
    let conversations = ctx
        .client
        .conversations(&session.token)
        .await
        .context("Failed to load conversations")?;
    output.print_conversations(&conversations);
    Ok(())
}
