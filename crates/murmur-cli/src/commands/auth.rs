//! Register, login, logout and whoami

use anyhow::{Context as _, Result};

use super::{prompt, Context};
use crate::output::{Output, OutputFormat};

/// Create an account, then log in with it
pub async fn register(ctx: &Context, username: String, output: &Output) -> Result<()> {
    if ctx.client.user_exists(&username).await.unwrap_or(false) {
        anyhow::bail!("Username '{}' is already taken", username.trim());
    }

    let password = prompt("Password")?;
    ctx.client
        .register(&username, &password)
        .await
        .context("Registration failed")?;

    output.success(&format!("Registered {}", username.trim()));
    login_with(ctx, &username, &password, output).await
}

pub async fn login(ctx: &Context, username: String, output: &Output) -> Result<()> {
    let password = prompt("Password")?;
    login_with(ctx, &username, &password, output).await
}

async fn login_with(ctx: &Context, username: &str, password: &str, output: &Output) -> Result<()> {
    let (token, _) = ctx
        .client
        .login(username, password)
        .await
        .context("Login failed")?;

    // Confirm the identity behind the new token before persisting it
    let session = ctx.session.confirm(ctx.client.as_ref(), &token).await?;
    ctx.token_file
        .save(&token)
        .context("Failed to save session")?;

    match output.format {
        OutputFormat::Json => output.json(&session.user),
        OutputFormat::Quiet => {}
        OutputFormat::Human => output.success(&format!("Logged in as {}", session.user.username)),
    }
    Ok(())
}

/// Forget the saved session
pub fn logout(ctx: &Context, output: &Output) -> Result<()> {
    let had_session = ctx.token_file.load().is_some();
    ctx.token_file.remove().context("Failed to remove session")?;
    ctx.session.clear();

    if had_session {
        output.success("Logged out");
    } else {
        output.message("Not logged in.");
    }
    Ok(())
}

pub async fn whoami(ctx: &Context, output: &Output) -> Result<()> {
    let session = ctx.require_session().await?;
    output.print_user(&session.user);
    Ok(())
}
