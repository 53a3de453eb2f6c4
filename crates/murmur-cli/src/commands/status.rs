//! Status command handler

use anyhow::Result;

use murmur_core::Session;

use super::Context;
use crate::output::{Output, OutputFormat};

/// Show server reachability and session state
pub async fn show(ctx: &Context, output: &Output) -> Result<()> {
    let server = ctx.client.health().await;
    let has_token = ctx.token_file.load().is_some();

    // Only confirm the session when the server answered
    let session: Option<Session> = if server.is_ok() && has_token {
        ctx.session
            .resume(ctx.client.as_ref(), &ctx.token_file)
            .await
            .ok()
            .flatten()
    } else {
        None
    };

    let session_state = match (&session, has_token, server.is_ok()) {
        (Some(_), _, _) => "active",
        (None, false, _) => "logged out",
        (None, true, true) => "expired",
        (None, true, false) => "unverified",
    };

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "server_url": ctx.config.server_url,
                    "server_reachable": server.is_ok(),
                    "server_time": server.as_ref().ok().map(|h| h.ts),
                    "session": session_state,
                    "user": session.as_ref().map(|s| &s.user),
                    "session_file": ctx.token_file.path()
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", session_state);
        }
        OutputFormat::Human => {
            println!("murmur status");
            println!("=============");
            println!();
            println!("Server:");
            println!("  URL:    {}", ctx.config.server_url);
            match &server {
                Ok(health) if health.ok => println!("  Health: ok"),
                Ok(_) => println!("  Health: degraded"),
                Err(e) => println!("  Health: unreachable ({})", e),
            }
            println!();
            println!("Session:");
            println!("  State:  {}", session_state);
            if let Some(session) = &session {
                println!("  User:   {} ({})", session.user.username, session.user.id);
            }
            println!("  File:   {}", ctx.token_file.path().display());
        }
    }

    Ok(())
}
