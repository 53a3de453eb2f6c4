//! Command handlers

pub mod account;
pub mod auth;
pub mod config;
pub mod friends;
pub mod messages;
pub mod status;
pub mod watch;

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};

use murmur_core::{ApiClient, Config, Session, SessionStore, TokenFile};

/// What every server-facing command needs
pub struct Context {
    pub config: Config,
    pub client: Arc<ApiClient>,
    pub session: Arc<SessionStore>,
    pub token_file: TokenFile,
}

impl Context {
    pub fn new(config: Config) -> Result<Self> {
        let client = ApiClient::from_config(&config)
            .with_context(|| format!("Invalid server URL: {}", config.server_url))?;
        let token_file = TokenFile::new(config.session_path());
        Ok(Self {
            config,
            client: Arc::new(client),
            session: Arc::new(SessionStore::new()),
            token_file,
        })
    }

    /// Resume the saved session or fail with a hint to log in
    pub async fn require_session(&self) -> Result<Session> {
        match self
            .session
            .resume(self.client.as_ref(), &self.token_file)
            .await
        {
            Ok(Some(session)) => Ok(session),
            Ok(None) => bail!("Not logged in. Run `murmur login <username>` first."),
            Err(e) if e.is_auth() => {
                bail!("Session expired. Run `murmur login <username>` again.")
            }
            Err(e) => Err(e).context("Could not reach the server"),
        }
    }
}

/// Ask for a value on stderr and read one line from stdin
pub fn prompt(label: &str) -> Result<String> {
    eprint!("{}: ", label);
    io::stderr().flush()?;

    let mut input = String::new();
    let read = io::stdin().lock().read_line(&mut input)?;
    if read == 0 {
        bail!("No input for {}", label.to_lowercase());
    }
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}
