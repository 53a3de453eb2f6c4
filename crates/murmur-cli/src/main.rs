//! murmur CLI
//!
//! Command-line client for murmur - real-time direct messages.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

use murmur_core::Config;

mod commands;
mod logging;
mod output;

use commands::Context;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "murmur")]
#[command(about = "murmur - real-time direct messages")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and log in (password is read from stdin)
    Register {
        /// Username (3-20 characters, no spaces)
        username: String,
    },
    /// Log in (password is read from stdin)
    Login { username: String },
    /// Forget the saved session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// List friends
    Friends,
    /// Add a friend by username
    AddFriend { username: String },
    /// List conversations
    #[command(alias = "conversations")]
    Dms,
    /// Show a conversation's history
    History {
        /// Peer username or conversation id
        with: String,
    },
    /// Send a message
    Send {
        /// Peer username or conversation id
        to: String,
        /// Message text
        #[arg(required = true, trailing_var_arg = true)]
        message: Vec<String>,
    },
    /// Change account settings
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },
    /// Live view: follow conversations as they happen
    Watch {
        /// Conversation to open (peer username or conversation id)
        with: Option<String>,
    },
    /// Show server and session status
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Change username
    Username { new_username: String },
    /// Change password (both passwords are read from stdin)
    Password,
    /// Set the avatar from an image file
    Avatar {
        /// png, jpg, gif or webp image
        #[arg(required_unless_present = "clear")]
        file: Option<PathBuf>,
        /// Remove the avatar instead
        #[arg(long, conflicts_with = "file")]
        clear: bool,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (server_url, data_dir, log_file, toast_secs, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // The live view logs to a file instead
    if !matches!(cli.command, Commands::Watch { .. }) {
        logging::init_stderr();
    }

    // Commands that don't talk to the server
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), cli.config.as_ref(), &output);
    }

    let config = Config::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    let ctx = Context::new(config)?;

    match cli.command {
        Commands::Register { username } => commands::auth::register(&ctx, username, &output).await,
        Commands::Login { username } => commands::auth::login(&ctx, username, &output).await,
        Commands::Logout => commands::auth::logout(&ctx, &output),
        Commands::Whoami => commands::auth::whoami(&ctx, &output).await,
        Commands::Friends => commands::friends::list(&ctx, &output).await,
        Commands::AddFriend { username } => commands::friends::add(&ctx, username, &output).await,
        Commands::Dms => commands::friends::conversations(&ctx, &output).await,
        Commands::History { with } => commands::messages::history(&ctx, with, &output).await,
        Commands::Send { to, message } => {
            commands::messages::send(&ctx, to, message, &output).await
        }
        Commands::Account { command } => handle_account_command(command, &ctx, &output).await,
        Commands::Watch { with } => commands::watch::run(&ctx, with, &output).await,
        Commands::Status => commands::status::show(&ctx, &output).await,
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

async fn handle_account_command(
    command: AccountCommands,
    ctx: &Context,
    output: &Output,
) -> Result<()> {
    match command {
        AccountCommands::Username { new_username } => {
            commands::account::username(ctx, new_username, output).await
        }
        AccountCommands::Password => commands::account::password(ctx, output).await,
        AccountCommands::Avatar { file, clear } => {
            let file = if clear { None } else { file };
            commands::account::avatar(ctx, file.as_deref(), output).await
        }
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}
