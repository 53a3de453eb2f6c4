//! Config command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use murmur_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "server_url": config.server_url,
                    "push_url": config.push_url(),
                    "data_dir": config.data_dir,
                    "log_file": config.log_path(),
                    "toast_secs": config.toast_secs,
                    "reconnect_initial_secs": config.reconnect_initial_secs,
                    "reconnect_max_secs": config.reconnect_max_secs,
                    "request_timeout_secs": config.request_timeout_secs
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.server_url);
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  server_url:             {}", config.server_url);
            println!("  data_dir:               {}", config.data_dir.display());
            println!(
                "  log_file:               {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!("  toast_secs:             {}", config.toast_secs);
            println!("  reconnect_initial_secs: {}", config.reconnect_initial_secs);
            println!("  reconnect_max_secs:     {}", config.reconnect_max_secs);
            println!("  request_timeout_secs:   {}", config.request_timeout_secs);
            println!();
            println!("Push channel: {}", config.push_url());
            println!("Config file:  {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    config.set(&key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}
