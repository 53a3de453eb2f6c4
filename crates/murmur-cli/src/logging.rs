//! Logging setup
//!
//! Nothing is logged unless `MURMUR_LOG` is set (e.g. `MURMUR_LOG=debug`).
//! One-shot commands log to stderr; the live view logs to a file so log
//! lines never interleave with the conversation.

use std::fs::OpenOptions;

use tracing::info;
use tracing_subscriber::EnvFilter;

use murmur_core::Config;

const LOG_ENV: &str = "MURMUR_LOG";

fn directives(level: &str) -> String {
    format!("murmur_core={level},murmur_cli={level}", level = level.trim())
}

/// Log to stderr for one-shot commands
pub fn init_stderr() {
    let Ok(level) = std::env::var(LOG_ENV) else {
        return;
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directives(&level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Log to the configured file for the live view
pub fn init_file(config: &Config) {
    let Ok(level) = std::env::var(LOG_ENV) else {
        return;
    };

    let log_path = config.log_path();
    let log_file = match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
            return;
        }
    };

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directives(&level)))
        .with_target(false)
        .with_ansi(false)
        .with_writer(log_file)
        .try_init();

    info!("Live view logging to {:?}", log_path);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_scope_both_crates() {
        assert_eq!(directives("debug"), "murmur_core=debug,murmur_cli=debug");
        assert_eq!(directives(" warn\n"), "murmur_core=warn,murmur_cli=warn");
    }
}
