//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/murmur/config.toml)
//! 3. Environment variables (MURMUR_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix
const ENV_PREFIX: &str = "MURMUR";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the chat server (http or https)
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Directory for local state (session token, logs)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log file for the live view (defaults to {data_dir}/debug.log)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// How long a transient notification stays visible
    #[serde(default = "default_toast_secs")]
    pub toast_secs: u64,

    /// First delay before reconnecting the push channel
    #[serde(default = "default_reconnect_initial_secs")]
    pub reconnect_initial_secs: u64,

    /// Upper bound for the reconnect backoff
    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_secs: u64,

    /// Timeout applied to every HTTP request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            data_dir: default_data_dir(),
            log_file: None,
            toast_secs: default_toast_secs(),
            reconnect_initial_secs: default_reconnect_initial_secs(),
            reconnect_max_secs: default_reconnect_max_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Config {
    /// Keys accepted by [`Config::set`]
    pub const KEYS: &'static [&'static str] = &[
        "server_url",
        "data_dir",
        "log_file",
        "toast_secs",
        "reconnect_initial_secs",
        "reconnect_max_secs",
        "request_timeout_secs",
    ];

    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (MURMUR_SERVER_URL, MURMUR_DATA_DIR, MURMUR_LOG_FILE)
    /// 2. Config file (~/.config/murmur/config.toml or MURMUR_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration, preferring an explicit path from the command line
    pub fn load_with_cli_override(config_path: Option<&PathBuf>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_SERVER_URL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.server_url = val;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        // Empty string clears it
        if let Ok(val) = std::env::var(format!("{}_LOG_FILE", ENV_PREFIX)) {
            self.log_file = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }
    }

    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Set a value by key, as accepted by `murmur config set`
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let seconds = |value: &str| -> Result<u64> {
            value
                .parse()
                .with_context(|| format!("Invalid value for {}: expected whole seconds", key))
        };

        match key {
            "server_url" => {
                if !value.starts_with("http://") && !value.starts_with("https://") {
                    bail!("server_url must start with http:// or https://");
                }
                self.server_url = value.trim_end_matches('/').to_string();
            }
            "data_dir" => self.data_dir = PathBuf::from(value),
            "log_file" => {
                self.log_file = if value.is_empty() || value == "none" {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "toast_secs" => self.toast_secs = seconds(value)?,
            "reconnect_initial_secs" => self.reconnect_initial_secs = seconds(value)?,
            "reconnect_max_secs" => self.reconnect_max_secs = seconds(value)?,
            "request_timeout_secs" => self.request_timeout_secs = seconds(value)?,
            _ => bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: {}",
                key,
                Self::KEYS.join(", ")
            ),
        }
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with MURMUR_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("murmur")
            .join("config.toml")
    }

    /// Path of the persisted session token
    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    /// Log file used by the live view
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("debug.log"))
    }

    /// Push channel URL derived from the server URL
    ///
    /// `http` becomes `ws` and `https` becomes `wss`; the path is `/ws`.
    pub fn push_url(&self) -> String {
        let base = self.server_url.trim_end_matches('/');
        let ws = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/ws", ws)
    }

    pub fn toast_duration(&self) -> Duration {
        Duration::from_secs(self.toast_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Backoff bounds for push channel reconnection
    pub fn reconnect_delays(&self) -> (Duration, Duration) {
        let initial = Duration::from_secs(self.reconnect_initial_secs.max(1));
        let max = Duration::from_secs(self.reconnect_max_secs).max(initial);
        (initial, max)
    }
}

fn default_server_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("murmur")
}

fn default_toast_secs() -> u64 {
    3
}

fn default_reconnect_initial_secs() -> u64 {
    1
}

fn default_reconnect_max_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &["MURMUR_SERVER_URL", "MURMUR_DATA_DIR", "MURMUR_LOG_FILE"];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server_url, "http://127.0.0.1:8000");
        assert!(config.log_file.is_none());
        assert!(config.data_dir.ends_with("murmur"));
        assert_eq!(config.toast_secs, 3);
    }

    #[test]
    fn test_file_paths() {
        let config = Config::default();
        assert!(config.session_path().ends_with("session.json"));
        assert!(config.log_path().ends_with("debug.log"));
    }

    #[test]
    fn test_push_url() {
        let mut config = Config::default();
        assert_eq!(config.push_url(), "ws://127.0.0.1:8000/ws");

        config.server_url = "https://chat.example.com/".to_string();
        assert_eq!(config.push_url(), "wss://chat.example.com/ws");
    }

    #[test]
    fn test_reconnect_delays_are_clamped() {
        let mut config = Config::default();
        config.reconnect_initial_secs = 0;
        config.reconnect_max_secs = 0;

        let (initial, max) = config.reconnect_delays();
        assert_eq!(initial, Duration::from_secs(1));
        assert_eq!(max, Duration::from_secs(1));
    }

    #[test]
    fn test_env_override_server_url() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("MURMUR_SERVER_URL", "http://10.0.0.2:9000");
        config.apply_env_overrides();
        assert_eq!(config.server_url, "http://10.0.0.2:9000");

        // Empty value keeps the current URL
        env::set_var("MURMUR_SERVER_URL", "");
        config.apply_env_overrides();
        assert_eq!(config.server_url, "http://10.0.0.2:9000");
    }

    #[test]
    fn test_env_override_data_dir_and_log_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("MURMUR_DATA_DIR", "/tmp/murmur-test");
        env::set_var("MURMUR_LOG_FILE", "/tmp/murmur.log");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/murmur-test"));
        assert_eq!(config.log_path(), PathBuf::from("/tmp/murmur.log"));

        env::set_var("MURMUR_LOG_FILE", "");
        config.apply_env_overrides();
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            server_url = "http://example.com:8000"
            data_dir = "/custom/data"
            toast_secs = 5
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.server_url, "http://example.com:8000");
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.toast_duration(), Duration::from_secs(5));
        assert_eq!(config.reconnect_max_secs, 30);
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            server_url: "https://chat.example.com".to_string(),
            data_dir: PathBuf::from("/data/murmur"),
            ..Config::default()
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("server_url"));
        assert!(toml_str.contains("data_dir"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.server_url, config.server_url);
        assert_eq!(parsed.data_dir, config.data_dir);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        env::set_var("MURMUR_DATA_DIR", temp_dir.path().join("data"));

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.server_url, "http://127.0.0.1:8000");
        assert!(config.data_dir.exists());
    }

    #[test]
    fn test_set_values() {
        let mut config = Config::default();
        config.set("server_url", "https://chat.example.com/").unwrap();
        config.set("toast_secs", "7").unwrap();
        config.set("log_file", "/tmp/m.log").unwrap();
        assert_eq!(config.server_url, "https://chat.example.com");
        assert_eq!(config.toast_secs, 7);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/m.log")));

        config.set("log_file", "none").unwrap();
        assert!(config.log_file.is_none());

        assert!(config.set("server_url", "ftp://nope").is_err());
        assert!(config.set("toast_secs", "soon").is_err());
        let err = config.set("colour", "blue").unwrap_err();
        assert!(err.to_string().contains("Valid keys"));
    }

    #[test]
    fn test_save_to_path_round_trip() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.data_dir = temp_dir.path().join("data");
        config.reconnect_max_secs = 12;
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_with_cli_override(Some(&path)).unwrap();
        assert_eq!(loaded.reconnect_max_secs, 12);
        assert_eq!(loaded.data_dir, temp_dir.path().join("data"));
    }
}
