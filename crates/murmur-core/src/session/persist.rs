//! Session token persistence
//!
//! The token is the only state kept across restarts. It is stored as a small
//! JSON object in `{data_dir}/session.json`. A missing or unreadable file
//! means "no session"; it is never an error.
//!
//! Uses atomic writes (write to temp file, then rename) to prevent corruption.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Errors that can occur while writing or removing the token file
#[derive(Error, Debug)]
pub enum PersistError {
    /// Failed to write the token file
    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to delete the token file
    #[error("Failed to remove '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    token: String,
}

/// The persisted session token
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored token
    ///
    /// Returns `None` when the file is absent, unreadable or corrupt.
    pub fn load(&self) -> Option<String> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Ignoring unreadable session file {:?}: {}", self.path, e);
                return None;
            }
        };

        match serde_json::from_str::<StoredSession>(&content) {
            Ok(stored) if !stored.token.trim().is_empty() => Some(stored.token),
            Ok(_) => None,
            Err(e) => {
                warn!("Ignoring corrupt session file {:?}: {}", self.path, e);
                None
            }
        }
    }

    pub fn save(&self, token: &str) -> Result<(), PersistError> {
        let json = serde_json::to_vec(&StoredSession {
            token: token.to_string(),
        })?;
        atomic_write(&self.path, &json).map_err(|source| PersistError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Remove the stored token; a missing file is fine
    pub fn remove(&self) -> Result<(), PersistError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Same directory so the rename stays atomic
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;

    fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_no_session() {
        let temp_dir = TempDir::new().unwrap();
        let file = TokenFile::new(temp_dir.path().join("session.json"));
        assert!(file.load().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let file = TokenFile::new(temp_dir.path().join("nested").join("session.json"));

        file.save("tok-123").unwrap();
        assert_eq!(file.load().as_deref(), Some("tok-123"));

        let raw = fs::read_to_string(file.path()).unwrap();
        assert_eq!(raw, r#"{"token":"tok-123"}"#);
        assert!(!file.path().with_extension("tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_no_session() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");

        fs::write(&path, "{not json").unwrap();
        assert!(TokenFile::new(&path).load().is_none());

        fs::write(&path, r#"{"token":"  "}"#).unwrap();
        assert!(TokenFile::new(&path).load().is_none());

        fs::write(&path, r#""bare-string""#).unwrap();
        assert!(TokenFile::new(&path).load().is_none());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let file = TokenFile::new(temp_dir.path().join("session.json"));

        file.save("tok").unwrap();
        file.remove().unwrap();
        assert!(file.load().is_none());
        file.remove().unwrap();
    }
}
