//! Session lifecycle
//!
//! The [`SessionStore`] holds the current token and the identity the server
//! confirmed for it. It is an explicit context object: components that need
//! the session get an `Arc<SessionStore>` and subscribe to its changes
//! instead of reading ambient globals.
//!
//! Every establish/clear that changes the session bumps a monotonic epoch.
//! Asynchronous work captures the epoch it started under and checks it with
//! [`SessionStore::is_current`] before touching shared state.

mod persist;

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::{info, warn};

pub use persist::{PersistError, TokenFile};

use crate::api::SnapshotFetcher;
use crate::error::ApiResult;
use crate::models::User;

/// One authenticated login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque bearer token
    pub token: String,
    /// Our identity as confirmed by the server
    pub user: User,
    /// Epoch this session was established under
    pub epoch: u64,
}

/// Owner of the token and authenticated identity
#[derive(Debug)]
pub struct SessionStore {
    state: watch::Sender<Option<Session>>,
    epoch: AtomicU64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create an empty store (no session, epoch 0)
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            state,
            epoch: AtomicU64::new(0),
        }
    }

    /// Install a token and its confirmed identity
    ///
    /// Calling this again with the same token keeps the session (and its
    /// epoch) and only refreshes the identity. A different token starts a new
    /// epoch and dependents re-initialise. Returns the session's epoch.
    pub fn establish(&self, token: impl Into<String>, user: User) -> u64 {
        let token = token.into();
        let mut epoch = 0;

        self.state.send_if_modified(|current| {
            if let Some(session) = current.as_mut() {
                if session.token == token {
                    epoch = session.epoch;
                    if session.user == user {
                        return false;
                    }
                    session.user = user.clone();
                    return true;
                }
            }

            epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            info!("Session established for {} (epoch {})", user.username, epoch);
            *current = Some(Session {
                token: token.clone(),
                user: user.clone(),
                epoch,
            });
            true
        });

        epoch
    }

    /// Drop the session; dependents tear down their per-session state
    ///
    /// Safe to call repeatedly. Returns whether a session was present.
    pub fn clear(&self) -> bool {
        self.state.send_if_modified(|current| {
            let Some(session) = current.take() else {
                return false;
            };
            let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            info!(
                "Session for {} cleared (epoch {})",
                session.user.username, epoch
            );
            true
        })
    }

    /// The present session, if any
    pub fn current(&self) -> Option<Session> {
        self.state.borrow().clone()
    }

    /// Token of the present session
    pub fn token(&self) -> Option<String> {
        self.state.borrow().as_ref().map(|s| s.token.clone())
    }

    /// Latest epoch; bumped on every establish/clear that changed the session
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Whether `epoch` still names the live session
    pub fn is_current(&self, epoch: u64) -> bool {
        self.state
            .borrow()
            .as_ref()
            .is_some_and(|session| session.epoch == epoch)
    }

    /// Watch session changes
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.state.subscribe()
    }

    /// Confirm a token with the server and establish it
    ///
    /// Any failure clears the store: a token that could not be confirmed never
    /// lingers as the current session.
    pub async fn confirm<F: SnapshotFetcher>(&self, fetcher: &F, token: &str) -> ApiResult<Session> {
        match fetcher.me(token).await {
            Ok(user) => {
                self.establish(token, user);
                self.current().ok_or_else(|| {
                    crate::error::ApiError::Unauthorized("Session cleared".to_string())
                })
            }
            Err(e) => {
                warn!("Identity confirmation failed: {}", e);
                self.clear();
                Err(e)
            }
        }
    }

    /// Resume the persisted session, if there is one
    ///
    /// A token the server rejects is also removed from disk. A token that
    /// could not be checked because of a transport failure is kept on disk
    /// for the next attempt, but the store is still left cleared.
    pub async fn resume<F: SnapshotFetcher>(
        &self,
        fetcher: &F,
        file: &TokenFile,
    ) -> ApiResult<Option<Session>> {
        let Some(token) = file.load() else {
            return Ok(None);
        };

        match self.confirm(fetcher, &token).await {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                if e.is_auth() {
                    if let Err(remove_err) = file.remove() {
                        warn!("Could not remove rejected session: {}", remove_err);
                    }
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::testing::FakeServer;
    use tempfile::TempDir;

    fn alice() -> User {
        User::new("u1", "alice")
    }

    #[test]
    fn test_establish_and_current() {
        let store = SessionStore::new();
        assert!(store.current().is_none());
        assert_eq!(store.epoch(), 0);

        let epoch = store.establish("tok", alice());
        let session = store.current().unwrap();
        assert_eq!(session.token, "tok");
        assert_eq!(session.user.username, "alice");
        assert_eq!(session.epoch, epoch);
        assert!(store.is_current(epoch));
    }

    #[test]
    fn test_establish_same_token_is_idempotent() {
        let store = SessionStore::new();
        let mut rx = store.subscribe();

        let first = store.establish("tok", alice());
        rx.borrow_and_update();

        let second = store.establish("tok", alice());
        assert_eq!(first, second);
        assert!(!rx.has_changed().unwrap());

        // Renamed identity refreshes without a new epoch
        let third = store.establish("tok", User::new("u1", "alice2"));
        assert_eq!(first, third);
        assert!(rx.has_changed().unwrap());
        assert_eq!(store.current().unwrap().user.username, "alice2");
    }

    #[test]
    fn test_new_token_starts_new_epoch() {
        let store = SessionStore::new();
        let first = store.establish("tok-1", alice());
        let second = store.establish("tok-2", alice());
        assert!(second > first);
        assert!(!store.is_current(first));
        assert!(store.is_current(second));
    }

    #[test]
    fn test_clear_is_safe_to_repeat() {
        let store = SessionStore::new();
        let epoch = store.establish("tok", alice());

        assert!(store.clear());
        assert!(store.current().is_none());
        assert!(!store.is_current(epoch));
        let after_clear = store.epoch();

        assert!(!store.clear());
        assert_eq!(store.epoch(), after_clear);
    }

    #[tokio::test]
    async fn test_confirm_establishes_session() {
        let server = FakeServer::new(alice());
        let store = SessionStore::new();

        let session = store.confirm(&server, FakeServer::TOKEN).await.unwrap();
        assert_eq!(session.user.id, "u1");
        assert!(store.current().is_some());
    }

    #[tokio::test]
    async fn test_failed_confirmation_clears_session() {
        let server = FakeServer::new(alice());
        let store = SessionStore::new();
        store.establish(FakeServer::TOKEN, alice());

        let err = store.confirm(&server, "bogus").await.unwrap_err();
        assert!(err.is_auth());
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn test_resume_removes_rejected_token() {
        let temp_dir = TempDir::new().unwrap();
        let file = TokenFile::new(temp_dir.path().join("session.json"));
        file.save("bogus").unwrap();

        let server = FakeServer::new(alice());
        let store = SessionStore::new();

        let err = store.resume(&server, &file).await.unwrap_err();
        assert!(err.is_auth());
        assert!(file.load().is_none());
    }

    #[tokio::test]
    async fn test_resume_keeps_token_on_network_failure() {
        let temp_dir = TempDir::new().unwrap();
        let file = TokenFile::new(temp_dir.path().join("session.json"));
        file.save(FakeServer::TOKEN).unwrap();

        let server = FakeServer::new(alice());
        server.fail_next_me(ApiError::Network("connection refused".into()));
        let store = SessionStore::new();

        let err = store.resume(&server, &file).await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.current().is_none());
        assert!(file.load().is_some());
    }

    #[tokio::test]
    async fn test_resume_without_file_is_no_session() {
        let temp_dir = TempDir::new().unwrap();
        let file = TokenFile::new(temp_dir.path().join("session.json"));
        let server = FakeServer::new(alice());

        let store = SessionStore::new();
        assert!(store.resume(&server, &file).await.unwrap().is_none());
    }
}
