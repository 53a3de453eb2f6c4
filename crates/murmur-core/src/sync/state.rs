//! Engine lifecycle state and change notifications

use std::fmt;

/// Lifecycle of the engine for the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No session has been established yet
    Uninitialized,
    /// Session established, initial snapshot not settled yet
    Bootstrapping,
    /// Initial snapshot settled; push notifications are applied as they arrive
    Live,
    /// Push channel lost; waiting for a new channel and a fresh snapshot
    Reconnecting,
    /// Session cleared; model discarded
    TornDown,
}

impl EngineState {
    /// Whether a session is being served
    pub fn has_session(self) -> bool {
        matches!(
            self,
            EngineState::Bootstrapping | EngineState::Live | EngineState::Reconnecting
        )
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Bootstrapping => "bootstrapping",
            EngineState::Live => "live",
            EngineState::Reconnecting => "reconnecting",
            EngineState::TornDown => "torn down",
        };
        f.write_str(name)
    }
}

/// Published after the model changed
///
/// Subscribers re-read the model from the engine handle; events only say
/// what changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    StateChanged(EngineState),
    /// Our own identity was refreshed
    IdentityChanged,
    FriendsChanged,
    ConversationsChanged,
    MessagesChanged { dm_id: String },
    ViewChanged { dm_id: Option<String> },
    /// Transient notification shown (`Some`) or expired (`None`)
    Notice(Option<String>),
    /// Session ended; the model is empty again
    SessionEnded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_session() {
        assert!(!EngineState::Uninitialized.has_session());
        assert!(EngineState::Bootstrapping.has_session());
        assert!(EngineState::Reconnecting.has_session());
        assert!(!EngineState::TornDown.has_session());
    }

    #[test]
    fn test_display() {
        assert_eq!(EngineState::Live.to_string(), "live");
        assert_eq!(EngineState::TornDown.to_string(), "torn down");
    }
}
