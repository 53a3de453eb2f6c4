//! Error handling
//!
//! Typed errors for requests against the chat server and the push channel.
//! Every failure falls into one of four classes:
//! - transport: recoverable, handled inside the sync engine
//! - authentication: session-fatal, the session is cleared
//! - validation/business: local to the action that triggered it
//! - malformed push payloads: dropped where they are detected (never an `ApiError`)

use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by the snapshot fetcher, mutation client and push channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Request never produced a response (DNS, refused, reset, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Push channel closed or could not be opened
    #[error("Push channel closed: {0}")]
    ChannelClosed(String),

    /// Token rejected by the server
    #[error("{0}")]
    Unauthorized(String),

    /// Resource or user does not exist
    #[error("{0}")]
    NotFound(String),

    /// Conflicting state, e.g. a username that is already taken
    #[error("{0}")]
    Conflict(String),

    /// Any other non-2xx response; the message is the server's `detail`
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// Input rejected before it was sent
    #[error("{0}")]
    Invalid(String),

    /// Response body did not match the expected shape
    #[error("Unexpected response from server: {0}")]
    Decode(String),
}

impl ApiError {
    /// Classify a non-2xx response
    ///
    /// `detail` is the human-readable message from the response body and is
    /// kept verbatim for display.
    pub fn from_status(status: StatusCode, detail: Option<String>) -> Self {
        let message = detail.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });

        match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized(message),
            StatusCode::NOT_FOUND => ApiError::NotFound(message),
            StatusCode::CONFLICT => ApiError::Conflict(message),
            _ => ApiError::Rejected {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Token was rejected; the session must be torn down
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// Failure of the transport rather than of the request itself
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::ChannelClosed(_) => true,
            ApiError::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::from_status(status, None)
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ApiError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            // Closing before accept turns the upgrade into a 403
            WsError::Http(response) if matches!(response.status().as_u16(), 401 | 403) => {
                ApiError::Unauthorized("Unauthorized".to_string())
            }
            other => ApiError::ChannelClosed(other.to_string()),
        }
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
