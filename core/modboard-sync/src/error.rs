//! Error types for the sync layer.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The backend could not be reached (connect failure, timeout).
    /// Never shown to the user.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The backend answered 401, or a protected call was made without a
    /// credential. The session has been cleared.
    #[error("unauthorized")]
    Unauthorized,

    /// The backend answered with a failure status or `success: false`.
    #[error("server rejected request ({status}): {message}")]
    ServerRejected { status: u16, message: String },

    /// The session holds no credential to authenticate with.
    #[error("no session credential")]
    MissingCredential,

    /// Login was refused.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Response or frame did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (session file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,

    /// The screen binding was unmounted before the operation completed.
    #[error("screen binding is unmounted")]
    Unmounted,
}

impl SyncError {
    /// HTTP status carried by the failure, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ServerRejected { status, .. } => Some(*status),
            Self::Unauthorized => Some(401),
            _ => None,
        }
    }

    /// Whether the failure should be surfaced to the user.
    ///
    /// Network outages are suppressed, and an unauthorized response is
    /// handled as a forced logout rather than an error message.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::ServerRejected { .. }
                | Self::InvalidCredentials(_)
                | Self::Protocol(_)
                | Self::Serialization(_)
                | Self::Io(_)
        )
    }

    /// Whether the caller should treat this as a forced logout.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::MissingCredential)
    }
}

impl From<modboard_types::Error> for SyncError {
    fn from(err: modboard_types::Error) -> Self {
        match err {
            modboard_types::Error::Serialization(e) => Self::Serialization(e),
            other => Self::Protocol(other.to_string()),
        }
    }
}
