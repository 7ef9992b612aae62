//! Error types for gateway requests

/// Outcome of a failed gateway request.
///
/// `Clone` because one refresh failure is delivered to every request queued
/// behind that refresh.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Server answered with a non-2xx status. Passed through unmodified
    /// except for 401s the gateway could recover from.
    #[error("{path} returned {status}: {body}")]
    Status {
        status: u16,
        path: String,
        body: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("no refresh token stored, session cannot be renewed")]
    NoRefreshToken,

    #[error("token refresh failed: {0}")]
    Refresh(#[source] session_auth::Error),

    #[error("refresh cycle ended before the queued request was replayed")]
    RefreshAborted,

    #[error("request rejected by server: {0}")]
    Rejected(String),

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// HTTP status carried by this error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the server denied authorization (401).
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Whether this error ended the session (refresh could not complete).
    pub fn is_session_expired(&self) -> bool {
        matches!(
            self,
            Error::NoRefreshToken | Error::Refresh(_) | Error::RefreshAborted
        )
    }
}

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;
