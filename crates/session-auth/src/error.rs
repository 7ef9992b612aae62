//! Error types for session and auth endpoint operations

/// Errors from auth endpoint calls and credential persistence.
///
/// `Clone` so a single refresh failure can be handed to every request
/// waiting on that refresh.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid endpoint url: {0}")]
    Url(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
