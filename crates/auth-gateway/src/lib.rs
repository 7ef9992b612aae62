//! Authenticated request gateway
//!
//! One shared client for every API call. The gateway decorates outgoing
//! requests with the access token and anti-forgery token, and when a request
//! comes back 401 it runs a single refresh cycle for all concurrently failing
//! requests: the first failure refreshes, the rest queue, and on success every
//! queued caller is released in FIFO order to replay with the new token. On
//! refresh failure the whole batch is rejected, the credential store is
//! cleared and the session-invalidation hook fires.
//!
//! The gateway's collaborators sit behind traits so the refresh state machine
//! can be driven without a network:
//! - `Transport` sends a decorated request (`HttpTransport` in production)
//! - `RefreshEndpoint` exchanges a refresh token (`HttpRefreshEndpoint`)
//! - `SessionInvalidation` reacts to an unrecoverable session
//! - `session_auth::CredentialStore` holds the token pair

pub mod auth;
pub mod error;
pub mod gateway;
pub mod http;
pub mod metrics;
pub mod refresh;
pub mod request;

pub use error::{Error, Result};
pub use gateway::Gateway;
pub use http::{HttpRefreshEndpoint, HttpTransport};
pub use refresh::{RefreshCoordinator, RefreshState};
pub use request::{ApiRequest, ApiResponse};

use common::Secret;
use session_auth::Tokens;
use std::future::Future;
use std::pin::Pin;

/// Sends one already-decorated request and returns whatever the server said.
///
/// Implementations report every HTTP status as `Ok`; only transport-level
/// failures (connect, timeout, body read) are `Err`. The gateway decides
/// what a status means.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;
}

/// Exchanges a refresh token for a new token pair.
///
/// `csrf_token` is the gateway's current anti-forgery token, sent along like
/// on any other request. Any error, whatever its cause, ends the session.
pub trait RefreshEndpoint: Send + Sync {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
        csrf_token: Option<&'a Secret<String>>,
    ) -> Pin<Box<dyn Future<Output = session_auth::Result<Tokens>> + Send + 'a>>;
}

/// Called once per failed refresh cycle, after the credential store has been
/// cleared. Signals the rest of the process to leave authenticated areas.
pub trait SessionInvalidation: Send + Sync {
    fn on_refresh_failed(&self);
}

impl<F> SessionInvalidation for F
where
    F: Fn() + Send + Sync,
{
    fn on_refresh_failed(&self) {
        self()
    }
}
