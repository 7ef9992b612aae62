//! The shared authenticated client
//!
//! `execute` is the only entry point. Per request:
//! 1. Decorate with `Authorization: Bearer <access>` and `X-CSRF-Token`
//! 2. Send; non-401 outcomes are returned unmodified
//! 3. On 401, unless opted out or already retried, mark the request retried
//!    and hand it to the refresh coordinator
//! 4. Leader refreshes and hands the outcome to every queued caller in
//!    arrival order. On success each caller resubmits its own request with
//!    the new token, the leader last; on failure the queue is rejected,
//!    credentials are cleared and the session-invalidation hook fires

use std::sync::{Arc, RwLock};
use std::time::Duration;

use common::Secret;
use reqwest::Url;
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};
use session_auth::{CSRF_HEADER, CredentialStore};
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::http::{HttpRefreshEndpoint, HttpTransport, build_client};
use crate::metrics;
use crate::refresh::{Admission, RefreshCoordinator, RefreshState};
use crate::request::{ApiRequest, ApiResponse};
use crate::{RefreshEndpoint, SessionInvalidation, Transport};

/// Authenticated request gateway.
///
/// Holds no copy of the token pair: every send reads the credential store.
/// Share it behind an `Arc`; the refresh state is per instance.
pub struct Gateway {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
    refresher: Arc<dyn RefreshEndpoint>,
    on_refresh_failed: Arc<dyn SessionInvalidation>,
    csrf_token: RwLock<Option<Secret<String>>>,
    coordinator: RefreshCoordinator,
}

impl Gateway {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
        refresher: Arc<dyn RefreshEndpoint>,
        on_refresh_failed: Arc<dyn SessionInvalidation>,
    ) -> Self {
        Self {
            transport,
            credentials,
            refresher,
            on_refresh_failed,
            csrf_token: RwLock::new(None),
            coordinator: RefreshCoordinator::new(),
        }
    }

    /// Gateway talking HTTP to `base_url`, with one client (and so one
    /// timeout) shared by API calls and refresh calls.
    pub fn http(
        base_url: Url,
        timeout: Duration,
        credentials: Arc<dyn CredentialStore>,
        on_refresh_failed: Arc<dyn SessionInvalidation>,
    ) -> Result<Self> {
        let client = build_client(timeout)?;
        let transport = HttpTransport::new(client.clone(), base_url.clone());
        let refresher = HttpRefreshEndpoint::new(client, base_url);
        Ok(Self::new(
            Arc::new(transport),
            credentials,
            Arc::new(refresher),
            on_refresh_failed,
        ))
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.coordinator.state()
    }

    /// Requests currently waiting on a refresh.
    pub fn queued_requests(&self) -> usize {
        self.coordinator.queued()
    }

    /// Replace the anti-forgery token. Refresh cycles never touch it.
    pub fn set_csrf_token(&self, token: Secret<String>) {
        let token = (!token.is_blank()).then_some(token);
        *self.csrf_token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    pub fn csrf_token(&self) -> Option<Secret<String>> {
        self.csrf_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Attach the current credentials. Never fails: missing tokens leave the
    /// request undecorated and unencodable ones are skipped.
    pub fn decorate(&self, request: &mut ApiRequest) {
        let access = self.credentials.access_token();
        self.decorate_with(request, access.as_ref());
    }

    fn decorate_with(&self, request: &mut ApiRequest, access: Option<&Secret<String>>) {
        if let Some(token) = access {
            match HeaderValue::from_str(&format!("Bearer {}", token.expose())) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    request.headers.insert(AUTHORIZATION, value);
                }
                Err(e) => warn!(error = %e, "access token is not a valid header value, sending without it"),
            }
        }

        if let Some(csrf) = self.csrf_token() {
            match HeaderValue::from_str(csrf.expose()) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    request
                        .headers
                        .insert(HeaderName::from_static(CSRF_HEADER), value);
                }
                Err(e) => warn!(error = %e, "csrf token is not a valid header value, sending without it"),
            }
        }
    }

    /// Send a request, transparently recovering from an expired access token.
    ///
    /// The caller only ever sees the request's final outcome: the replayed
    /// response after a successful refresh, the refresh error after a failed
    /// one, or the original error for anything that is not a recoverable 401.
    #[instrument(skip_all, fields(request_id = %new_request_id(), method = %request.method, path = %request.path))]
    pub async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        let access = self.credentials.access_token();
        let denied = match self.dispatch(&request, access.as_ref()).await {
            Err(err) if err.is_unauthorized() => err,
            other => return other,
        };

        if request.skip_auth_refresh {
            debug!("request opted out of auth refresh, returning 401");
            return Err(denied);
        }
        if request.retried {
            debug!("request already retried after a refresh, returning 401");
            return Err(denied);
        }

        request.retried = true;
        self.recover(request).await
    }

    /// Decorate a copy of `request` and send it. Non-2xx becomes `Error::Status`.
    async fn dispatch(
        &self,
        request: &ApiRequest,
        access: Option<&Secret<String>>,
    ) -> Result<ApiResponse> {
        let mut outgoing = request.clone();
        self.decorate_with(&mut outgoing, access);

        let response = self.transport.send(&outgoing).await?;
        metrics::record_request(response.status.as_u16(), outgoing.method.as_str());

        if response.status.is_success() {
            Ok(response)
        } else {
            Err(Error::Status {
                status: response.status.as_u16(),
                path: outgoing.path,
                body: response.text(),
            })
        }
    }

    /// Join or lead the refresh cycle for a request that just got a 401.
    async fn recover(&self, request: ApiRequest) -> Result<ApiResponse> {
        let cycle = match self.coordinator.admit() {
            Admission::Queued(waiter) => {
                debug!("refresh already in flight, queued for replay");
                let access = waiter.await.unwrap_or(Err(Error::RefreshAborted))?;
                return self.dispatch(&request, Some(&access)).await;
            }
            Admission::Leader(cycle) => cycle,
        };

        debug!("access token rejected, refreshing");
        let outcome = self.refresh_access_token().await;
        let released = cycle.finish(&outcome);

        match outcome {
            Ok(access) => {
                metrics::record_refresh("success");
                metrics::record_replayed(released + 1);
                info!(queued = released, "token refresh succeeded, replaying requests");

                // Released waiters resubmit from their own tasks in arrival
                // order; yield once so the leader's replay goes out last.
                tokio::task::yield_now().await;
                self.dispatch(&request, Some(&access)).await
            }
            Err(err) => {
                metrics::record_refresh("failure");
                warn!(error = %err, queued = released, "token refresh failed, ending session");

                self.credentials.clear();
                self.on_refresh_failed.on_refresh_failed();
                Err(err)
            }
        }
    }

    /// Exchange the stored refresh token and write the new pair back.
    async fn refresh_access_token(&self) -> Result<Secret<String>> {
        let refresh = self
            .credentials
            .refresh_token()
            .ok_or(Error::NoRefreshToken)?;

        let csrf = self.csrf_token();
        let tokens = self
            .refresher
            .refresh(refresh.expose(), csrf.as_ref())
            .await
            .map_err(Error::Refresh)?;

        let access = tokens.access.token;
        if access.is_blank() {
            return Err(Error::Refresh(session_auth::Error::TokenExchange(
                "refresh response carried an empty access token".into(),
            )));
        }
        self.credentials.set_access_token(access.clone());
        if !tokens.refresh.token.is_blank() {
            self.credentials.set_refresh_token(tokens.refresh.token);
        }
        Ok(access)
    }
}

fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}
