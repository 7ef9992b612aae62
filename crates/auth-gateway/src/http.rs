//! reqwest-backed transport and refresh endpoint

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use common::Secret;
use reqwest::Url;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use session_auth::Tokens;

use crate::error::{Error, Result};
use crate::request::{ApiRequest, ApiResponse};
use crate::{RefreshEndpoint, Transport};

/// Build the shared client. `timeout` bounds every request end to end,
/// refresh calls included.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Transport(format!("building http client: {e}")))
}

fn map_send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Transport(e.to_string())
    }
}

/// Sends gateway requests to the API server.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl Transport for HttpTransport {
    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>> {
        Box::pin(async move {
            let url = session_auth::endpoint_url(&self.base_url, &request.path)
                .map_err(|e| Error::InvalidRequest(e.to_string()))?;

            let mut builder = self
                .client
                .request(request.method.clone(), url)
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .header(ACCEPT, HeaderValue::from_static("application/json"))
                .headers(request.headers.clone());
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(map_send_error)?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(map_send_error)?;

            Ok(ApiResponse {
                status,
                headers,
                body,
            })
        })
    }
}

/// Calls `POST api/auth/refresh-token` directly, bypassing the gateway.
#[derive(Clone)]
pub struct HttpRefreshEndpoint {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpRefreshEndpoint {
    pub fn new(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }
}

impl RefreshEndpoint for HttpRefreshEndpoint {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
        csrf_token: Option<&'a Secret<String>>,
    ) -> Pin<Box<dyn Future<Output = session_auth::Result<Tokens>> + Send + 'a>> {
        Box::pin(async move {
            let csrf = csrf_token.map(|token| token.expose().as_str());
            session_auth::refresh_tokens(&self.client, &self.base_url, refresh_token, csrf)
                .await
                .map(|response| response.tokens)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Gateway;
    use axum::Json;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use serde_json::json;
    use session_auth::{CredentialStore, MemoryCredentialStore};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    async fn serve(router: axum::Router) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    /// Echo server returning the request's headers and body as JSON.
    fn echo_router() -> axum::Router {
        axum::Router::new().fallback(|request: axum::http::Request<axum::body::Body>| async move {
            let mut headers = serde_json::Map::new();
            for (name, value) in request.headers() {
                headers.insert(
                    name.to_string(),
                    json!(value.to_str().unwrap_or_default()),
                );
            }
            let method = request.method().to_string();
            let path = request.uri().path().to_string();
            let body = axum::body::to_bytes(request.into_body(), 1024 * 1024)
                .await
                .unwrap();
            Json(json!({
                "headers": headers,
                "method": method,
                "path": path,
                "body": String::from_utf8_lossy(&body),
            }))
        })
    }

    #[tokio::test]
    async fn transport_sends_json_with_default_headers() {
        let base = serve(echo_router()).await;
        let transport = HttpTransport::new(reqwest::Client::new(), base);

        let request = ApiRequest::post("api/events", json!({ "name": "launch" }));
        let response = transport.send(&request).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);

        let echoed: serde_json::Value = response.json().unwrap();
        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["path"], "/api/events");
        assert_eq!(echoed["headers"]["content-type"], "application/json");
        assert_eq!(echoed["headers"]["accept"], "application/json");
        assert_eq!(echoed["body"], r#"{"name":"launch"}"#);
    }

    #[tokio::test]
    async fn transport_reports_error_statuses_as_responses() {
        let router = axum::Router::new().route(
            "/api/missing",
            get(|| async { (StatusCode::NOT_FOUND, "nope") }),
        );
        let base = serve(router).await;
        let transport = HttpTransport::new(reqwest::Client::new(), base);

        let response = transport.send(&ApiRequest::get("api/missing")).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.text(), "nope");
    }

    #[tokio::test]
    async fn transport_maps_timeout() {
        let router = axum::Router::new().route(
            "/api/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                "late"
            }),
        );
        let base = serve(router).await;
        let client = build_client(Duration::from_millis(50)).unwrap();
        let transport = HttpTransport::new(client, base);

        let err = transport.send(&ApiRequest::get("api/slow")).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn decorated_headers_reach_the_wire() {
        let base = serve(echo_router()).await;
        let store = Arc::new(MemoryCredentialStore::with_tokens("at_wire", "rt_wire"));
        let gateway = Gateway::http(base, Duration::from_secs(5), store, Arc::new(|| {})).unwrap();
        gateway.set_csrf_token("csrf-wire".into());

        let response = gateway.execute(ApiRequest::get("api/me")).await.unwrap();
        let echoed: serde_json::Value = response.json().unwrap();
        assert_eq!(echoed["headers"]["authorization"], "Bearer at_wire");
        assert_eq!(echoed["headers"]["x-csrf-token"], "csrf-wire");
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_end_to_end() {
        let refresh_calls = Arc::new(AtomicUsize::new(0));
        let counter = refresh_calls.clone();
        let router = axum::Router::new()
            .route(
                "/api/auth/refresh-token",
                post(move |Json(body): Json<serde_json::Value>| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(body["refreshToken"], "rt_1");
                        Json(json!({
                            "tokens": {
                                "access": { "token": "at_2", "expires": "" },
                                "refresh": { "token": "rt_2", "expires": "" }
                            }
                        }))
                    }
                }),
            )
            .route(
                "/api/events",
                get(|headers: HeaderMap| async move {
                    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                        Some("Bearer at_2") => (StatusCode::OK, "[]"),
                        _ => (StatusCode::UNAUTHORIZED, "token expired"),
                    }
                }),
            );
        let base = serve(router).await;
        let store = Arc::new(MemoryCredentialStore::with_tokens("at_1", "rt_1"));
        let gateway =
            Gateway::http(base, Duration::from_secs(5), store.clone(), Arc::new(|| {})).unwrap();

        let response = gateway.execute(ApiRequest::get("api/events")).await.unwrap();
        assert_eq!(response.text(), "[]");
        assert_eq!(refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.access_token().unwrap().expose(), "at_2");
        assert_eq!(store.refresh_token().unwrap().expose(), "rt_2");
    }

    #[tokio::test]
    async fn refresh_endpoint_rejection_clears_session() {
        let invalidated = Arc::new(AtomicUsize::new(0));
        let hook_counter = invalidated.clone();
        let router = axum::Router::new()
            .route(
                "/api/auth/refresh-token",
                post(|| async { (StatusCode::UNAUTHORIZED, "refresh token expired") }),
            )
            .route(
                "/api/events",
                get(|| async { (StatusCode::UNAUTHORIZED, "token expired") }),
            );
        let base = serve(router).await;
        let store = Arc::new(MemoryCredentialStore::with_tokens("at_1", "rt_1"));
        let gateway = Gateway::http(
            base,
            Duration::from_secs(5),
            store.clone(),
            Arc::new(move || {
                hook_counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        let err = gateway.execute(ApiRequest::get("api/events")).await.unwrap_err();
        assert!(
            matches!(err, Error::Refresh(session_auth::Error::InvalidCredentials(_))),
            "got: {err:?}"
        );
        assert_eq!(invalidated.load(Ordering::SeqCst), 1);
        assert!(store.access_token().is_none());
        assert!(store.refresh_token().is_none());
    }

    #[tokio::test]
    async fn refresh_call_carries_csrf_token() {
        let router = axum::Router::new()
            .route(
                "/api/auth/refresh-token",
                post(|headers: HeaderMap| async move {
                    if headers.get("x-csrf-token").and_then(|v| v.to_str().ok()) != Some("csrf-1") {
                        return (StatusCode::FORBIDDEN, Json(json!({ "message": "invalid csrf token" })));
                    }
                    (
                        StatusCode::OK,
                        Json(json!({
                            "tokens": {
                                "access": { "token": "at_2", "expires": "" },
                                "refresh": { "token": "rt_2", "expires": "" }
                            }
                        })),
                    )
                }),
            )
            .route(
                "/api/events",
                get(|headers: HeaderMap| async move {
                    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                        Some("Bearer at_2") => (StatusCode::OK, "[]"),
                        _ => (StatusCode::UNAUTHORIZED, "token expired"),
                    }
                }),
            );
        let base = serve(router).await;
        let store = Arc::new(MemoryCredentialStore::with_tokens("at_1", "rt_1"));
        let gateway =
            Gateway::http(base, Duration::from_secs(5), store.clone(), Arc::new(|| {})).unwrap();
        gateway.set_csrf_token("csrf-1".into());

        let response = gateway.execute(ApiRequest::get("api/events")).await.unwrap();
        assert_eq!(response.text(), "[]");
        assert_eq!(store.access_token().unwrap().expose(), "at_2");
    }

    #[tokio::test]
    async fn refresh_timeout_ends_session() {
        let invalidated = Arc::new(AtomicUsize::new(0));
        let hook_counter = invalidated.clone();
        let router = axum::Router::new()
            .route(
                "/api/auth/refresh-token",
                post(|| async {
                    tokio::time::sleep(Duration::from_millis(1000)).await;
                    "late"
                }),
            )
            .route(
                "/api/events",
                get(|| async { (StatusCode::UNAUTHORIZED, "token expired") }),
            );
        let base = serve(router).await;
        let store = Arc::new(MemoryCredentialStore::with_tokens("at_1", "rt_1"));
        let gateway = Gateway::http(
            base,
            Duration::from_millis(100),
            store.clone(),
            Arc::new(move || {
                hook_counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        let err = gateway.execute(ApiRequest::get("api/events")).await.unwrap_err();
        assert!(
            matches!(err, Error::Refresh(session_auth::Error::Http(_))),
            "got: {err:?}"
        );
        assert!(err.is_session_expired());
        assert_eq!(invalidated.load(Ordering::SeqCst), 1);
        assert!(store.access_token().is_none());
        assert!(store.refresh_token().is_none());
    }
}
