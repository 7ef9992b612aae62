//! Auth API wire types and the token refresh call
//!
//! The refresh call goes straight to the server with its own request rather
//! than through the request gateway: a 401 from the refresh endpoint means
//! the refresh token is dead and must not start another refresh.

use common::Secret;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;

use crate::constants::{CSRF_HEADER, REFRESH_TOKEN_PATH};
use crate::error::{Error, Result};

/// One token with its server-reported expiry.
///
/// `expires` is passed through as the server formats it (an ISO-8601
/// timestamp); the client never expires tokens on its own clock.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenInfo {
    pub token: Secret<String>,
    #[serde(default)]
    pub expires: String,
}

/// Access/refresh pair as returned by login and refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct Tokens {
    pub access: TokenInfo,
    pub refresh: TokenInfo,
}

/// Body of a successful `POST api/auth/refresh-token`.
#[derive(Debug, Deserialize)]
pub struct RefreshTokensResponse {
    pub tokens: Tokens,
}

/// Envelope shared by auth endpoints that only report success.
#[derive(Debug, Deserialize)]
pub struct BaseResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// Body of `POST api/auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<LoginData>,
}

/// Payload of a successful login. The user profile is kept opaque.
#[derive(Debug, Deserialize)]
pub struct LoginData {
    #[serde(default)]
    pub user: Option<serde_json::Value>,
    pub tokens: Tokens,
}

/// Profile submitted to `POST api/auth/register`.
///
/// The password is kept out of this struct and only joins the body in
/// `to_body`, so the profile can be logged or cloned freely.
#[derive(Debug, Clone, PartialEq)]
pub struct SignupRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    /// Date of birth, `YYYY-MM-DD`
    pub dob: String,
    pub phone_number: String,
}

impl SignupRequest {
    /// JSON body in the server's camelCase field names.
    pub fn to_body(&self, password: &Secret<String>) -> serde_json::Value {
        json!({
            "email": self.email,
            "password": password.expose(),
            "firstName": self.first_name,
            "lastName": self.last_name,
            "username": self.username,
            "dob": self.dob,
            "phoneNumber": self.phone_number,
        })
    }
}

/// Body of `GET api/auth/csrf-token`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    pub success: bool,
    pub csrf_token: Secret<String>,
}

/// Join a relative endpoint path onto the API base URL.
///
/// A base without a trailing slash is treated as a directory, so
/// `https://host/v2` + `api/auth/login` yields `https://host/v2/api/auth/login`.
pub fn endpoint_url(base: &Url, path: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.join(path.trim_start_matches('/'))
        .map_err(|e| Error::Url(format!("joining {path} onto {base}: {e}")))
}

/// Exchange a refresh token for a new token pair.
///
/// `csrf` is attached as `X-CSRF-Token` when present, since the server
/// guards this POST like any other. Every failure mode (transport error, timeout, rejected token, server
/// error, malformed body) comes back as an `Err`; the caller treats them
/// all as an unrecoverable session.
pub async fn refresh_tokens(
    client: &reqwest::Client,
    base: &Url,
    refresh: &str,
    csrf: Option<&str>,
) -> Result<RefreshTokensResponse> {
    let url = endpoint_url(base, REFRESH_TOKEN_PATH)?;
    let mut builder = client
        .post(url)
        .json(&json!({ "refreshToken": refresh }));
    if let Some(csrf) = csrf {
        builder = builder.header(CSRF_HEADER, csrf);
    }
    let response = builder
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // 401/403 means the refresh token is revoked or expired
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    response
        .json::<RefreshTokensResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))
}
