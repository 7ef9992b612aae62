//! Session calls made through the gateway
//!
//! Anti-forgery token, sign-in and sign-up, password reset with one-time
//! codes, and sign-out. Everything except logout is sent with
//! `skip_auth_refresh`: these calls either create a session or work without
//! one, so a 401 is an answer to report rather than a token to renew.

use common::Secret;
use serde_json::json;
use session_auth::{
    BaseResponse, CSRF_TOKEN_PATH, CsrfTokenResponse, FORGOT_PASSWORD_PATH, LOGIN_PATH,
    LOGOUT_PATH, LoginResponse, RESEND_OTP_PATH, RESET_PASSWORD_PATH, SIGNUP_PATH,
    SignupRequest, VERIFY_OTP_PATH,
};
use tracing::info;

use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::request::ApiRequest;

fn message_or(message: String, fallback: &str) -> String {
    if message.is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

impl Gateway {
    /// Fetch the anti-forgery token and attach it to every later request.
    pub async fn fetch_csrf_token(&self) -> Result<()> {
        let response = self.execute(ApiRequest::get(CSRF_TOKEN_PATH)).await?;
        let body: CsrfTokenResponse = response.json()?;
        if !body.success {
            return Err(Error::Rejected("csrf token request was not successful".into()));
        }
        self.set_csrf_token(body.csrf_token);
        info!("anti-forgery token fetched");
        Ok(())
    }

    /// Sign in and store the issued token pair.
    ///
    /// Returns the user profile from the response (`Null` when absent). Bad
    /// credentials come back as a 401 `Error::Status`; login never starts a
    /// refresh cycle.
    pub async fn login(&self, identifier: &str, password: &Secret<String>) -> Result<serde_json::Value> {
        let request = ApiRequest::post(
            LOGIN_PATH,
            json!({ "identifier": identifier, "password": password.expose() }),
        )
        .without_auth_refresh();

        let user = self.start_session(request, "login failed").await?;
        info!("signed in");
        Ok(user)
    }

    /// Register an account. The server signs the new user in, so the issued
    /// pair is stored just like after `login`.
    pub async fn signup(
        &self,
        request: &SignupRequest,
        password: &Secret<String>,
    ) -> Result<serde_json::Value> {
        let request = ApiRequest::post(SIGNUP_PATH, request.to_body(password)).without_auth_refresh();

        let user = self.start_session(request, "signup failed").await?;
        info!("account created and signed in");
        Ok(user)
    }

    /// Ask the server to send a password-reset code to `identifier`.
    pub async fn forgot_password(&self, identifier: &str) -> Result<String> {
        let request = ApiRequest::post(FORGOT_PASSWORD_PATH, json!({ "identifier": identifier }))
            .without_auth_refresh();
        self.post_for_message(request, "password reset request failed").await
    }

    /// Set a new password using the code sent by `forgot_password`.
    pub async fn reset_password(
        &self,
        identifier: &str,
        otp: &str,
        password: &Secret<String>,
    ) -> Result<String> {
        let request = ApiRequest::post(
            RESET_PASSWORD_PATH,
            json!({ "identifier": identifier, "otp": otp, "password": password.expose() }),
        )
        .without_auth_refresh();
        self.post_for_message(request, "password reset failed").await
    }

    /// Confirm a one-time code.
    pub async fn verify_otp(&self, identifier: &str, otp: &str) -> Result<String> {
        let request = ApiRequest::post(VERIFY_OTP_PATH, json!({ "identifier": identifier, "otp": otp }))
            .without_auth_refresh();
        self.post_for_message(request, "code verification failed").await
    }

    /// Have the server send a new one-time code.
    pub async fn resend_otp(&self, identifier: &str) -> Result<String> {
        let request = ApiRequest::post(RESEND_OTP_PATH, json!({ "identifier": identifier }))
            .without_auth_refresh();
        self.post_for_message(request, "resending code failed").await
    }

    /// End the server-side session, then forget the local tokens.
    ///
    /// Tokens are kept if the server refuses, matching a failed logout
    /// leaving the user signed in.
    pub async fn logout(&self) -> Result<String> {
        let message = self
            .post_for_message(ApiRequest::post(LOGOUT_PATH, json!({})), "logout failed")
            .await?;
        self.credentials().clear();
        info!("signed out");
        Ok(message)
    }

    /// Send a login-shaped request and store the pair it returns.
    async fn start_session(&self, request: ApiRequest, fallback: &str) -> Result<serde_json::Value> {
        let body: LoginResponse = self.execute(request).await?.json()?;
        let data = match body.data {
            Some(data) if body.success => data,
            _ => return Err(Error::Rejected(message_or(body.message, fallback))),
        };

        self.credentials().set_tokens(&data.tokens);
        Ok(data.user.unwrap_or(serde_json::Value::Null))
    }

    /// Send a request answered with `{ success, message }`.
    async fn post_for_message(&self, request: ApiRequest, fallback: &str) -> Result<String> {
        let body: BaseResponse = self.execute(request).await?.json()?;
        if !body.success {
            return Err(Error::Rejected(message_or(body.message, fallback)));
        }
        Ok(body.message)
    }
}
