//! API client CLI
//!
//! Thin command-line front end over the auth gateway:
//! 1. Loads the session file and configuration
//! 2. Fetches the anti-forgery token
//! 3. Runs one command: an auth flow (`login`, `signup`, password reset,
//!    one-time codes, `logout`) or a raw `request`
//! 4. Writes the possibly refreshed session back to disk

mod config;
mod error;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use auth_gateway::{ApiRequest, Gateway};
use common::Secret;
use reqwest::Method;
use session_auth::{FileCredentialStore, SignupRequest};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

const USAGE: &str = "usage: api-cli [--config PATH] <command>
  login IDENTIFIER
  signup EMAIL USERNAME FIRST_NAME LAST_NAME DOB PHONE
  forgot-password IDENTIFIER
  reset-password IDENTIFIER OTP
  verify-otp IDENTIFIER OTP
  resend-otp IDENTIFIER
  logout
  request METHOD PATH [JSON_BODY]
login, signup and reset-password read the password from API_PASSWORD";

/// Command selected on the command line
#[derive(Debug, PartialEq)]
enum Command {
    Login {
        identifier: String,
    },
    Signup(SignupRequest),
    ForgotPassword {
        identifier: String,
    },
    ResetPassword {
        identifier: String,
        otp: String,
    },
    VerifyOtp {
        identifier: String,
        otp: String,
    },
    ResendOtp {
        identifier: String,
    },
    Logout,
    Request {
        method: Method,
        path: String,
        body: Option<serde_json::Value>,
    },
}

/// Parsed command line: optional `--config` path plus the command.
#[derive(Debug, PartialEq)]
struct Args {
    config_path: Option<String>,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut config_path = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().context("--config requires a path")?;
            config_path = Some(path.clone());
        } else {
            rest.push(arg.as_str());
        }
    }

    let command = match rest.as_slice() {
        ["login", identifier] => Command::Login {
            identifier: identifier.to_string(),
        },
        ["signup", email, username, first_name, last_name, dob, phone_number] => {
            Command::Signup(SignupRequest {
                email: email.to_string(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                username: username.to_string(),
                dob: dob.to_string(),
                phone_number: phone_number.to_string(),
            })
        }
        ["forgot-password", identifier] => Command::ForgotPassword {
            identifier: identifier.to_string(),
        },
        ["reset-password", identifier, otp] => Command::ResetPassword {
            identifier: identifier.to_string(),
            otp: otp.to_string(),
        },
        ["verify-otp", identifier, otp] => Command::VerifyOtp {
            identifier: identifier.to_string(),
            otp: otp.to_string(),
        },
        ["resend-otp", identifier] => Command::ResendOtp {
            identifier: identifier.to_string(),
        },
        ["logout"] => Command::Logout,
        ["request", method, path, body @ ..] if body.len() <= 1 => {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .with_context(|| format!("invalid HTTP method: {method}"))?;
            let body = body
                .first()
                .map(|raw| serde_json::from_str(raw))
                .transpose()
                .context("request body must be valid JSON")?;
            Command::Request {
                method,
                path: path.trim_start_matches('/').to_string(),
                body,
            }
        }
        _ => bail!("{USAGE}"),
    };

    Ok(Args {
        config_path,
        command,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr so stdout carries only response bodies
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&args)?;

    let config_path = Config::resolve_path(args.config_path.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let base_url = config.base_url()?;

    info!(
        base_url = %base_url,
        timeout_ms = config.api.timeout_ms,
        credentials_path = %config.session.credentials_path.display(),
        "configuration loaded"
    );

    let store = Arc::new(
        FileCredentialStore::load(config.session.credentials_path.clone())
            .await
            .context("failed to load session file")?,
    );

    let gateway = Gateway::http(
        base_url,
        config.timeout(),
        store.clone(),
        Arc::new(|| warn!("session expired, run `api-cli login` to sign in again")),
    )?;

    if config.session.fetch_csrf_token {
        if let Err(e) = gateway.fetch_csrf_token().await {
            warn!(error = %e, "could not fetch anti-forgery token, continuing without it");
        }
    }

    let outcome = run(&gateway, args.command).await;

    // Persist whatever the command left behind: a new login, a refreshed
    // pair or a cleared session.
    store
        .save()
        .await
        .with_context(|| format!("failed to save session to {}", store.path().display()))?;

    let output = outcome?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

/// Password for login, signup and reset. Never taken from argv.
fn password_from_env() -> Result<Secret<String>> {
    let password: Secret<String> = std::env::var("API_PASSWORD")
        .context("API_PASSWORD must be set")?
        .into();
    if password.is_blank() {
        bail!("API_PASSWORD is empty");
    }
    Ok(password)
}

/// Run one command and return what should be printed on stdout.
async fn run(gateway: &Gateway, command: Command) -> Result<String> {
    match command {
        Command::Login { identifier } => {
            let password = password_from_env()?;
            let user = gateway
                .login(&identifier, &password)
                .await
                .context("login failed")?;
            Ok(serde_json::to_string_pretty(&user)?)
        }
        Command::Signup(request) => {
            let password = password_from_env()?;
            let user = gateway
                .signup(&request, &password)
                .await
                .context("signup failed")?;
            Ok(serde_json::to_string_pretty(&user)?)
        }
        Command::ForgotPassword { identifier } => gateway
            .forgot_password(&identifier)
            .await
            .context("password reset request failed"),
        Command::ResetPassword { identifier, otp } => {
            let password = password_from_env()?;
            gateway
                .reset_password(&identifier, &otp, &password)
                .await
                .context("password reset failed")
        }
        Command::VerifyOtp { identifier, otp } => gateway
            .verify_otp(&identifier, &otp)
            .await
            .context("code verification failed"),
        Command::ResendOtp { identifier } => gateway
            .resend_otp(&identifier)
            .await
            .context("resending code failed"),
        Command::Logout => {
            let message = gateway.logout().await.context("logout failed")?;
            Ok(message)
        }
        Command::Request { method, path, body } => {
            let mut request = ApiRequest::new(method, path.clone());
            if let Some(body) = body {
                request = request.with_body(body);
            }
            let response = gateway
                .execute(request)
                .await
                .with_context(|| format!("request to {path} failed"))?;
            Ok(response.text())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_login() {
        let parsed = parse_args(&args(&["login", "ada@example.com"])).unwrap();
        assert_eq!(parsed.config_path, None);
        assert_eq!(
            parsed.command,
            Command::Login {
                identifier: "ada@example.com".into()
            }
        );
    }

    #[test]
    fn parses_config_flag_anywhere() {
        let parsed = parse_args(&args(&["logout", "--config", "/etc/api-client.toml"])).unwrap();
        assert_eq!(parsed.config_path.as_deref(), Some("/etc/api-client.toml"));
        assert_eq!(parsed.command, Command::Logout);
    }

    #[test]
    fn parses_request_with_body() {
        let parsed = parse_args(&args(&[
            "request",
            "post",
            "/api/events",
            r#"{"name":"launch"}"#,
        ]))
        .unwrap();
        assert_eq!(
            parsed.command,
            Command::Request {
                method: Method::POST,
                path: "api/events".into(),
                body: Some(json!({ "name": "launch" })),
            }
        );
    }

    #[test]
    fn parses_request_without_body() {
        let parsed = parse_args(&args(&["request", "GET", "api/me"])).unwrap();
        assert_eq!(
            parsed.command,
            Command::Request {
                method: Method::GET,
                path: "api/me".into(),
                body: None,
            }
        );
    }

    #[test]
    fn parses_signup_profile() {
        let parsed = parse_args(&args(&[
            "signup",
            "grace@example.com",
            "grace",
            "Grace",
            "Hopper",
            "1985-12-09",
            "+15550199",
        ]))
        .unwrap();
        let request = match parsed.command {
            Command::Signup(request) => request,
            other => panic!("expected signup, got {other:?}"),
        };
        assert_eq!(request.username, "grace");
        assert_eq!(request.first_name, "Grace");
        assert_eq!(request.last_name, "Hopper");
        assert_eq!(request.phone_number, "+15550199");
    }

    #[test]
    fn parses_otp_commands() {
        assert_eq!(
            parse_args(&args(&["verify-otp", "+15550199", "123456"])).unwrap().command,
            Command::VerifyOtp {
                identifier: "+15550199".into(),
                otp: "123456".into(),
            }
        );
        assert_eq!(
            parse_args(&args(&["reset-password", "+15550199", "123456"])).unwrap().command,
            Command::ResetPassword {
                identifier: "+15550199".into(),
                otp: "123456".into(),
            }
        );
        assert_eq!(
            parse_args(&args(&["forgot-password", "+15550199"])).unwrap().command,
            Command::ForgotPassword {
                identifier: "+15550199".into(),
            }
        );
        assert_eq!(
            parse_args(&args(&["resend-otp", "+15550199"])).unwrap().command,
            Command::ResendOtp {
                identifier: "+15550199".into(),
            }
        );
    }

    #[test]
    fn signup_requires_full_profile() {
        assert!(parse_args(&args(&["signup", "grace@example.com", "grace"])).is_err());
    }

    #[test]
    fn rejects_invalid_json_body() {
        let err = parse_args(&args(&["request", "POST", "api/events", "{not json"])).unwrap_err();
        assert!(err.to_string().contains("valid JSON"), "got: {err}");
    }

    #[test]
    fn rejects_unknown_command_with_usage() {
        let err = parse_args(&args(&["frobnicate"])).unwrap_err();
        assert!(err.to_string().starts_with("usage:"), "got: {err}");
    }

    #[test]
    fn config_flag_requires_value() {
        assert!(parse_args(&args(&["logout", "--config"])).is_err());
    }
}
