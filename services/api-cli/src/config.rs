//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The login password never lives in the TOML; it is read from
//! `API_PASSWORD` at login time.

use reqwest::Url;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// API server settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    /// Overall per-request timeout, refresh calls included
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Local session settings
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    /// Fetch the anti-forgery token once at startup
    #[serde(default = "default_fetch_csrf_token")]
    pub fetch_csrf_token: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            fetch_csrf_token: default_fetch_csrf_token(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("session.json")
}

fn default_fetch_csrf_token() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// `API_BASE_URL` replaces `api.base_url` when set.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Ok(url) = std::env::var("API_BASE_URL") {
            config.api.base_url = url;
        }

        if !config.api.base_url.starts_with("http://")
            && !config.api.base_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid(format!(
                "base_url must start with http:// or https://, got: {}",
                config.api.base_url
            )));
        }

        if config.api.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "timeout_ms must be greater than 0".into(),
            ));
        }

        Ok(config)
    }

    /// Parsed API base URL.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.api.base_url).map_err(|e| {
            ConfigError::Invalid(format!("invalid base_url {}: {e}", self.api.base_url))
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.api.timeout_ms)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("api-client.toml")
    }
}
