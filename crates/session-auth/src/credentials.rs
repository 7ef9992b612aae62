//! Credential storage for the signed-in session
//!
//! The gateway reads and writes tokens synchronously on every request, so the
//! `CredentialStore` trait is sync and backed by memory. `FileCredentialStore`
//! adds a JSON session file on top: writes land in memory immediately and are
//! persisted by an explicit async `save()`, using atomic temp-file + rename
//! to prevent corruption on crash.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::token::Tokens;

/// Source of truth for the access/refresh token pair.
///
/// Implementations must not block: they are called from async request
/// handling without an intervening suspension point.
pub trait CredentialStore: Send + Sync {
    /// Current access token, if signed in.
    fn access_token(&self) -> Option<Secret<String>>;

    /// Current refresh token, if signed in.
    fn refresh_token(&self) -> Option<Secret<String>>;

    /// Replace the access token after a refresh.
    fn set_access_token(&self, token: Secret<String>);

    /// Replace the refresh token when the server rotates it.
    fn set_refresh_token(&self, token: Secret<String>);

    /// Forget both tokens (sign-out or unrecoverable refresh failure).
    fn clear(&self);

    /// Store a freshly issued pair (login).
    fn set_tokens(&self, tokens: &Tokens) {
        self.set_access_token(tokens.access.token.clone());
        self.set_refresh_token(tokens.refresh.token.clone());
    }
}

#[derive(Default)]
struct Pair {
    access: Option<Secret<String>>,
    refresh: Option<Secret<String>>,
}

/// In-memory credential store.
///
/// A `std::sync::RwLock` is enough: no lock is held across an `.await`.
/// Blank tokens are treated as absent so an empty string never turns into a
/// `Bearer ` header.
#[derive(Default)]
pub struct MemoryCredentialStore {
    pair: RwLock<Pair>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store already holding a session.
    pub fn with_tokens(access: impl Into<Secret<String>>, refresh: impl Into<Secret<String>>) -> Self {
        let store = Self::new();
        store.set_access_token(access.into());
        store.set_refresh_token(refresh.into());
        store
    }

    /// Whether an access token is present.
    pub fn is_signed_in(&self) -> bool {
        self.access_token().is_some()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Pair> {
        // A writer that panicked cannot leave a half-written Option behind,
        // so a poisoned lock still holds a usable pair.
        self.pair.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Pair> {
        self.pair.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn non_blank(token: Secret<String>) -> Option<Secret<String>> {
    (!token.is_blank()).then_some(token)
}

impl CredentialStore for MemoryCredentialStore {
    fn access_token(&self) -> Option<Secret<String>> {
        self.read().access.clone()
    }

    fn refresh_token(&self) -> Option<Secret<String>> {
        self.read().refresh.clone()
    }

    fn set_access_token(&self, token: Secret<String>) {
        self.write().access = non_blank(token);
    }

    fn set_refresh_token(&self, token: Secret<String>) {
        self.write().refresh = non_blank(token);
    }

    fn clear(&self) {
        let mut pair = self.write();
        pair.access = None;
        pair.refresh = None;
        debug!("cleared session credentials");
    }
}

/// On-disk shape of the session file.
#[derive(Deserialize, Default)]
struct SessionFile {
    #[serde(default)]
    access_token: Option<Secret<String>>,
    #[serde(default)]
    refresh_token: Option<Secret<String>>,
}

/// Borrowed view used for writing; tokens are exposed only here.
#[derive(Serialize)]
struct SessionFileRef<'a> {
    access_token: Option<&'a str>,
    refresh_token: Option<&'a str>,
}

/// Credential store persisted to a JSON session file.
///
/// Reads and writes go to the in-memory store; `save()` snapshots it to disk.
pub struct FileCredentialStore {
    path: PathBuf,
    memory: MemoryCredentialStore,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileCredentialStore {
    /// Load the session from the given file path.
    ///
    /// If the file doesn't exist, creates it empty (signed-out cold start).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let memory = MemoryCredentialStore::new();
        if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading session file: {e}")))?;
            let file: SessionFile = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing session file: {e}")))?;
            if let Some(access) = file.access_token {
                memory.set_access_token(access);
            }
            if let Some(refresh) = file.refresh_token {
                memory.set_refresh_token(refresh);
            }
            info!(path = %path.display(), signed_in = memory.is_signed_in(), "loaded session");
        } else {
            info!(path = %path.display(), "session file not found, starting signed out");
            write_atomic(&path, &SessionFileRef { access_token: None, refresh_token: None }).await?;
        }

        Ok(Self {
            path,
            memory,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Persist the current in-memory session to disk.
    ///
    /// File permissions are set to 0600 (owner read/write only).
    pub async fn save(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let access = self.memory.access_token();
        let refresh = self.memory.refresh_token();
        let snapshot = SessionFileRef {
            access_token: access.as_ref().map(|s| s.expose().as_str()),
            refresh_token: refresh.as_ref().map(|s| s.expose().as_str()),
        };
        write_atomic(&self.path, &snapshot).await
    }

    /// Location of the session file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether an access token is present.
    pub fn is_signed_in(&self) -> bool {
        self.memory.is_signed_in()
    }
}

impl CredentialStore for FileCredentialStore {
    fn access_token(&self) -> Option<Secret<String>> {
        self.memory.access_token()
    }

    fn refresh_token(&self) -> Option<Secret<String>> {
        self.memory.refresh_token()
    }

    fn set_access_token(&self, token: Secret<String>) {
        self.memory.set_access_token(token);
    }

    fn set_refresh_token(&self, token: Secret<String>) {
        self.memory.set_refresh_token(token);
    }

    fn clear(&self) {
        self.memory.clear();
    }
}

/// Write the session snapshot atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets 0600 permissions since the file holds bearer tokens.
async fn write_atomic(path: &Path, data: &SessionFileRef<'_>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing session: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("session path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session");
    Ok(())
}
