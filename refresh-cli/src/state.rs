//! Refresh tokens rotate on every exchange; the latest one is kept on disk so
//! the next run does not fall back to a token the provider already retired.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use refresh_engine::{AuthSession, Credentials};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub refresh_token: String,
    /// Identity of the configured credential set this token belongs to.
    pub credentials_id: String,
    pub updated_at: DateTime<Utc>,
}

/// SHA-256 (hex) over the client id and the configured refresh token.
pub fn credentials_id(client_id: &str, refresh_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(client_id.as_bytes());
    hasher.update(refresh_token.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join("pbi-refresh").join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored state. A missing or unreadable file yields `None`.
    pub fn load(&self) -> Option<PersistedState> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read state file");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt state file");
                None
            }
        }
    }

    pub fn save(&self, refresh_token: &str, credentials_id: &str) -> Result<()> {
        let state = PersistedState {
            refresh_token: refresh_token.to_owned(),
            credentials_id: credentials_id.to_owned(),
            updated_at: Utc::now(),
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.error(e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        write_private(&tmp, &serde_json::to_vec_pretty(&state)?).map_err(|e| self.error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.error(e))?;
        debug!(path = %self.path.display(), "Refresh token persisted");
        Ok(())
    }

    /// Substitute the stored refresh token when it was issued for the same
    /// credential set as the configured one.
    pub fn resolve(&self, mut credentials: Credentials) -> Credentials {
        let Some(identity) = credentials.identity.as_deref() else {
            return credentials;
        };
        match self.load() {
            Some(state) if state.credentials_id == identity => {
                info!(updated_at = %state.updated_at, "Using stored refresh token");
                credentials.refresh_token = state.refresh_token;
            }
            Some(_) => {
                info!("Stored refresh token belongs to other credentials; using configured token");
            }
            None => {}
        }
        credentials
    }

    /// Persist the session's latest refresh token.
    pub fn persist(&self, session: &AuthSession) -> Result<()> {
        match session.credentials().identity.as_deref() {
            Some(identity) => self.save(&session.refresh_token(), identity),
            None => Ok(()),
        }
    }

    fn error(&self, e: std::io::Error) -> AppError {
        AppError::State {
            path: self.path.clone(),
            reason: e.to_string(),
        }
    }
}

/// Write `contents` to a fresh file readable by the owner only.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => return Err(e),
        _ => {}
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}
