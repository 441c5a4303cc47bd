/// file: src/credentials.rs
/// description: persisted access token with a fixed lifetime
use crate::error::TaskMasterError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Storage for the short-lived access token.
///
/// `clear` cannot fail: logging out must always leave no usable token behind.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str) -> Result<(), TaskMasterError>;
    fn clear(&self);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl StoredToken {
    fn new(token: &str, ttl: chrono::Duration) -> Self {
        Self {
            token: token.to_string(),
            expires_at: Utc::now()
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    fn live(self) -> Option<String> {
        (self.expires_at > Utc::now()).then_some(self.token)
    }
}

/// Token kept in a JSON file between runs.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    ttl: chrono::Duration,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>, ttl: chrono::Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<String> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<StoredToken>(&raw) {
            Ok(stored) => {
                let token = stored.live();
                if token.is_none() {
                    debug!("Stored token at {} has expired", self.path.display());
                }
                token
            }
            Err(e) => {
                warn!("Ignoring unreadable credential file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn save(&self, token: &str) -> Result<(), TaskMasterError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string(&StoredToken::new(token, self.ttl))?;
        let mut file = open_private(&self.path)?;
        file.write_all(body.as_bytes())?;
        Ok(())
    }

    fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                // Overwrite so a stale token cannot be reused even if removal fails
                warn!("Failed to remove {}: {}", self.path.display(), e);
                let _ = std::fs::write(&self.path, b"");
            }
        }
    }
}

/// Opens `path` for writing, readable by the owner only.
#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

/// Process-local token, for tests and one-shot sessions.
#[derive(Debug)]
pub struct MemoryCredentialStore {
    ttl: chrono::Duration,
    slot: Mutex<Option<StoredToken>>,
}

impl MemoryCredentialStore {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new(chrono::Duration::days(1))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<String> {
        let slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        slot.clone().and_then(StoredToken::live)
    }

    fn save(&self, token: &str) -> Result<(), TaskMasterError> {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        *slot = Some(StoredToken::new(token, self.ttl));
        Ok(())
    }

    fn clear(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        *slot = None;
    }
}
