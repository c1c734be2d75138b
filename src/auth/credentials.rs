//! Bearer token storage

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::Result;

#[derive(Debug, Serialize, Deserialize)]
struct StoredCredentials {
    access_token: String,
}

#[derive(Debug, Default)]
struct Inner {
    token: Option<String>,
    path: Option<PathBuf>,
}

/// Shared holder for the current bearer token.
///
/// Clones share the same token, so invalidating through one handle (for
/// example after a `401`) signs every component out at once.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    inner: Arc<RwLock<Inner>>,
}

impl CredentialStore {
    /// Load credentials persisted at `path`, if any
    pub fn load(path: &Path) -> Result<Self> {
        let token = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match serde_json::from_str::<StoredCredentials>(&content) {
                Ok(stored) => Some(stored.access_token),
                Err(e) => {
                    warn!("Ignoring unreadable credentials file {}: {}", path.display(), e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            inner: Arc::new(RwLock::new(Inner {
                token,
                path: Some(path.to_path_buf()),
            })),
        })
    }

    /// Credentials that live only in memory
    pub fn in_memory(token: Option<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner { token, path: None })),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.read().token.clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.read().token.is_some()
    }

    /// Remember a new token, persisting it when the store is file-backed
    pub fn store(&self, token: String) -> Result<()> {
        let mut inner = self.write();
        if let Some(path) = &inner.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let content = serde_json::to_string(&StoredCredentials {
                access_token: token.clone(),
            })
            .map_err(|e| crate::VidjotError::Other(e.to_string()))?;
            std::fs::write(path, content)?;
            restrict_permissions(path)?;
        }
        inner.token = Some(token);
        Ok(())
    }

    /// Forget the token and delete the persisted copy
    pub fn invalidate(&self) {
        let mut inner = self.write();
        inner.token = None;
        if let Some(path) = &inner.path {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!("Failed to remove credentials file {}: {}", path.display(), e);
                }
            }
        }
        debug!("Credentials invalidated");
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
