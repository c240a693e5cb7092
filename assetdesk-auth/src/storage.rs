//! Credential storage
//!
//! A durable key/value slot for the bearer and refresh tokens. Reads and
//! writes are last-write-wins.

use crate::error::AuthResult;
use assetdesk_core::{storage_error, StorageConfig};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Durable string storage keyed by fixed names
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> AuthResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AuthResult<()>;
    fn remove(&self, key: &str) -> AuthResult<()>;
}

/// Process-local store, used by tests and embedders without durable storage
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> AuthResult<Option<String>> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AuthResult<()> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AuthResult<()> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}

/// JSON file holding a flat string map, rewritten atomically on every change
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new<P: AsRef<Path>>(path: P) -> AuthResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                storage_error!(
                    format!("Failed to create credential directory {}", parent.display()),
                    "credential_store",
                    e
                )
            })?;
        }

        info!("Credential storage at: {}", path.display());
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> AuthResult<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let data = std::fs::read_to_string(&self.path).map_err(|e| {
            storage_error!(
                format!("Failed to read {}", self.path.display()),
                "credential_store",
                e
            )
        })?;

        match serde_json::from_str(&data) {
            Ok(map) => Ok(map),
            Err(e) => {
                // An unreadable slot holds no usable credential
                warn!(path = %self.path.display(), error = %e, "Corrupt credential file ignored");
                Ok(HashMap::new())
            }
        }
    }

    fn write_map(&self, map: &HashMap<String, String>) -> AuthResult<()> {
        let json = serde_json::to_string_pretty(map).map_err(|e| {
            storage_error!("Failed to serialize credentials", "credential_store", e)
        })?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| {
            storage_error!(
                format!("Failed to write {}", tmp.display()),
                "credential_store",
                e
            )
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600));
        }

        std::fs::rename(&tmp, &self.path).map_err(|e| {
            storage_error!(
                format!("Failed to replace {}", self.path.display()),
                "credential_store",
                e
            )
        })?;

        debug!(path = %self.path.display(), keys = map.len(), "Credentials written");
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> AuthResult<Option<String>> {
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> AuthResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> AuthResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// The bearer and refresh token slots under their configured keys
#[derive(Clone)]
pub struct CredentialSlot {
    store: Arc<dyn CredentialStore>,
    token_key: String,
    refresh_token_key: String,
}

impl CredentialSlot {
    pub fn new(store: Arc<dyn CredentialStore>, config: &StorageConfig) -> Self {
        Self {
            store,
            token_key: config.token_key.clone(),
            refresh_token_key: config.refresh_token_key.clone(),
        }
    }

    /// Stored access token; blank values count as absent
    pub fn access_token(&self) -> AuthResult<Option<String>> {
        Ok(self
            .store
            .get(&self.token_key)?
            .filter(|t| !t.trim().is_empty()))
    }

    pub fn refresh_token(&self) -> AuthResult<Option<String>> {
        Ok(self
            .store
            .get(&self.refresh_token_key)?
            .filter(|t| !t.trim().is_empty()))
    }

    /// Write a new access token, and the refresh token when one is issued
    pub fn save(&self, access_token: &str, refresh_token: Option<&str>) -> AuthResult<()> {
        self.store.set(&self.token_key, access_token)?;
        if let Some(refresh_token) = refresh_token {
            self.store.set(&self.refresh_token_key, refresh_token)?;
        }
        Ok(())
    }

    /// Write a fresh credential pair; no refresh token leaves the refresh slot empty
    pub fn replace(&self, access_token: &str, refresh_token: Option<&str>) -> AuthResult<()> {
        self.store.set(&self.token_key, access_token)?;
        match refresh_token {
            Some(refresh_token) => self.store.set(&self.refresh_token_key, refresh_token),
            None => self.store.remove(&self.refresh_token_key),
        }
    }

    pub fn clear(&self) -> AuthResult<()> {
        self.store.remove(&self.token_key)?;
        self.store.remove(&self.refresh_token_key)
    }

    pub fn is_empty(&self) -> AuthResult<bool> {
        Ok(self.access_token()?.is_none() && self.refresh_token()?.is_none())
    }
}

impl std::fmt::Debug for CredentialSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSlot")
            .field("token_key", &self.token_key)
            .field("refresh_token_key", &self.refresh_token_key)
            .finish_non_exhaustive()
    }
}
