//! Durable storage for the current credential pair.
//!
//! `TokenStore` keeps an in-memory copy that is authoritative for the
//! running process and mirrors every change to a `CredentialBackend`.
//! Backend failures are returned for reporting only; the in-memory copy is
//! updated regardless so callers can carry on for the current run.

use std::fmt;
use std::path::PathBuf;

use keyring::Entry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::AuthError;

/// Keyring account name holding the serialized pair
const KEYRING_ACCOUNT: &str = "credentials";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// Tokens never end up in logs.
impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &format_args!("<{} bytes>", self.access_token.len()))
            .field("refresh_token", &format_args!("<{} bytes>", self.refresh_token.len()))
            .finish()
    }
}

/// A single namespaced slot that survives process restarts.
pub trait CredentialBackend: Send + Sync {
    fn load(&self) -> Result<Option<CredentialPair>, AuthError>;
    fn persist(&self, pair: &CredentialPair) -> Result<(), AuthError>;
    fn remove(&self) -> Result<(), AuthError>;
}

fn encode(pair: &CredentialPair) -> Result<String, AuthError> {
    serde_json::to_string(pair).map_err(|e| AuthError::StorageUnavailable(e.to_string()))
}

fn decode(blob: &str) -> Result<CredentialPair, AuthError> {
    serde_json::from_str(blob)
        .map_err(|e| AuthError::StorageUnavailable(format!("corrupt credential blob: {}", e)))
}

/// Stores the pair as one entry in the OS keychain.
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<Entry, AuthError> {
        Entry::new(&self.service, KEYRING_ACCOUNT)
            .map_err(|e| AuthError::StorageUnavailable(format!("keyring entry: {}", e)))
    }
}

impl CredentialBackend for KeyringBackend {
    fn load(&self) -> Result<Option<CredentialPair>, AuthError> {
        match self.entry()?.get_password() {
            Ok(blob) => decode(&blob).map(Some),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AuthError::StorageUnavailable(format!("keyring read: {}", e))),
        }
    }

    fn persist(&self, pair: &CredentialPair) -> Result<(), AuthError> {
        self.entry()?
            .set_password(&encode(pair)?)
            .map_err(|e| AuthError::StorageUnavailable(format!("keyring write: {}", e)))
    }

    fn remove(&self) -> Result<(), AuthError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AuthError::StorageUnavailable(format!("keyring delete: {}", e))),
        }
    }
}

/// Stores the pair as a JSON file, readable only by the owner on unix.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn io_error(&self, action: &str, e: std::io::Error) -> AuthError {
        AuthError::StorageUnavailable(format!("{} {}: {}", action, self.path.display(), e))
    }
}

impl CredentialBackend for FileBackend {
    fn load(&self) -> Result<Option<CredentialPair>, AuthError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|e| self.io_error("read", e))?;
        decode(&contents).map(Some)
    }

    fn persist(&self, pair: &CredentialPair) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error("create dir for", e))?;
        }
        std::fs::write(&self.path, encode(pair)?).map_err(|e| self.io_error("write", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| self.io_error("chmod", e))?;
        }
        Ok(())
    }

    fn remove(&self) -> Result<(), AuthError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|e| self.io_error("remove", e))?;
        }
        Ok(())
    }
}

/// Backend that persists nothing; credentials live for the current run only.
#[derive(Debug, Default)]
pub struct MemoryBackend;

impl CredentialBackend for MemoryBackend {
    fn load(&self) -> Result<Option<CredentialPair>, AuthError> {
        Ok(None)
    }

    fn persist(&self, _pair: &CredentialPair) -> Result<(), AuthError> {
        Ok(())
    }

    fn remove(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

pub struct TokenStore {
    backend: Box<dyn CredentialBackend>,
    current: RwLock<Option<CredentialPair>>,
}

impl TokenStore {
    /// Open the store, loading whatever the backend holds. An unreadable
    /// backend is logged and treated as logged out.
    pub fn open(backend: Box<dyn CredentialBackend>) -> Self {
        let current = match backend.load() {
            Ok(pair) => {
                debug!(found = pair.is_some(), "Credential store opened");
                pair
            }
            Err(e) => {
                warn!(error = %e, "Could not load stored credentials, starting logged out");
                None
            }
        };
        Self {
            backend,
            current: RwLock::new(current),
        }
    }

    pub fn in_memory() -> Self {
        Self::open(Box::new(MemoryBackend))
    }

    /// Replace the stored pair. The new pair is in effect even when the
    /// returned error reports that it could not be made durable.
    pub fn save(&self, pair: CredentialPair) -> Result<(), AuthError> {
        let result = self.backend.persist(&pair);
        *self.current.write() = Some(pair);
        result
    }

    /// Replace the pair only while `expected` is still the stored one.
    ///
    /// `Ok(false)` means the store changed (logout or a new login) and
    /// nothing was written. An error has the same meaning as for `save`.
    pub fn save_if_current(
        &self,
        expected: &CredentialPair,
        pair: CredentialPair,
    ) -> Result<bool, AuthError> {
        let mut current = self.current.write();
        if current.as_ref() != Some(expected) {
            return Ok(false);
        }
        let result = self.backend.persist(&pair);
        *current = Some(pair);
        result.map(|()| true)
    }

    /// Clear only while `expected` is still the stored pair.
    pub fn clear_if_current(&self, expected: &CredentialPair) -> Result<bool, AuthError> {
        let mut current = self.current.write();
        if current.as_ref() != Some(expected) {
            return Ok(false);
        }
        *current = None;
        self.backend.remove().map(|()| true)
    }

    pub fn get(&self) -> Option<CredentialPair> {
        self.current.read().clone()
    }

    pub fn clear(&self) -> Result<(), AuthError> {
        *self.current.write() = None;
        self.backend.remove()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_none()
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("has_credentials", &!self.is_empty())
            .finish()
    }
}
