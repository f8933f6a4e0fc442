//! Application configuration management.
//!
//! Configuration is stored at `~/.config/tokenward/config.json`. A missing
//! file yields the defaults; `TOKENWARD_*` environment variables override
//! individual fields after loading.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::store::{CredentialBackend, FileBackend, KeyringBackend};

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "tokenward";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// File name for the credential blob when file storage is selected
const CREDENTIALS_FILE: &str = "credentials.json";

/// Where the credential pair is persisted between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// OS keychain entry
    #[default]
    Keyring,
    /// JSON file in the cache directory
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub login_path: String,
    pub register_path: String,
    pub renew_path: String,
    pub profile_path: String,
    /// Seconds before the inactivity logout at which the warning is shown
    pub warning_lead_secs: u64,
    /// Seconds without qualifying input before the session ends
    pub inactivity_timeout_secs: u64,
    /// Treat access tokens as expired this many seconds early
    pub expiry_skew_secs: i64,
    /// Extra renewal attempts when the credential server is unreachable
    pub renewal_retries: u32,
    pub renewal_backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub storage: StorageKind,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002".to_string(),
            login_path: "/api/accounts/direct-login/".to_string(),
            register_path: "/api/accounts/register/".to_string(),
            renew_path: "/api/token/refresh/".to_string(),
            profile_path: "/api/accounts/users/me/".to_string(),
            warning_lead_secs: 60,
            inactivity_timeout_secs: 900,
            expiry_skew_secs: 30,
            renewal_retries: 1,
            renewal_backoff_ms: 500,
            request_timeout_secs: 30,
            storage: StorageKind::Keyring,
            last_email: None,
        }
    }
}

/// Timing knobs consumed by the session components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub warning_lead: Duration,
    pub inactivity_timeout: Duration,
    pub expiry_skew_secs: i64,
    pub renewal_retries: u32,
    pub renewal_backoff: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Config::default().session_settings()
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        Ok(config.with_env_overrides())
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `TOKENWARD_BASE_URL` and `TOKENWARD_STORAGE` if set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("TOKENWARD_BASE_URL") {
            self.base_url = url;
        }
        if let Ok(storage) = std::env::var("TOKENWARD_STORAGE") {
            match storage.to_ascii_lowercase().as_str() {
                "keyring" => self.storage = StorageKind::Keyring,
                "file" => self.storage = StorageKind::File,
                other => warn!(value = other, "Ignoring unknown TOKENWARD_STORAGE"),
            }
        }
        self
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            warning_lead: Duration::from_secs(self.warning_lead_secs),
            inactivity_timeout: Duration::from_secs(self.inactivity_timeout_secs),
            expiry_skew_secs: self.expiry_skew_secs,
            renewal_retries: self.renewal_retries,
            renewal_backoff: Duration::from_millis(self.renewal_backoff_ms),
        }
    }

    /// Build the persistence backend selected by `storage`.
    pub fn credential_backend(&self) -> Result<Box<dyn CredentialBackend>> {
        let backend: Box<dyn CredentialBackend> = match self.storage {
            StorageKind::Keyring => Box::new(KeyringBackend::new(APP_NAME)),
            StorageKind::File => Box::new(FileBackend::new(self.cache_dir()?.join(CREDENTIALS_FILE))),
        };
        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"base_url": "https://example.test", "storage": "file"}"#)
                .expect("partial config should parse");
        assert_eq!(config.base_url, "https://example.test");
        assert_eq!(config.storage, StorageKind::File);
        assert_eq!(config.renew_path, "/api/token/refresh/");
        assert_eq!(config.inactivity_timeout_secs, 900);
    }

    #[test]
    fn test_session_settings_projection() {
        let settings = Config::default().session_settings();
        assert_eq!(settings.warning_lead, Duration::from_secs(60));
        assert_eq!(settings.inactivity_timeout, Duration::from_secs(900));
        assert_eq!(settings.renewal_retries, 1);
        assert_eq!(settings.renewal_backoff, Duration::from_millis(500));
    }
}
