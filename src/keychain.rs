// Secrets in the OS keychain, with a private file when no keychain is usable

use crate::config::write_private;
use crate::error::{Result, UploaderError};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub const KEYCHAIN_SERVICE: &str = "YoutubeShortUploader";

/// One service namespace in the platform credential store.
#[derive(Debug, Clone)]
pub struct Keychain {
    service: String,
}

impl Keychain {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, name: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, name).map_err(keychain_error)
    }

    pub fn get(&self, name: &str) -> Result<Option<String>> {
        match self.entry(name)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(keychain_error(e)),
        }
    }

    pub fn set(&self, name: &str, secret: &str) -> Result<()> {
        self.entry(name)?.set_password(secret).map_err(keychain_error)
    }

    /// Returns whether an entry existed.
    pub fn delete(&self, name: &str) -> Result<bool> {
        match self.entry(name)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(keychain_error(e)),
        }
    }
}

fn keychain_error(e: keyring::Error) -> UploaderError {
    UploaderError::Keychain(e.to_string())
}

/// Named secrets kept in the keychain when one is configured and working,
/// otherwise in a JSON file readable only by the owner.
#[derive(Debug, Clone)]
pub struct SecretStore {
    keychain: Option<Keychain>,
    fallback: PathBuf,
}

impl SecretStore {
    pub fn new(keychain: Option<Keychain>, fallback: impl Into<PathBuf>) -> Self {
        Self {
            keychain,
            fallback: fallback.into(),
        }
    }

    pub fn file_only(fallback: impl Into<PathBuf>) -> Self {
        Self::new(None, fallback)
    }

    pub fn fallback_path(&self) -> &Path {
        &self.fallback
    }

    pub fn get(&self, name: &str) -> Result<Option<String>> {
        if let Some(keychain) = &self.keychain {
            match keychain.get(name) {
                Ok(Some(secret)) => return Ok(Some(secret)),
                Ok(None) => {}
                Err(e) => tracing::warn!("Keychain read failed for {}, trying the credentials file: {}", name, e),
            }
        }
        Ok(self
            .read_file()?
            .get(name)
            .and_then(Value::as_str)
            .map(String::from))
    }

    pub fn set(&self, name: &str, secret: &str) -> Result<()> {
        if let Some(keychain) = &self.keychain {
            match keychain.set(name, secret) {
                Ok(()) => {
                    // drop any older plain-file copy
                    self.remove_from_file(name)?;
                    tracing::debug!("Stored {} in the keychain", name);
                    return Ok(());
                }
                Err(e) => tracing::warn!("Keychain unavailable, storing {} in {}: {}", name, self.fallback.display(), e),
            }
        }

        let mut secrets = self.read_file()?;
        secrets.insert(name.to_string(), Value::String(secret.to_string()));
        self.write_file(&secrets)
    }

    /// Remove from both places. Returns whether anything was stored.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let mut removed = false;
        if let Some(keychain) = &self.keychain {
            match keychain.delete(name) {
                Ok(existed) => removed |= existed,
                Err(e) => tracing::warn!("Keychain delete failed for {}: {}", name, e),
            }
        }
        Ok(self.remove_from_file(name)? || removed)
    }

    fn remove_from_file(&self, name: &str) -> Result<bool> {
        let mut secrets = self.read_file()?;
        if secrets.remove(name).is_none() {
            return Ok(false);
        }
        self.write_file(&secrets)?;
        Ok(true)
    }

    fn read_file(&self) -> Result<Map<String, Value>> {
        if !self.fallback.exists() {
            return Ok(Map::new());
        }
        let raw = std::fs::read_to_string(&self.fallback)?;
        match serde_json::from_str(&raw) {
            Ok(Value::Object(secrets)) => Ok(secrets),
            _ => {
                tracing::warn!("Ignoring unreadable credentials file {}", self.fallback.display());
                Ok(Map::new())
            }
        }
    }

    fn write_file(&self, secrets: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.fallback.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_private(&self.fallback, &serde_json::to_vec_pretty(secrets)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_fallback_set_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecretStore::file_only(dir.path().join("credentials.json"));

        assert_eq!(store.get("openai_api_key").unwrap(), None);
        store.set("openai_api_key", "sk-one").unwrap();
        store.set("anthropic_api_key", "sk-two").unwrap();
        store.set("openai_api_key", "sk-three").unwrap();

        assert_eq!(store.get("openai_api_key").unwrap().as_deref(), Some("sk-three"));
        assert!(store.delete("openai_api_key").unwrap());
        assert!(!store.delete("openai_api_key").unwrap());
        assert_eq!(store.get("anthropic_api_key").unwrap().as_deref(), Some("sk-two"));
    }

    #[cfg(unix)]
    #[test]
    fn test_credentials_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = SecretStore::file_only(dir.path().join("credentials.json"));
        store.set("token:acc", "{}").unwrap();

        let mode = std::fs::metadata(store.fallback_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_unreadable_credentials_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let store = SecretStore::file_only(&path);
        assert_eq!(store.get("anything").unwrap(), None);
        store.set("anything", "value").unwrap();
        assert_eq!(store.get("anything").unwrap().as_deref(), Some("value"));
    }
}
