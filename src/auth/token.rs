use crate::config::write_private;
use crate::error::Result;
use crate::keychain::Keychain;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Persisted OAuth credential for one account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredToken {
    /// Access token
    pub token: String,
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// True when the token is already expired or will be within `margin`.
    /// Tokens without a known expiry are treated as expired.
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry <= now + margin,
            None => true,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().map_or(false, |t| !t.is_empty())
    }
}

/// One JSON file per account under the tokens directory, or one keychain
/// entry per account when a keychain is attached.
#[derive(Debug, Clone)]
pub struct TokenStore {
    dir: PathBuf,
    keychain: Option<Keychain>,
}

impl TokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            keychain: None,
        }
    }

    /// Keep tokens in `keychain`, falling back to the token files when it fails.
    pub fn with_keychain(mut self, keychain: Keychain) -> Self {
        self.keychain = Some(keychain);
        self
    }

    pub fn path(&self, account_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", account_id))
    }

    fn keychain_name(account_id: &str) -> String {
        format!("oauth_token:{}", account_id)
    }

    pub fn load(&self, account_id: &str) -> Result<Option<StoredToken>> {
        if let Some(keychain) = &self.keychain {
            match keychain.get(&Self::keychain_name(account_id)) {
                Ok(Some(raw)) => match serde_json::from_str(&raw) {
                    Ok(token) => return Ok(Some(token)),
                    Err(e) => tracing::warn!("Ignoring unreadable keychain token for {}: {}", account_id, e),
                },
                Ok(None) => {}
                Err(e) => tracing::warn!("Keychain read failed for {}, trying the token file: {}", account_id, e),
            }
        }

        let path = self.path(account_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        match serde_json::from_str(&raw) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                tracing::warn!("Ignoring unreadable token file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, account_id: &str, token: &StoredToken) -> Result<()> {
        let path = self.path(account_id);

        if let Some(keychain) = &self.keychain {
            match keychain.set(&Self::keychain_name(account_id), &serde_json::to_string(token)?) {
                Ok(()) => {
                    if path.exists() {
                        std::fs::remove_file(&path)?;
                    }
                    tracing::debug!("Token for {} saved to the keychain", account_id);
                    return Ok(());
                }
                Err(e) => tracing::warn!("Keychain unavailable, saving token to {}: {}", path.display(), e),
            }
        }

        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_vec_pretty(token)?;
        write_private(&path, &json)?;
        tracing::debug!("Token saved to {}", path.display());
        Ok(())
    }

    /// Returns whether a stored token was removed.
    pub fn delete(&self, account_id: &str) -> Result<bool> {
        let mut removed = false;
        if let Some(keychain) = &self.keychain {
            match keychain.delete(&Self::keychain_name(account_id)) {
                Ok(existed) => removed = existed,
                Err(e) => tracing::warn!("Keychain delete failed for {}: {}", account_id, e),
            }
        }

        let path = self.path(account_id);
        if path.exists() {
            std::fs::remove_file(&path)?;
            removed = true;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expiry: Option<DateTime<Utc>>) -> StoredToken {
        StoredToken {
            token: "ya29.access".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec!["https://www.googleapis.com/auth/youtube.upload".to_string()],
            expiry,
        }
    }

    #[test]
    fn test_expires_within_margin() {
        let now = Utc::now();
        let margin = Duration::minutes(5);
        assert!(!token(Some(now + Duration::minutes(30))).expires_within(margin, now));
        assert!(token(Some(now + Duration::minutes(4))).expires_within(margin, now));
        assert!(token(None).expires_within(margin, now));
    }

    #[test]
    fn test_store_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens"));
        let saved = token(Some(Utc::now()));

        assert!(store.load("acc").unwrap().is_none());
        store.save("acc", &saved).unwrap();
        assert_eq!(store.load("acc").unwrap(), Some(saved));

        assert!(store.delete("acc").unwrap());
        assert!(!store.delete("acc").unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());
        store.save("acc", &token(None)).unwrap();

        let mode = std::fs::metadata(store.path("acc")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_unreadable_token_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path());
        std::fs::write(store.path("acc"), "garbage").unwrap();
        assert!(store.load("acc").unwrap().is_none());
    }
}
