// Application settings and on-disk layout of the config directory

use crate::auth::TokenStore;
use crate::error::{Result, UploaderError};
use crate::keychain::{Keychain, SecretStore, KEYCHAIN_SERVICE};
use crate::shorts::Privacy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const CONFIG_DIR_NAME: &str = ".youtube_shorts_uploader";
pub const HOME_ENV: &str = "SHORTS_UPLOADER_HOME";

/// Locations of every file the uploader reads or writes.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
}

impl AppPaths {
    /// Explicit override first, then `SHORTS_UPLOADER_HOME`, then `~/.youtube_shorts_uploader`.
    pub fn resolve(override_dir: Option<&Path>) -> Self {
        let config_dir = match override_dir {
            Some(dir) => dir.to_path_buf(),
            None => match std::env::var(HOME_ENV) {
                Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
                _ => dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(CONFIG_DIR_NAME),
            },
        };
        Self { config_dir }
    }

    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(self.tokens_dir())?;
        Ok(())
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    pub fn accounts_file(&self) -> PathBuf {
        self.config_dir.join("accounts.json")
    }

    pub fn schedule_file(&self) -> PathBuf {
        self.config_dir.join("scheduled_uploads.json")
    }

    pub fn history_file(&self) -> PathBuf {
        self.config_dir.join("upload_history.json")
    }

    pub fn tokens_dir(&self) -> PathBuf {
        self.config_dir.join("tokens")
    }

    pub fn token_file(&self, account_id: &str) -> PathBuf {
        self.tokens_dir().join(format!("{}.json", account_id))
    }

    pub fn client_secrets_file(&self, account_id: &str) -> PathBuf {
        self.config_dir
            .join(format!("client_secrets_{}.json", account_id))
    }

    /// Secrets that could not go to the keychain.
    pub fn credentials_file(&self) -> PathBuf {
        self.config_dir.join("credentials.json")
    }

    pub fn secret_store(&self, settings: &Settings) -> SecretStore {
        SecretStore::new(settings.keychain(), self.credentials_file())
    }

    pub fn token_store(&self, settings: &Settings) -> TokenStore {
        let store = TokenStore::new(self.tokens_dir());
        match settings.keychain() {
            Some(keychain) => store.with_keychain(keychain),
            None => store,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiKeys {
    #[serde(default)]
    pub openai: String,
    #[serde(default)]
    pub anthropic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub privacy_status: String,
    pub category_id: String,
    pub max_title_length: usize,
    pub style_prompt: String,
    pub video_extensions: Vec<String>,
    pub delete_after_upload: bool,
    pub notify_subscribers: bool,
    pub made_for_kids: bool,
    pub ai_provider: String,
    pub openai_model: String,
    pub anthropic_model: String,
    pub api_keys: ApiKeys,
    pub check_interval_secs: u64,
    pub max_upload_attempts: u32,
    pub alternatives: usize,
    /// Keep API keys and OAuth tokens in the OS keychain.
    pub use_keychain: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            privacy_status: "public".to_string(),
            category_id: "22".to_string(), // People & Blogs
            max_title_length: 100,
            style_prompt: String::new(),
            video_extensions: [".mp4", ".mov", ".avi", ".mkv", ".webm"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            delete_after_upload: false,
            notify_subscribers: true,
            made_for_kids: false,
            ai_provider: "openai".to_string(),
            openai_model: "gpt-3.5-turbo".to_string(),
            anthropic_model: "claude-sonnet-4-5".to_string(),
            api_keys: ApiKeys::default(),
            check_interval_secs: 300,
            max_upload_attempts: 3,
            alternatives: 3,
            // the Linux kernel keyring is emptied on reboot
            use_keychain: cfg!(any(target_os = "macos", target_os = "windows")),
        }
    }
}

impl Settings {
    /// Stored key, overridden by `OPENAI_API_KEY` when set.
    pub fn openai_api_key(&self) -> Option<String> {
        env_or_stored("OPENAI_API_KEY", &self.api_keys.openai)
    }

    /// Stored key, overridden by `ANTHROPIC_API_KEY` when set.
    pub fn anthropic_api_key(&self) -> Option<String> {
        env_or_stored("ANTHROPIC_API_KEY", &self.api_keys.anthropic)
    }

    pub fn keychain(&self) -> Option<Keychain> {
        self.use_keychain.then(|| Keychain::new(KEYCHAIN_SERVICE))
    }

    /// Checks that serde alone cannot express.
    pub fn validate(&self) -> Result<()> {
        self.privacy_status.parse::<Privacy>()?;
        Ok(())
    }
}

/// Names of the API keys in the secret store.
const OPENAI_SECRET: &str = "openai_api_key";
const ANTHROPIC_SECRET: &str = "anthropic_api_key";

fn env_or_stored(var: &str, stored: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Some(key),
        _ if !stored.trim().is_empty() => Some(stored.to_string()),
        _ => None,
    }
}

/// JSON-backed settings with default back-filling. With a secret store
/// attached, API keys live there and are blanked in the JSON file.
pub struct ConfigManager {
    path: PathBuf,
    settings: Settings,
    secrets: Option<SecretStore>,
}

impl ConfigManager {
    /// Read the file, replacing missing or invalid keys with their defaults.
    /// The file is rewritten whenever something had to be replaced.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let defaults = serde_json::to_value(Settings::default())?;

        if !path.exists() {
            tracing::info!("Config file not found, creating default at {}", path.display());
            let manager = Self::with_settings(path, Settings::default());
            manager.save()?;
            return Ok(manager);
        }

        let raw = std::fs::read_to_string(&path)?;
        let mut stored = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(stored)) => stored,
            Ok(_) | Err(_) => {
                let backup = path.with_extension("json.corrupt");
                tracing::error!(
                    "Config file {} is not a JSON object, moving it to {} and using defaults",
                    path.display(),
                    backup.display()
                );
                std::fs::rename(&path, &backup)?;
                let manager = Self::with_settings(path, Settings::default());
                manager.save()?;
                return Ok(manager);
            }
        };

        let mut updated = fill_missing(&mut stored, &defaults);
        let (settings, reset) = merge_valid(&stored, &defaults)?;
        for key in &reset {
            tracing::warn!("Invalid value for '{}' in {}, using the default", key, path.display());
        }
        updated |= !reset.is_empty();

        let manager = Self::with_settings(path, settings);
        if updated {
            tracing::info!("Updated config with missing default fields");
            manager.save()?;
        }
        tracing::debug!("Config loaded from {}", manager.path.display());
        Ok(manager)
    }

    /// Load the config in `paths` and attach the secret store it selects.
    pub fn open(paths: &AppPaths) -> Result<Self> {
        let mut manager = Self::load(paths.config_file())?;
        let secrets = paths.secret_store(&manager.settings);
        manager.attach_secrets(secrets)?;
        Ok(manager)
    }

    fn with_settings(path: PathBuf, settings: Settings) -> Self {
        Self {
            path,
            settings,
            secrets: None,
        }
    }

    /// Fill API keys from `secrets`. Keys still written in the JSON file
    /// are moved into the store.
    pub fn attach_secrets(&mut self, secrets: SecretStore) -> Result<()> {
        let mut moved = false;
        let keys = &mut self.settings.api_keys;
        for (name, slot) in [(OPENAI_SECRET, &mut keys.openai), (ANTHROPIC_SECRET, &mut keys.anthropic)] {
            if !slot.trim().is_empty() {
                secrets.set(name, slot)?;
                moved = true;
            } else if let Some(secret) = secrets.get(name)? {
                *slot = secret;
            }
        }

        self.secrets = Some(secrets);
        if moved {
            tracing::info!("Moved API keys out of {}", self.path.display());
            self.save()?;
        }
        Ok(())
    }

    fn store_api_keys(&self) -> Result<()> {
        let Some(secrets) = &self.secrets else {
            return Ok(());
        };
        let keys = &self.settings.api_keys;
        for (name, value) in [(OPENAI_SECRET, &keys.openai), (ANTHROPIC_SECRET, &keys.anthropic)] {
            if value.trim().is_empty() {
                secrets.delete(name)?;
            } else {
                secrets.set(name, value)?;
            }
        }
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a value by key; nested keys use dots (`api_keys.openai`).
    pub fn get(&self, key: &str) -> Result<Value> {
        let value = serde_json::to_value(&self.settings)?;
        key.split('.')
            .try_fold(&value, |node, part| node.get(part))
            .cloned()
            .ok_or_else(|| UploaderError::NotFound(format!("Config key '{}'", key)))
    }

    /// Set a value from its command-line form. JSON literals are accepted,
    /// anything else is stored as a string.
    pub fn set(&mut self, key: &str, raw_value: &str) -> Result<()> {
        let new_value = serde_json::from_str::<Value>(raw_value)
            .unwrap_or_else(|_| Value::String(raw_value.to_string()));

        let mut root = serde_json::to_value(&self.settings)?;
        {
            let mut node = &mut root;
            let parts: Vec<&str> = key.split('.').collect();
            for part in &parts[..parts.len() - 1] {
                node = node
                    .get_mut(*part)
                    .ok_or_else(|| UploaderError::NotFound(format!("Config key '{}'", key)))?;
            }
            let last = parts[parts.len() - 1];
            let slot = node
                .get_mut(last)
                .ok_or_else(|| UploaderError::NotFound(format!("Config key '{}'", key)))?;
            *slot = coerce_like(&*slot, new_value);
        }

        let settings: Settings = serde_json::from_value(root)
            .map_err(|e| UploaderError::Config(format!("Invalid value for '{}': {}", key, e)))?;
        settings.validate()?;
        self.settings = settings;
        if key.starts_with("api_keys") {
            self.store_api_keys()?;
        }
        self.save()?;
        tracing::info!("Config updated: {}", key);
        Ok(())
    }

    pub fn reset(&mut self) -> Result<()> {
        self.settings = Settings::default();
        self.store_api_keys()?;
        self.save()?;
        tracing::info!("Config reset to default");
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut value = serde_json::to_value(&self.settings)?;
        if self.secrets.is_some() {
            value["api_keys"] = serde_json::to_value(ApiKeys::default())?;
        }
        write_private(&self.path, &serde_json::to_vec_pretty(&value)?)
    }
}

/// Settings built from `stored`, keeping each top-level key only when it is
/// valid on its own. Also returns the keys that fell back to the default.
fn merge_valid(stored: &Map<String, Value>, defaults: &Value) -> Result<(Settings, Vec<String>)> {
    let mut merged = defaults.clone();
    let mut reset = Vec::new();

    if let Value::Object(defaults) = defaults {
        for key in defaults.keys() {
            let Some(value) = stored.get(key) else {
                continue;
            };
            let mut candidate = merged.clone();
            candidate[key.as_str()] = value.clone();
            let valid = serde_json::from_value::<Settings>(candidate)
                .map(|settings| settings.validate().is_ok())
                .unwrap_or(false);
            if valid {
                merged[key.as_str()] = value.clone();
            } else {
                reset.push(key.clone());
            }
        }
    }

    Ok((serde_json::from_value(merged)?, reset))
}

/// Write a file only the owner can read.
#[cfg(unix)]
pub(crate) fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(contents)?;
    Ok(())
}

/// Copy every default key missing from `target`. Returns whether anything changed.
fn fill_missing(target: &mut Map<String, Value>, defaults: &Value) -> bool {
    let Value::Object(defaults) = defaults else {
        return false;
    };
    let mut updated = false;
    for (key, default) in defaults {
        match target.get_mut(key) {
            Some(Value::Object(existing)) => updated |= fill_missing(existing, default),
            Some(_) => {}
            None => {
                target.insert(key.clone(), default.clone());
                updated = true;
            }
        }
    }
    updated
}

// "22" typed on the command line parses as a number; keep string slots strings.
fn coerce_like(existing: &Value, new_value: Value) -> Value {
    match (existing, &new_value) {
        (Value::String(_), Value::Number(n)) => Value::String(n.to_string()),
        (Value::String(_), Value::Bool(b)) => Value::String(b.to_string()),
        _ => new_value,
    }
}
