use crate::config::write_private;
use crate::error::{Result, UploaderError};
use crate::youtube_client::{GOOGLE_AUTH_URI, GOOGLE_TOKEN_URI};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// OAuth client credentials as downloaded from the Google Cloud console.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

// The console wraps the credentials in "installed" (desktop app) or "web"
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl ClientSecrets {
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(UploaderError::NotFound(format!(
                "Client secrets file {}",
                path.display()
            )));
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(raw)
            .map_err(|e| UploaderError::Config(format!("Invalid client secrets file: {}", e)))?;

        let secrets = file.installed.or(file.web).ok_or_else(|| {
            UploaderError::Config(
                "Client secrets file has neither an \"installed\" nor a \"web\" section".to_string(),
            )
        })?;

        if secrets.client_id.trim().is_empty() || secrets.client_secret.trim().is_empty() {
            return Err(UploaderError::Config(
                "Client secrets file is missing client_id or client_secret".to_string(),
            ));
        }
        Ok(secrets)
    }

    /// Write in the console's format so the file can be re-read later. Only
    /// the owner can read it.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&serde_json::json!({ "installed": self }))?;
        write_private(path, json.as_bytes())
    }
}
