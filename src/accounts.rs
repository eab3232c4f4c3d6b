// YouTube accounts known to the uploader, persisted in accounts.json

use crate::error::{Result, UploaderError};
use crate::youtube_client::YouTubeChannel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub authenticated: bool,
    pub channel_id: Option<String>,
    pub channel_title: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<Account>,
    current_account: Option<String>,
}

pub struct AccountStore {
    path: PathBuf,
    accounts: Vec<Account>,
    current: Option<String>,
}

impl AccountStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str::<AccountsFile>(&raw).map_err(|e| {
                UploaderError::Config(format!("Invalid accounts file {}: {}", path.display(), e))
            })?
        } else {
            AccountsFile::default()
        };

        // A dangling current id falls back to the first account
        let current = match file.current_account {
            Some(id) if file.accounts.iter().any(|a| a.id == id) => Some(id),
            _ => file.accounts.first().map(|a| a.id.clone()),
        };

        tracing::debug!("Loaded {} accounts from {}", file.accounts.len(), path.display());
        Ok(Self {
            path,
            accounts: file.accounts,
            current,
        })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = AccountsFile {
            accounts: self.accounts.clone(),
            current_account: self.current.clone(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    pub fn list(&self) -> &[Account] {
        &self.accounts
    }

    pub fn get(&self, id: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }

    pub fn current(&self) -> Option<&Account> {
        self.current.as_deref().and_then(|id| self.get(id))
    }

    /// Find an account by id, or by case-insensitive name.
    pub fn resolve(&self, id_or_name: &str) -> Result<&Account> {
        self.get(id_or_name)
            .or_else(|| {
                self.accounts
                    .iter()
                    .find(|a| a.name.eq_ignore_ascii_case(id_or_name))
            })
            .ok_or_else(|| UploaderError::NotFound(format!("Account '{}'", id_or_name)))
    }

    /// Explicit selection, else the current account.
    pub fn resolve_or_current(&self, id_or_name: Option<&str>) -> Result<&Account> {
        match id_or_name {
            Some(key) => self.resolve(key),
            None => self.current().ok_or_else(|| {
                UploaderError::NotFound(
                    "Current account (add one with `shorts-uploader accounts add <name>`)".to_string(),
                )
            }),
        }
    }

    pub fn add(&mut self, name: &str) -> Result<Account> {
        let name = valid_name(name)?;

        let account = Account {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            authenticated: false,
            channel_id: None,
            channel_title: None,
        };
        self.accounts.push(account.clone());
        if self.accounts.len() == 1 {
            self.current = Some(account.id.clone());
        }
        self.save()?;

        tracing::info!("Added account: {} ({})", account.name, account.id);
        Ok(account)
    }

    /// Remove an account. If it was current, the next account becomes
    /// current (the first one when the removed account was last).
    pub fn remove(&mut self, id: &str) -> Result<Account> {
        let index = self
            .accounts
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| UploaderError::NotFound(format!("Account '{}'", id)))?;

        if self.current.as_deref() == Some(id) {
            self.current = if self.accounts.len() > 1 {
                let next = if index == self.accounts.len() - 1 { 0 } else { index + 1 };
                Some(self.accounts[next].id.clone())
            } else {
                None
            };
        }

        let removed = self.accounts.remove(index);
        self.save()?;
        tracing::info!("Removed account: {} ({})", removed.name, removed.id);
        Ok(removed)
    }

    pub fn set_current(&mut self, id: &str) -> Result<()> {
        if self.get(id).is_none() {
            return Err(UploaderError::NotFound(format!("Account '{}'", id)));
        }
        self.current = Some(id.to_string());
        self.save()?;
        tracing::info!("Current account set to {}", id);
        Ok(())
    }

    pub fn rename(&mut self, id: &str, name: &str) -> Result<()> {
        let name = valid_name(name)?;
        let account = self.get_mut(id)?;
        account.name = name.to_string();
        self.save()
    }

    pub fn mark_authenticated(&mut self, id: &str, channel: Option<&YouTubeChannel>) -> Result<()> {
        let account = self.get_mut(id)?;
        account.authenticated = true;
        if let Some(channel) = channel {
            account.channel_id = Some(channel.id.clone());
            account.channel_title = Some(channel.title.clone());
        }
        self.save()
    }

    pub fn mark_signed_out(&mut self, id: &str) -> Result<()> {
        let account = self.get_mut(id)?;
        account.authenticated = false;
        self.save()
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Account> {
        self.accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| UploaderError::NotFound(format!("Account '{}'", id)))
    }
}

fn valid_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(UploaderError::Config("Account name cannot be empty".to_string()));
    }
    Ok(name)
}
