// OAuth credentials for YouTube: client secrets, token file and refresh

pub mod callback;
pub mod secrets;
pub mod token;

pub use callback::{random_state, OAuthCallback, PkcePair};
pub use secrets::ClientSecrets;
pub use token::{StoredToken, TokenStore};

use crate::error::{Result, UploaderError};
use crate::youtube_client::{build_oauth_url, YouTubeClient};
use chrono::{Duration, Utc};
use std::time::Duration as StdDuration;

pub const YOUTUBE_SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/youtube.upload",
    "https://www.googleapis.com/auth/youtube",
    "https://www.googleapis.com/auth/youtube.readonly",
];

/// Tokens expiring within this window are refreshed before use.
const REFRESH_MARGIN_MINUTES: i64 = 5;
const LOGIN_TIMEOUT: StdDuration = StdDuration::from_secs(300);

/// Token lifecycle for a single account.
#[derive(Debug, Clone)]
pub struct AuthManager {
    client: YouTubeClient,
    store: TokenStore,
    account_id: String,
}

impl AuthManager {
    pub fn new(client: YouTubeClient, store: TokenStore, account_id: impl Into<String>) -> Self {
        Self {
            client,
            store,
            account_id: account_id.into(),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// A stored token that is still usable or can be refreshed.
    pub fn is_authenticated(&self) -> bool {
        match self.store.load(&self.account_id) {
            Ok(Some(token)) => {
                token.can_refresh() || !token.expires_within(Duration::zero(), Utc::now())
            }
            _ => false,
        }
    }

    pub fn stored_token(&self) -> Result<Option<StoredToken>> {
        self.store.load(&self.account_id)
    }

    /// Reuse or refresh the stored token, falling back to the browser consent flow.
    pub async fn authorize(&self, secrets: &ClientSecrets) -> Result<StoredToken> {
        if let Some(token) = self.store.load(&self.account_id)? {
            if !token.expires_within(Duration::minutes(REFRESH_MARGIN_MINUTES), Utc::now()) {
                tracing::info!("Using existing credentials for account {}", self.account_id);
                return Ok(token);
            }
            if token.can_refresh() {
                match self.refresh(token).await {
                    Ok(token) => return Ok(token),
                    Err(UploaderError::Auth(reason)) => {
                        tracing::warn!("Stored refresh token rejected ({}), starting a new login", reason);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        self.run_consent_flow(secrets).await
    }

    async fn run_consent_flow(&self, secrets: &ClientSecrets) -> Result<StoredToken> {
        let callback = OAuthCallback::bind().await?;
        let redirect_uri = callback.redirect_uri().to_string();
        let pkce = PkcePair::generate();
        let state = random_state();

        let url = build_oauth_url(
            &secrets.auth_uri,
            &secrets.client_id,
            &redirect_uri,
            &YOUTUBE_SCOPES,
            &state,
            &pkce.challenge,
        );

        tracing::info!("🔐 Waiting for Google authorization on {}", redirect_uri);
        println!("Open this URL in your browser to authorize the uploader:\n\n{}\n", url);

        let code = callback.wait_for_code(&state, LOGIN_TIMEOUT).await?;

        let grant = self
            .client
            .exchange_code_for_token(
                &secrets.token_uri,
                &code,
                &secrets.client_id,
                &secrets.client_secret,
                &redirect_uri,
                &pkce.verifier,
            )
            .await?;

        let token = StoredToken {
            token: grant.access_token,
            refresh_token: grant.refresh_token,
            token_uri: secrets.token_uri.clone(),
            client_id: secrets.client_id.clone(),
            client_secret: secrets.client_secret.clone(),
            scopes: grant
                .scope
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_else(|| YOUTUBE_SCOPES.iter().map(|s| s.to_string()).collect()),
            expiry: Some(Utc::now() + Duration::seconds(grant.expires_in)),
        };

        if !token.can_refresh() {
            tracing::warn!("Google returned no refresh token; you will need to log in again when it expires");
        }

        self.store.save(&self.account_id, &token)?;
        tracing::info!("✅ Authorization stored for account {}", self.account_id);
        Ok(token)
    }

    /// An access token valid for at least five more minutes.
    pub async fn access_token(&self) -> Result<String> {
        let token = self.store.load(&self.account_id)?.ok_or_else(|| {
            UploaderError::Auth(format!(
                "Account '{}' is not authenticated. Run `shorts-uploader auth login` first",
                self.account_id
            ))
        })?;

        if !token.expires_within(Duration::minutes(REFRESH_MARGIN_MINUTES), Utc::now()) {
            return Ok(token.token);
        }

        tracing::info!("🔄 Access token expired or expiring soon, refreshing...");
        Ok(self.refresh(token).await?.token)
    }

    async fn refresh(&self, token: StoredToken) -> Result<StoredToken> {
        let refresh_token = token
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                UploaderError::Auth(
                    "Token expired and no refresh token is stored. Run `shorts-uploader auth login` again"
                        .to_string(),
                )
            })?;

        let refreshed = self
            .client
            .refresh_access_token(&token.token_uri, &refresh_token, &token.client_id, &token.client_secret)
            .await?;

        let updated = StoredToken {
            token: refreshed.access_token,
            refresh_token: refreshed.refresh_token.or(Some(refresh_token)),
            expiry: Some(Utc::now() + Duration::seconds(refreshed.expires_in)),
            ..token
        };

        self.store.save(&self.account_id, &updated)?;
        tracing::info!("✅ Token refreshed for account {}", self.account_id);
        Ok(updated)
    }

    /// Revoke the grant with Google (best effort) and delete the token file.
    pub async fn revoke(&self) -> Result<bool> {
        let Some(token) = self.store.load(&self.account_id)? else {
            return Ok(false);
        };

        let to_revoke = token.refresh_token.as_deref().unwrap_or(&token.token);
        if let Err(e) = self.client.revoke_token(to_revoke).await {
            tracing::warn!("Token revocation failed, deleting local token anyway: {}", e);
        }

        self.store.delete(&self.account_id)
    }
}
