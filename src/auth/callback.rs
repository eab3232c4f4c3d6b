// Loopback redirect receiver for the installed-app OAuth flow

use crate::error::{Result, UploaderError};
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};

/// PKCE verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = Self::challenge_for(&verifier);
        Self { verifier, challenge }
    }

    pub fn challenge_for(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }
}

/// Random value echoed back by Google to tie the redirect to this login attempt.
pub fn random_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Shared with the handler: the expected `state` and where to deliver the
/// first redirect that carries it.
struct CallbackState {
    expected_state: String,
    sender: Mutex<Option<oneshot::Sender<CallbackQuery>>>,
}

/// A one-shot HTTP listener on 127.0.0.1 that captures the authorization code.
pub struct OAuthCallback {
    listener: TcpListener,
    redirect_uri: String,
}

impl OAuthCallback {
    /// Bind an ephemeral loopback port.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            redirect_uri: format!("http://127.0.0.1:{}/", port),
        })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Serve until a redirect carrying `expected_state` arrives, then return
    /// its code. Requests with another state or without a code or error are
    /// answered and ignored.
    pub async fn wait_for_code(self, expected_state: &str, timeout: Duration) -> Result<String> {
        let (code_tx, code_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let state = Arc::new(CallbackState {
            expected_state: expected_state.to_string(),
            sender: Mutex::new(Some(code_tx)),
        });

        let app = Router::new()
            .route("/", get(handle_redirect))
            .with_state(state);

        let listener = self.listener;
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_rx.await.ok();
                })
                .await
        });

        let received = tokio::time::timeout(timeout, code_rx).await;
        let _ = shutdown_tx.send(());
        if let Err(e) = server.await {
            tracing::debug!("OAuth callback server task ended abnormally: {}", e);
        }

        let query = match received {
            Ok(Ok(query)) => query,
            Ok(Err(_)) => return Err(UploaderError::Auth("OAuth callback server stopped".to_string())),
            Err(_) => {
                return Err(UploaderError::Auth(format!(
                    "Timed out after {}s waiting for the browser redirect",
                    timeout.as_secs()
                )))
            }
        };

        if let Some(error) = query.error {
            return Err(UploaderError::Auth(format!("Authorization denied: {}", error)));
        }
        query
            .code
            .ok_or_else(|| UploaderError::Auth("Missing authorization code".to_string()))
    }
}

async fn handle_redirect(
    State(state): State<Arc<CallbackState>>,
    Query(query): Query<CallbackQuery>,
) -> Html<String> {
    if query.state.as_deref() != Some(state.expected_state.as_str()) {
        tracing::warn!("Ignoring OAuth redirect with a missing or mismatched state");
        return Html("<h1>Invalid login request</h1><p>Still waiting for the authorization redirect.</p>".to_string());
    }

    let page = match (&query.error, &query.code) {
        (Some(error), _) => format!(
            "<!DOCTYPE html><html><head><title>Authorization Failed</title></head>\
             <body><h1>❌ Authorization Failed</h1><p>Error: {}</p></body></html>",
            html_escape(error)
        ),
        (None, Some(_)) => "<!DOCTYPE html><html><head><title>Authorized</title></head>\
             <body><h1>✅ Authorization complete</h1><p>You can close this window.</p></body></html>"
            .to_string(),
        (None, None) => return Html("<h1>Missing authorization code</h1>".to_string()),
    };

    if let Some(tx) = state.sender.lock().await.take() {
        let _ = tx.send(query);
    }
    Html(page)
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
