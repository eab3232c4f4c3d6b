// Language model seam used by metadata generation

use crate::claude_client::ClaudeClient;
use crate::config::Settings;
use crate::error::Result;
use crate::openai_client::OpenAiClient;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider/model label for logs.
    fn name(&self) -> String;

    /// Single-turn completion. `json_output` asks providers that support it
    /// to constrain the reply to JSON.
    async fn complete(&self, system: &str, user: &str, json_output: bool) -> Result<String>;
}

/// The configured provider, or whichever one has a key when it does not.
pub fn language_model_from_settings(settings: &Settings) -> Option<Arc<dyn LanguageModel>> {
    let openai = || {
        settings
            .openai_api_key()
            .map(|key| Arc::new(OpenAiClient::new(key, &settings.openai_model)) as Arc<dyn LanguageModel>)
    };
    let anthropic = || {
        settings
            .anthropic_api_key()
            .map(|key| Arc::new(ClaudeClient::new(key, &settings.anthropic_model)) as Arc<dyn LanguageModel>)
    };

    let model = match settings.ai_provider.to_lowercase().as_str() {
        "anthropic" | "claude" => anthropic().or_else(|| {
            tracing::warn!("ai_provider is anthropic but no Anthropic key is set, trying OpenAI");
            openai()
        }),
        _ => openai().or_else(|| {
            if settings.ai_provider.to_lowercase() != "openai" {
                tracing::warn!("Unknown ai_provider '{}', using OpenAI", settings.ai_provider);
            }
            anthropic()
        }),
    };

    match &model {
        Some(model) => tracing::debug!("Using language model {}", model.name()),
        None => tracing::warn!("No AI API key configured; metadata will use fallbacks"),
    }
    model
}
