use crate::error::{Result, UploaderError};
use crate::llm::LanguageModel;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_retry_time: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClaudeRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClaudeMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClaudeResponse {
    pub id: String,
    pub model: String,
    pub content: Vec<ResponseContent>,
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl ClaudeClient {
    pub fn new(api_key: String, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://api.anthropic.com/v1".to_string(),
            model: model.to_string(),
            max_retry_time: Duration::from_secs(300),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_retry_time(mut self, max_retry_time: Duration) -> Self {
        self.max_retry_time = max_retry_time;
        self
    }

    pub async fn generate_content(&self, messages: Vec<ClaudeMessage>, system: Option<String>) -> Result<ClaudeResponse> {
        let request = ClaudeRequest {
            model: self.model.clone(),
            max_tokens: 1024,
            messages,
            system,
            temperature: Some(0.8),
        };

        tracing::debug!("Claude API Request messages count: {}", request.messages.len());

        // Configure exponential backoff for retries
        let backoff_config = ExponentialBackoff {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            max_elapsed_time: Some(self.max_retry_time),
            ..Default::default()
        };

        // Retry logic for transient errors (429, 5xx, connection errors)
        let operation = || async {
            let response = self
                .client
                .post(format!("{}/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .header("content-type", "application/json")
                .timeout(Duration::from_secs(120))
                .json(&request)
                .send()
                .await
                .map_err(|e| {
                    let err = UploaderError::from(e);
                    if err.is_transient() {
                        tracing::warn!("Claude API connection error (retrying): {}", err);
                        backoff::Error::transient(err)
                    } else {
                        tracing::error!("Claude API permanent error: {}", err);
                        backoff::Error::permanent(err)
                    }
                })?;

            let status = response.status();
            let response_text = response
                .text()
                .await
                .map_err(|e| backoff::Error::permanent(UploaderError::from(e)))?;

            tracing::debug!("Claude API Response (status {}): {}", status, response_text);

            let err = UploaderError::api(status.as_u16(), response_text.clone());
            if err.is_transient() {
                tracing::warn!("Claude API returned {} (retrying): {}", status, response_text);
                return Err(backoff::Error::transient(err));
            }

            if !status.is_success() {
                tracing::error!("Claude API permanent error ({}): {}", status, response_text);
                return Err(backoff::Error::permanent(err));
            }

            serde_json::from_str(&response_text).map_err(|e| backoff::Error::permanent(UploaderError::from(e)))
        };

        retry(backoff_config, operation).await
    }

    pub async fn generate_text(&self, system: &str, prompt: &str) -> Result<String> {
        let messages = vec![ClaudeMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        }];

        let system = (!system.is_empty()).then(|| system.to_string());
        let response = self.generate_content(messages, system).await?;

        tracing::debug!(
            "Claude usage: {} input / {} output tokens",
            response.usage.input_tokens,
            response.usage.output_tokens
        );

        // Extract text from response
        response
            .content
            .into_iter()
            .find_map(|content| match content {
                ResponseContent::Text { text } => Some(text),
                ResponseContent::Other => None,
            })
            .ok_or_else(|| UploaderError::Metadata("No text content in Claude response".to_string()))
    }
}

#[async_trait]
impl LanguageModel for ClaudeClient {
    fn name(&self) -> String {
        format!("anthropic/{}", self.model)
    }

    // Claude has no JSON mode; the prompt alone asks for JSON
    async fn complete(&self, system: &str, user: &str, _json_output: bool) -> Result<String> {
        self.generate_text(system, user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reply(text: &str) -> serde_json::Value {
        json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-5",
            "role": "assistant",
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        })
    }

    #[tokio::test]
    async fn test_generate_text_sends_system_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-ant"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(json!({
                "model": "claude-sonnet-4-5",
                "system": "be brief",
                "messages": [{"role": "user", "content": "title please"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("TITLE: Short")))
            .mount(&server)
            .await;

        let client = ClaudeClient::new("sk-ant".to_string(), "claude-sonnet-4-5").with_base_url(&server.uri());
        let text = client.complete("be brief", "title please", true).await.unwrap();
        assert_eq!(text, "TITLE: Short");
    }

    #[tokio::test]
    async fn test_overloaded_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("fine")))
            .mount(&server)
            .await;

        let client = ClaudeClient::new("k".to_string(), "m")
            .with_base_url(&server.uri())
            .with_max_retry_time(Duration::from_secs(10));
        assert_eq!(client.generate_text("", "hi").await.unwrap(), "fine");
    }
}
