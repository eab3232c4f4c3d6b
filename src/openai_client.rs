use crate::error::{Result, UploaderError};
use crate::llm::LanguageModel;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_retry_time: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.to_string(),
            max_retry_time: Duration::from_secs(120),
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

    pub async fn chat(&self, system: &str, user: &str, json_output: bool) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.8,
            response_format: json_output.then(|| json!({"type": "json_object"})),
        };

        let backoff_config = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(20),
            multiplier: 2.0,
            max_elapsed_time: Some(self.max_retry_time),
            ..Default::default()
        };

        let operation = || async {
            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .timeout(Duration::from_secs(60))
                .json(&request)
                .send()
                .await
                .map_err(|e| {
                    let err = UploaderError::from(e);
                    if err.is_transient() {
                        tracing::warn!("OpenAI API connection error (retrying): {}", err);
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })?;

            let status = response.status();
            let response_text = response
                .text()
                .await
                .map_err(|e| backoff::Error::permanent(UploaderError::from(e)))?;

            let err = UploaderError::api(status.as_u16(), response_text.clone());
            if err.is_transient() {
                tracing::warn!("OpenAI API returned {} (retrying)", status);
                return Err(backoff::Error::transient(err));
            }
            if !status.is_success() {
                tracing::error!("OpenAI API permanent error ({}): {}", status, response_text);
                return Err(backoff::Error::permanent(err));
            }

            serde_json::from_str::<ChatResponse>(&response_text)
                .map_err(|e| backoff::Error::permanent(UploaderError::from(e)))
        };

        let response = retry(backoff_config, operation).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| UploaderError::Metadata("No text content in OpenAI response".to_string()))
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn name(&self) -> String {
        format!("openai/{}", self.model)
    }

    async fn complete(&self, system: &str, user: &str, json_output: bool) -> Result<String> {
        self.chat(system, user, json_output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OpenAiClient {
        OpenAiClient::new("sk-test".to_string(), "gpt-3.5-turbo")
            .with_base_url(&server.uri())
            .with_max_retry_time(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_chat_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-3.5-turbo",
                "messages": [{"role": "system", "content": "sys"}, {"role": "user", "content": "hi"}],
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "TITLE: Hello"}}]
            })))
            .mount(&server)
            .await;

        let text = client(&server).complete("sys", "hi", true).await.unwrap();
        assert_eq!(text, "TITLE: Hello");
    }

    #[tokio::test]
    async fn test_chat_retries_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .mount(&server)
            .await;

        assert_eq!(client(&server).complete("s", "u", false).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_chat_does_not_retry_bad_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).complete("s", "u", false).await.unwrap_err();
        assert!(matches!(err, UploaderError::Api { status: 401, .. }));
    }
}
