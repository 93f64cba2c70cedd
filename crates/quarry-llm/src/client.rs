// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for OpenAI-compatible chat completion endpoints.
//!
//! Provides the [`ChatModel`] seam used by every LLM-backed collaborator and
//! [`OpenAiChatClient`], which handles authentication, request construction,
//! and transient error retry.

use std::time::Duration;

use async_trait::async_trait;
use quarry_config::LlmConfig;
use quarry_core::QuarryError;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::types::{ApiErrorResponse, ChatMessage, ChatRequest, ChatResponse};

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Delay before the single retry of a transient failure.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// A chat model that turns a message list into one completion text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier used in logs.
    fn name(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, QuarryError>;
}

/// HTTP client for `POST {base_url}/chat/completions`.
///
/// Retries once after a one-second delay on 429, 500, 503 and 529.
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    client: reqwest::Client,
    model: String,
    temperature: f32,
    max_retries: u32,
    base_url: String,
}

impl OpenAiChatClient {
    /// Creates a client. A missing `api_key` sends no `Authorization` header,
    /// which local OpenAI-compatible servers accept.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<&str>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, QuarryError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            headers.insert(
                "authorization",
                HeaderValue::from_str(&format!("Bearer {}", key.trim())).map_err(|e| {
                    QuarryError::Config(format!("invalid API key header value: {e}"))
                })?,
            );
        }
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| QuarryError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            model: model.into(),
            temperature,
            max_retries: 1,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Builds a client from `[llm]`, reading the key from
    /// [`API_KEY_ENV`] when the config leaves it unset.
    pub fn from_config(config: &LlmConfig) -> Result<Self, QuarryError> {
        let env_key = std::env::var(API_KEY_ENV).ok();
        let api_key = config.api_key.as_deref().or(env_key.as_deref());
        Self::new(
            config.base_url.clone(),
            api_key,
            config.model.clone(),
            config.temperature,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Sends a non-streaming completion request.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, QuarryError> {
        let url = self.endpoint();
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying chat completion after transient error");
                tokio::time::sleep(RETRY_DELAY).await;
            }

            let response = self
                .client
                .post(&url)
                .json(request)
                .send()
                .await
                .map_err(|e| QuarryError::Provider {
                    message: format!("HTTP request failed: {e}"),
                    source: Some(Box::new(e)),
                })?;

            let status = response.status();
            debug!(status = %status, attempt, model = %request.model, "chat completion response received");

            if status.is_success() {
                let body = response.text().await.map_err(|e| QuarryError::Provider {
                    message: format!("failed to read response body: {e}"),
                    source: Some(Box::new(e)),
                })?;
                return serde_json::from_str(&body).map_err(|e| QuarryError::Provider {
                    message: format!("failed to parse API response: {e}"),
                    source: Some(Box::new(e)),
                });
            }

            if is_transient_error(status) && attempt < self.max_retries {
                let body = response.text().await.unwrap_or_default();
                warn!(status = %status, body = %body, "transient error, will retry");
                last_error = Some(QuarryError::provider(format!("API returned {status}: {body}")));
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(api_err) => format!(
                    "chat API error ({}): {}",
                    api_err.error.type_.as_deref().unwrap_or("unknown"),
                    api_err.error.message
                ),
                Err(_) => format!("API returned {status}: {body}"),
            };
            return Err(QuarryError::provider(message));
        }

        Err(last_error
            .unwrap_or_else(|| QuarryError::provider("chat completion failed after retries")))
    }
}

#[async_trait]
impl ChatModel for OpenAiChatClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, QuarryError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            temperature: self.temperature,
        };
        Ok(self.chat(&request).await?.into_text())
    }
}

fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503 | 529)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> OpenAiChatClient {
        OpenAiChatClient::new(
            "http://unused",
            Some("sk-test"),
            "gpt-4.1-mini",
            0.0,
            Duration::from_secs(5),
        )
        .unwrap()
        .with_base_url(server.uri())
    }

    fn completion(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": text}, "finish_reason": "stop"}]
        })
    }

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage::system("be brief"), ChatMessage::user("hello")]
    }

    #[tokio::test]
    async fn complete_returns_first_choice_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("hi there")))
            .mount(&server)
            .await;

        let text = test_client(&server).complete(&messages()).await.unwrap();
        assert_eq!(text, "hi there");
    }

    #[tokio::test]
    async fn sends_bearer_auth_and_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        assert_eq!(client.complete(&messages()).await.unwrap(), "ok");

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["model"], "gpt-4.1-mini");
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[tokio::test]
    async fn retries_once_on_429() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("after retry")))
            .mount(&server)
            .await;

        let text = test_client(&server).complete(&messages()).await.unwrap();
        assert_eq!(text, "after retry");
    }

    #[tokio::test]
    async fn fails_fast_on_400_with_api_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"message": "bad model", "type": "invalid_request_error"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server).complete(&messages()).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("invalid_request_error"), "{msg}");
        assert!(msg.contains("bad model"), "{msg}");
    }

    #[tokio::test]
    async fn exhausts_retries_on_503() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .expect(2)
            .mount(&server)
            .await;

        let err = test_client(&server).complete(&messages()).await.unwrap_err();
        assert!(matches!(err, QuarryError::Provider { .. }));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn unparseable_success_body_is_a_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = test_client(&server).complete(&messages()).await.unwrap_err();
        assert!(err.to_string().contains("failed to parse API response"));
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let client = OpenAiChatClient::new(
            "http://localhost:11434/v1/",
            None,
            "llama",
            0.2,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
        assert_eq!(client.model(), "llama");
    }
}
