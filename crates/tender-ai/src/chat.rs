use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tender_storage::{HttpClientConfig, HttpFetcher};
use tracing::debug;
use uuid::Uuid;

use crate::{AiConfig, AiError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// One system + user exchange; temperature is always 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens,
        }
    }
}

#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, AiError>;
}

#[async_trait]
impl<C: ChatCompletion + ?Sized> ChatCompletion for Arc<C> {
    async fn complete(&self, request: &ChatRequest) -> Result<String, AiError> {
        (**self).complete(request).await
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// OpenAI-compatible `/chat/completions` client.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    config: AiConfig,
    fetcher: Arc<HttpFetcher>,
}

impl OpenAiChat {
    pub fn new(config: AiConfig) -> anyhow::Result<Self> {
        let fetcher = HttpFetcher::new(HttpClientConfig {
            timeout: config.timeout,
            global_concurrency: 4,
            per_source_concurrency: 4,
            ..HttpClientConfig::default()
        })?;
        Ok(Self {
            config,
            fetcher: Arc::new(fetcher),
        })
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    fn body(&self, request: &ChatRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "max_tokens": request.max_tokens,
            "temperature": 0,
        })
    }
}

#[async_trait]
impl ChatCompletion for OpenAiChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String, AiError> {
        let api_key = self.config.api_key.as_deref().ok_or(AiError::NotConfigured)?;
        let response = self
            .fetcher
            .post_json(
                Uuid::new_v4(),
                "deepseek",
                &self.config.completions_url(),
                Some(api_key),
                &self.body(request),
            )
            .await?;
        let parsed: CompletionResponse = serde_json::from_slice(&response.body)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(AiError::EmptyReply)?;
        debug!(chars = content.len(), "chat completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_is_deterministic() {
        let chat = OpenAiChat::new(AiConfig::default()).unwrap();
        let body = chat.body(&ChatRequest::new("sys", "user", 2048));
        assert_eq!(body["model"], "deepseek-chat");
        assert_eq!(body["temperature"], 0);
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user");
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let chat = OpenAiChat::new(AiConfig::default()).unwrap();
        let err = chat
            .complete(&ChatRequest::new("sys", "user", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::NotConfigured));
    }

    #[test]
    fn completion_payload_parses() {
        let raw = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"AVIS"}}]}"#;
        let parsed: CompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "AVIS");
    }
}
