//! Reasoning provider interface.
//!
//! The plan generator consults an opaque reasoning collaborator through
//! this trait. The HTTP implementation speaks a simple chat endpoint; the
//! transport is otherwise unconstrained, and tests substitute mock
//! providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A reasoning collaborator that can complete a structured prompt.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Complete a prompt, optionally under a system prompt.
    ///
    /// # Returns
    /// The collaborator's raw response text.
    async fn complete(&self, system: Option<&str>, prompt: &str) -> anyhow::Result<String>;
}

/// Request to the chat endpoint.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,

    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,

    model: &'a str,

    temperature: f64,
}

/// Response from the chat endpoint.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    content: String,

    #[serde(default)]
    error: Option<String>,
}

/// HTTP reasoning provider speaking the `/api/v1/chat` convention.
pub struct HttpProvider {
    endpoint: String,
    model: String,
    temperature: f64,
    client: reqwest::Client,
}

impl HttpProvider {
    /// Create a provider for the given endpoint and model.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint: endpoint.into(),
            model: model.into(),
            temperature: 0.7,
            client,
        })
    }

    /// Override the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl ReasoningProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn complete(&self, system: Option<&str>, prompt: &str) -> anyhow::Result<String> {
        let url = format!("{}/api/v1/chat", self.endpoint.trim_end_matches('/'));

        let request = ChatRequest {
            message: prompt,
            system,
            model: &self.model,
            temperature: self.temperature,
        };

        tracing::debug!(model = %self.model, "Calling reasoning collaborator");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to call reasoning collaborator: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Reasoning collaborator returned {status}: {body}");
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse collaborator response: {e}"))?;

        if let Some(error) = chat_response.error {
            anyhow::bail!("Collaborator error: {error}");
        }

        Ok(chat_response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockProvider;

    #[async_trait]
    impl ReasoningProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn complete(&self, system: Option<&str>, prompt: &str) -> anyhow::Result<String> {
            Ok(format!(
                "system={} prompt={}",
                system.unwrap_or("none"),
                prompt
            ))
        }
    }

    #[tokio::test]
    async fn test_mock_provider_works() {
        let provider = MockProvider;
        assert_eq!(provider.name(), "mock");

        let response = provider.complete(None, "plan something").await.unwrap();
        assert!(response.contains("plan something"));

        let with_system = provider
            .complete(Some("be strategic"), "plan")
            .await
            .unwrap();
        assert!(with_system.contains("be strategic"));
    }

    #[test]
    fn test_chat_request_omits_absent_system() {
        let request = ChatRequest {
            message: "hello",
            system: None,
            model: "default",
            temperature: 0.7,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["message"], "hello");
    }

    #[test]
    fn test_chat_response_defaults() {
        let response: ChatResponse = serde_json::from_str("{}").unwrap();
        assert!(response.content.is_empty());
        assert!(response.error.is_none());
    }
}
