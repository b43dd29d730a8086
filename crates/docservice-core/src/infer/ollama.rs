//! Ollama HTTP client with two-tier model selection.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{backend_failure, Inference, TaskHint};
use crate::domain::{Result, ServiceError};

/// Reply used when the backend answers without a `response` field.
pub const EMPTY_RESPONSE: &str = "No response received.";

/// Inference backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InferenceConfig {
    /// Ollama server root, e.g. `http://localhost:11434`.
    pub base_url: String,
    /// Small model for short, simple prompts.
    pub fast_model: String,
    /// Larger model for script generation and long prompts.
    pub smart_model: String,
    /// Prompts longer than this many characters go to the smart model.
    pub long_prompt_threshold: usize,
    pub request_timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            fast_model: "llama3.2:latest".to_string(),
            smart_model: "llama3.1:8b".to_string(),
            long_prompt_threshold: 1500,
            request_timeout_secs: 120,
        }
    }
}

/// Ollama `/api/generate` client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    config: InferenceConfig,
    http: Client,
}

impl OllamaClient {
    pub fn new(config: InferenceConfig) -> Result<Self> {
        if config.request_timeout_secs == 0 {
            return Err(ServiceError::Config(
                "inference.request_timeout_secs must be greater than zero".into(),
            ));
        }
        let http = Client::builder()
            .user_agent(concat!("docservice/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { config, http })
    }

    /// Pick the model for a prompt: the task hint first, then prompt length.
    pub fn select_model(&self, hint: TaskHint, prompt: &str) -> &str {
        if hint == TaskHint::Computational {
            return &self.config.smart_model;
        }
        if prompt.chars().count() > self.config.long_prompt_threshold {
            return &self.config.smart_model;
        }
        &self.config.fast_model
    }

    async fn generate(&self, model: &str, prompt: &str) -> std::result::Result<String, String> {
        let url = format!("{}/api/generate", self.config.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
        });

        let resp = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {body}"));
        }

        let data: Value = resp.json().await.map_err(|e| e.to_string())?;
        Ok(data["response"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| EMPTY_RESPONSE.to_string()))
    }
}

#[async_trait]
impl Inference for OllamaClient {
    async fn infer(&self, prompt: &str, hint: TaskHint) -> String {
        let model = self.select_model(hint, prompt).to_string();
        debug!(model = %model, hint = %hint, prompt_chars = prompt.len(), "inference request");
        match self.generate(&model, prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(model = %model, error = %e, "inference backend failed");
                backend_failure(&model, &e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OllamaClient {
        OllamaClient::new(InferenceConfig::default()).unwrap()
    }

    #[test]
    fn test_computational_hint_uses_smart() {
        let c = client();
        assert_eq!(c.select_model(TaskHint::Computational, "short"), "llama3.1:8b");
    }

    #[test]
    fn test_general_short_prompt_uses_fast() {
        let c = client();
        assert_eq!(c.select_model(TaskHint::General, "Hello"), "llama3.2:latest");
    }

    #[test]
    fn test_long_prompt_uses_smart() {
        let c = client();
        let long_prompt = "x".repeat(1600);
        assert_eq!(c.select_model(TaskHint::General, &long_prompt), "llama3.1:8b");
        let at_threshold = "x".repeat(1500);
        assert_eq!(c.select_model(TaskHint::General, &at_threshold), "llama3.2:latest");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let cfg = InferenceConfig {
            request_timeout_secs: 0,
            ..Default::default()
        };
        assert!(OllamaClient::new(cfg).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_backend_returns_sentinel() {
        let c = OllamaClient::new(InferenceConfig {
            // reserved port, nothing listens there
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 2,
            ..Default::default()
        })
        .unwrap();
        let reply = c.infer("Test", TaskHint::Computational).await;
        assert!(super::super::is_backend_failure(&reply));
        assert!(reply.contains("llama3.1:8b"));
    }
}
