//! Ollama chat client
//!
//! Each request is stateless: a system message (when given) and one user
//! message. Connection failures and server errors feed a circuit breaker
//! shared by every client built from the same [`OracleConfig`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use sculpt_core::{OracleConfig, OracleRequest, Result, SculptError, TextOracle};

use crate::circuit_breaker::CircuitBreaker;
use crate::types::{ChatMessage, ChatOptions, ChatRequest, ChatResponse};

const CHAT_PATH: &str = "/api/chat";
const TOP_P: f32 = 0.9;

/// Text oracle backed by an Ollama server
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    breaker: Arc<CircuitBreaker>,
    request_timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            breaker: Arc::new(CircuitBreaker::default()),
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Client for `model` sharing `breaker` with its siblings
    pub fn from_config(config: &OracleConfig, model: &str, breaker: Arc<CircuitBreaker>) -> Self {
        Self::new(config.base_url.clone(), model).with_breaker(breaker)
    }

    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, CHAT_PATH)
    }

    /// Request body for `request`
    pub fn chat_request(&self, request: &OracleRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(request.prompt.clone()));
        ChatRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            options: ChatOptions {
                num_predict: request.max_tokens,
                temperature: request.temperature,
                top_p: TOP_P,
            },
        }
    }

    async fn chat(&self, request: &OracleRequest) -> Result<String> {
        if !self.breaker.admit() {
            return Err(SculptError::OracleUnavailable(format!(
                "circuit breaker is open, retry in {} seconds",
                self.breaker.retry_in().as_secs()
            )));
        }

        debug!(model = %self.model, endpoint = %self.endpoint(), "sending chat request");
        let response = self
            .http
            .post(self.endpoint())
            .timeout(self.request_timeout)
            .json(&self.chat_request(request))
            .send()
            .await
            .map_err(|e| {
                self.breaker.record_failure();
                SculptError::OracleUnavailable(format!("failed to reach {}: {}", self.base_url, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            if status.is_server_error() {
                self.breaker.record_failure();
                warn!(
                    failures = self.breaker.failure_count(),
                    "oracle server error, circuit breaker recorded failure"
                );
            } else {
                self.breaker.record_success();
            }
            return Err(SculptError::Oracle(format!(
                "Ollama error {}: {}",
                status, error_text
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| {
                self.breaker.record_failure();
                SculptError::Oracle(format!("failed to parse response: {}", e))
            })?;
        self.breaker.record_success();

        let output = chat.message.content.trim().to_string();
        info!(
            model = %self.model,
            chars = output.len(),
            prompt_tokens = chat.prompt_eval_count.unwrap_or(0),
            output_tokens = chat.eval_count.unwrap_or(0),
            "oracle call complete"
        );
        Ok(output)
    }
}

#[async_trait]
impl TextOracle for OllamaClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &OracleRequest) -> Result<String> {
        self.chat(request).await
    }
}

/// One client per oracle role, all sharing a single circuit breaker
#[derive(Debug, Clone)]
pub struct OracleRoles {
    pub architect: OllamaClient,
    pub planner: OllamaClient,
    pub synthesizer: OllamaClient,
    pub repair: OllamaClient,
}

impl OracleRoles {
    pub fn from_config(config: &OracleConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::from_config(config));
        let client = |model: &str| OllamaClient::from_config(config, model, breaker.clone());
        Self {
            architect: client(&config.models.architect),
            planner: client(&config.models.planner),
            synthesizer: client(&config.models.synthesizer),
            repair: client(&config.models.repair),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_shape() {
        let client = OllamaClient::new("http://localhost:11434/", "qwen2.5-coder:7b");
        assert_eq!(client.endpoint(), "http://localhost:11434/api/chat");

        let request = OracleRequest::new("make a cube")
            .with_system("You are a CAD expert")
            .with_temperature(0.3)
            .with_max_tokens(500);
        let body = serde_json::to_value(client.chat_request(&request)).unwrap();
        assert_eq!(body["model"], "qwen2.5-coder:7b");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "make a cube");
        assert_eq!(body["options"]["num_predict"], 500);
    }

    #[tokio::test]
    async fn test_open_breaker_refuses_without_network() {
        let breaker = Arc::new(CircuitBreaker::new(1, Duration::from_secs(60)));
        breaker.record_failure();
        let client = OllamaClient::new("http://127.0.0.1:9", "m").with_breaker(breaker);
        let err = client
            .generate(&OracleRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let breaker = Arc::new(CircuitBreaker::new(5, Duration::from_secs(60)));
        let client = OllamaClient::new("http://127.0.0.1:9", "m")
            .with_breaker(breaker.clone())
            .with_request_timeout(Duration::from_secs(2));
        let err = client
            .generate(&OracleRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(breaker.failure_count(), 1);
    }

    #[test]
    fn test_roles_share_breaker() {
        let roles = OracleRoles::from_config(&OracleConfig::default());
        roles.architect.breaker.record_failure();
        assert_eq!(roles.repair.breaker.failure_count(), 1);
        assert_eq!(roles.synthesizer.model(), "qwen2.5-coder:7b");
    }
}
