//! Wire types for the Ollama chat API

use serde::{Deserialize, Serialize};

/// One chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling options
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatOptions {
    pub num_predict: usize,
    pub temperature: f32,
    pub top_p: f32,
}

/// `POST /api/chat` request body
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: ChatOptions,
}

/// `POST /api/chat` response body (non-streaming)
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[allow(dead_code)]
    #[serde(default)]
    pub model: String,
    pub message: ChatMessage,
    #[serde(default)]
    pub prompt_eval_count: Option<usize>,
    #[serde(default)]
    pub eval_count: Option<usize>,
}
