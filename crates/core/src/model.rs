//! ChatModel trait — the abstraction over LLM backends.
//!
//! A `ChatModel` knows how to send a composed prompt (system text plus
//! conversation history) to an LLM and get text back, either complete or
//! as a finite stream of token chunks. The stream is not restartable;
//! dropping the receiver abandons the generation, which is how the engine
//! terminates a stream early when a user intervenes.

use crate::error::ModelError;
use crate::message::{Message, Sender};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A fully composed request for one generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model to use (e.g., "anthropic/claude-sonnet-4", "gpt-4o")
    pub model: String,

    /// System prompt text, already joined from its parts
    pub system: String,

    /// The conversation history, oldest first
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ChatRequest {
    /// Rough token estimate for the whole prompt (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        let history: usize = self.messages.iter().map(Message::estimated_tokens).sum();
        self.system.len() / 4 + history
    }
}

/// A complete (non-streaming) response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated text
    pub content: String,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// The core chat-model trait.
///
/// Every LLM backend implements this. The agent loop calls `stream()`
/// without knowing which backend is behind it.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// A human-readable name for this backend (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ChatRequest) -> std::result::Result<ChatResponse, ModelError>;

    /// Send a request and get a finite stream of token chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as
    /// a single chunk.
    async fn stream(
        &self,
        request: ChatRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<TokenChunk, ModelError>>,
        ModelError,
    > {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(TokenChunk {
                content: Some(response.content),
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }

    /// Generate embeddings for the given texts.
    ///
    /// Default implementation reports embeddings as unsupported.
    async fn embed(
        &self,
        _inputs: Vec<String>,
    ) -> std::result::Result<Vec<Vec<f32>>, ModelError> {
        Err(ModelError::NotConfigured(format!(
            "Model '{}' does not support embeddings",
            self.name()
        )))
    }
}

impl std::fmt::Debug for dyn ChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatModel").field("name", &self.name()).finish()
    }
}

/// Join system prompt parts and history into a `ChatRequest`.
pub fn compose_request(
    model: &str,
    system_parts: &[String],
    history: &[Message],
    temperature: f32,
    max_tokens: Option<u32>,
) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        system: system_parts.join("\n\n"),
        messages: history.to_vec(),
        temperature,
        max_tokens,
    }
}

/// Render a history entry the way transcript-style prompts expect it.
pub fn transcript_line(message: &Message) -> String {
    match message.sender {
        Sender::Human => format!("User: {}", message.text()),
        Sender::Assistant => format!("Assistant: {}", message.text()),
    }
}
