//! Error types for the Echelon domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded context
//! has its own error enum, folded into the top-level `EngineError`.
//!
//! Interventions are **not** errors — a user interrupting a streaming
//! agent is ordinary control flow and travels as a tagged stream outcome
//! in the engine crate. Everything here is either *recoverable* (shown to
//! the model as corrective context, loop continues) or a *fault*
//! (terminates the current monologue and surfaces as the task result).

use thiserror::Error;

/// The top-level error type for all Echelon operations.
#[derive(Debug, Error)]
pub enum EngineError {
    // --- Model errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Prompt errors ---
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    // --- Session registry ---
    #[error("Context already exists: {0}")]
    DuplicateContext(String),

    #[error("Context not found: {0}")]
    ContextNotFound(String),

    // --- Background task handling ---
    #[error("Task result unavailable: {0}")]
    TaskUnavailable(String),

    #[error("Task cancelled")]
    TaskCancelled,

    // --- Extension hooks ---
    #[error("Extension '{name}' failed in phase '{phase}': {reason}")]
    Extension {
        name: String,
        phase: String,
        reason: String,
    },

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the monologue loop may continue after this error.
    ///
    /// Recoverable errors are formatted into a diagnostic message that is
    /// appended to the conversation so the model sees its own mistake on
    /// the next iteration. Everything else is a fault that ends the
    /// current monologue.
    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineError::Model(e) => e.is_recoverable(),
            EngineError::Prompt(_) => true,
            EngineError::Extension { .. } => true,
            _ => false,
        }
    }
}

/// Result type alias using our EngineError.
pub type Result<T> = std::result::Result<T, EngineError>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    NotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Model not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ModelError {
    /// Transient provider trouble and garbled output are recoverable;
    /// broken credentials or missing configuration are not.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ModelError::AuthenticationFailed(_)
                | ModelError::NotConfigured(_)
                | ModelError::NotFound(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt template not found: {0}")]
    NotFound(String),

    #[error("Failed to read prompt '{name}': {reason}")]
    Read { name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_error_displays_correctly() {
        let err = EngineError::Model(ModelError::Api {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn transient_model_errors_are_recoverable() {
        let err = EngineError::Model(ModelError::Timeout("read timed out".into()));
        assert!(err.is_recoverable());

        let err = EngineError::Model(ModelError::MalformedOutput("not json".into()));
        assert!(err.is_recoverable());
    }

    #[test]
    fn auth_failure_is_a_fault() {
        let err = EngineError::Model(ModelError::AuthenticationFailed("bad key".into()));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn extension_failure_is_recoverable() {
        let err = EngineError::Extension {
            name: "memory_recall".into(),
            phase: "message_loop_prompts".into(),
            reason: "backend unavailable".into(),
        };
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("memory_recall"));
    }

    #[test]
    fn duplicate_context_is_a_fault() {
        let err = EngineError::DuplicateContext("ctx-1".into());
        assert!(!err.is_recoverable());
    }
}
