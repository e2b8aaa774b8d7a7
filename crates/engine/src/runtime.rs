//! Shared collaborators for every agent in a process.
//!
//! The `Runtime` bundles the external contracts the engine consumes:
//! the chat model, the rate limiter, the prompt store, the extension
//! registry and the turn policy. It is assembled once at startup and
//! shared by all contexts.

use crate::extensions::ExtensionRegistry;
use crate::policy::{SingleReplyPolicy, TurnPolicy};
use echelon_core::limit::{NoopLimiter, RateLimiter};
use echelon_core::model::ChatModel;
use echelon_prompts::PromptStore;
use std::sync::Arc;

/// Generation parameters for the chat model.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: "anthropic/claude-sonnet-4".into(),
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

/// Process-wide collaborators shared by all contexts and agents.
pub struct Runtime {
    pub chat_model: Arc<dyn ChatModel>,
    pub settings: ChatSettings,
    pub limiter: Arc<dyn RateLimiter>,
    pub prompts: PromptStore,
    pub extensions: Arc<ExtensionRegistry>,
    pub policy: Arc<dyn TurnPolicy>,
}

impl Runtime {
    /// A runtime with default settings, no rate limiting, built-in
    /// prompts, an empty extension registry, and the single-reply
    /// policy.
    pub fn new(chat_model: Arc<dyn ChatModel>) -> Self {
        Self {
            chat_model,
            settings: ChatSettings::default(),
            limiter: Arc::new(NoopLimiter),
            prompts: PromptStore::builtin(),
            extensions: Arc::new(ExtensionRegistry::new()),
            policy: Arc::new(SingleReplyPolicy),
        }
    }

    pub fn with_settings(mut self, settings: ChatSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptStore) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_extensions(mut self, extensions: Arc<ExtensionRegistry>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn TurnPolicy>) -> Self {
        self.policy = policy;
        self
    }
}
