//! Chat model backends for Echelon.
//!
//! One concrete implementation covers nearly every hosted and local
//! backend: the OpenAI-compatible wire shape. The factory turns a
//! `ModelConfig` into a boxed `ChatModel` the engine can use without
//! knowing which backend is behind it.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatModel;

use echelon_config::ModelConfig;
use echelon_core::error::ModelError;
use echelon_core::model::ChatModel;
use std::sync::Arc;

/// Build a chat model from its configuration.
///
/// Known providers ("openrouter", "openai", "ollama") get their default
/// endpoints; any other provider name requires an explicit `base_url`
/// and is treated as OpenAI-compatible.
pub fn build_chat_model(
    config: &ModelConfig,
    shared_api_key: &Option<String>,
) -> Result<Arc<dyn ChatModel>, ModelError> {
    let api_key = config.resolve_api_key(shared_api_key);

    let model = match config.provider.as_str() {
        "openrouter" => OpenAiCompatModel::openrouter(require_key(api_key, "openrouter")?),
        "openai" => OpenAiCompatModel::openai(require_key(api_key, "openai")?),
        "ollama" => OpenAiCompatModel::ollama(config.base_url.as_deref()),
        other => {
            let base_url = config.base_url.as_ref().ok_or_else(|| {
                ModelError::NotConfigured(format!(
                    "provider '{other}' requires an explicit base_url"
                ))
            })?;
            OpenAiCompatModel::new(other, base_url, api_key.unwrap_or_default())
        }
    };

    Ok(Arc::new(model))
}

fn require_key(api_key: Option<String>, provider: &str) -> Result<String, ModelError> {
    api_key.ok_or_else(|| {
        ModelError::NotConfigured(format!("provider '{provider}' requires an API key"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_config(provider: &str) -> ModelConfig {
        ModelConfig {
            provider: provider.into(),
            model: "some/model".into(),
            base_url: None,
            api_key: None,
            temperature: 0.7,
            max_tokens: None,
        }
    }

    #[test]
    fn openrouter_without_key_is_rejected() {
        let err = build_chat_model(&model_config("openrouter"), &None).unwrap_err();
        assert!(matches!(err, ModelError::NotConfigured(_)));
    }

    #[test]
    fn shared_key_satisfies_known_provider() {
        let model = build_chat_model(&model_config("openai"), &Some("sk-test".into())).unwrap();
        assert_eq!(model.name(), "openai");
    }

    #[test]
    fn ollama_needs_no_key() {
        let model = build_chat_model(&model_config("ollama"), &None).unwrap();
        assert_eq!(model.name(), "ollama");
    }

    #[test]
    fn custom_provider_requires_base_url() {
        let err = build_chat_model(&model_config("vllm"), &None).unwrap_err();
        assert!(matches!(err, ModelError::NotConfigured(_)));

        let mut config = model_config("vllm");
        config.base_url = Some("http://gpu-box:8000/v1".into());
        let model = build_chat_model(&config, &None).unwrap();
        assert_eq!(model.name(), "vllm");
    }
}
