//! Configuration loading and validation for Echelon.
//!
//! Loads configuration from `~/.echelon/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.echelon/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key shared by all models (can be overridden per-model)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model used for agent conversations
    #[serde(default = "default_chat_model")]
    pub chat_model: ModelConfig,

    /// Model used for auxiliary calls (summaries, titles)
    #[serde(default = "default_utility_model")]
    pub utility_model: ModelConfig,

    /// Model used for embeddings
    #[serde(default = "default_embeddings_model")]
    pub embeddings_model: ModelConfig,

    /// Directory of prompt template overrides (built-ins used when unset
    /// or when a template file is missing)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts_dir: Option<PathBuf>,

    /// Rate limiting for model calls
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Gateway (HTTP surface) configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_chat_model() -> ModelConfig {
    ModelConfig {
        provider: default_provider(),
        model: "anthropic/claude-sonnet-4".into(),
        base_url: None,
        api_key: None,
        temperature: default_temperature(),
        max_tokens: None,
    }
}

fn default_utility_model() -> ModelConfig {
    ModelConfig {
        provider: default_provider(),
        model: "openai/gpt-4o-mini".into(),
        base_url: None,
        api_key: None,
        temperature: 0.0,
        max_tokens: None,
    }
}

fn default_embeddings_model() -> ModelConfig {
    ModelConfig {
        provider: default_provider(),
        model: "openai/text-embedding-3-small".into(),
        base_url: None,
        api_key: None,
        temperature: 0.0,
        max_tokens: None,
    }
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_temperature() -> f32 {
    0.7
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("chat_model", &self.chat_model)
            .field("utility_model", &self.utility_model)
            .field("embeddings_model", &self.embeddings_model)
            .field("prompts_dir", &self.prompts_dir)
            .field("rate_limit", &self.rate_limit)
            .field("gateway", &self.gateway)
            .finish()
    }
}

/// Settings for one model role.
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Backend name ("openrouter", "openai", "ollama", or any
    /// OpenAI-compatible endpoint via `base_url`)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier sent to the backend
    pub model: String,

    /// Endpoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Per-model API key override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl ModelConfig {
    /// The key this model should use: its own override, or the shared one.
    pub fn resolve_api_key(&self, shared: &Option<String>) -> Option<String> {
        self.api_key.clone().or_else(|| shared.clone())
    }
}

/// Sliding-window rate limiting for model calls. Zero means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_window")]
    pub requests_per_window: u32,

    #[serde(default)]
    pub input_tokens_per_window: u32,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_requests_per_window() -> u32 {
    15
}
fn default_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: default_requests_per_window(),
            input_tokens_per_window: 0,
            window_secs: default_window_secs(),
        }
    }
}

/// HTTP gateway settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Basic auth credentials. Auth is enforced only when both are set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_password: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    50001
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth_username: None,
            auth_password: None,
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("auth_username", &self.auth_username)
            .field("auth_password", &redact(&self.auth_password))
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.echelon/config.toml).
    ///
    /// Environment variables take priority over the file:
    /// - `ECHELON_API_KEY`, `OPENROUTER_API_KEY`, `OPENAI_API_KEY`
    /// - `ECHELON_MODEL` (chat model override)
    /// - `WEB_UI_HOST`, `WEB_UI_PORT`
    /// - `BASIC_AUTH_USERNAME`, `BASIC_AUTH_PASSWORD`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("ECHELON_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("ECHELON_MODEL") {
            self.chat_model.model = model;
        }

        if let Ok(host) = std::env::var("WEB_UI_HOST") {
            self.gateway.host = host;
        }
        if let Ok(port) = std::env::var("WEB_UI_PORT")
            && let Ok(port) = port.parse()
        {
            self.gateway.port = port;
        }
        if let Ok(user) = std::env::var("BASIC_AUTH_USERNAME") {
            self.gateway.auth_username = Some(user);
        }
        if let Ok(pass) = std::env::var("BASIC_AUTH_PASSWORD") {
            self.gateway.auth_password = Some(pass);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".echelon")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        for (role, model) in [
            ("chat_model", &self.chat_model),
            ("utility_model", &self.utility_model),
            ("embeddings_model", &self.embeddings_model),
        ] {
            if !(0.0..=2.0).contains(&model.temperature) {
                return Err(ConfigError::ValidationError(format!(
                    "{role}.temperature must be between 0.0 and 2.0"
                )));
            }
            if model.model.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{role}.model must not be empty"
                )));
            }
        }

        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit.window_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some() || self.chat_model.api_key.is_some()
    }

    /// Generate a default config TOML string (for `init` output).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            chat_model: default_chat_model(),
            utility_model: default_utility_model(),
            embeddings_model: default_embeddings_model(),
            prompts_dir: None,
            rate_limit: RateLimitConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chat_model.provider, "openrouter");
        assert_eq!(config.gateway.port, 50001);
        assert_eq!(config.rate_limit.requests_per_window, 15);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.chat_model.model, config.chat_model.model);
        assert_eq!(parsed.gateway.port, config.gateway.port);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.chat_model.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_window_rejected() {
        let mut config = AppConfig::default();
        config.rate_limit.window_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().chat_model.provider, "openrouter");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
api_key = "sk-test"

[chat_model]
model = "custom/model"

[gateway]
port = 8080
auth_username = "admin"
auth_password = "secret"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.chat_model.model, "custom/model");
        assert_eq!(config.chat_model.temperature, 0.7);
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.auth_username.as_deref(), Some("admin"));
        assert_eq!(config.utility_model.model, "openai/gpt-4o-mini");
    }

    #[test]
    fn per_model_key_overrides_shared() {
        let mut config = AppConfig::default();
        config.api_key = Some("shared".into());
        config.chat_model.api_key = Some("own".into());

        assert_eq!(
            config.chat_model.resolve_api_key(&config.api_key).as_deref(),
            Some("own")
        );
        assert_eq!(
            config
                .utility_model
                .resolve_api_key(&config.api_key)
                .as_deref(),
            Some("shared")
        );
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-very-secret".into());
        config.gateway.auth_password = Some("hunter2".into());

        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("openrouter"));
        assert!(toml_str.contains("50001"));
    }
}
