//! Prompt template storage and rendering.
//!
//! Prompts are markdown files in a configurable directory, with
//! `{{key}}` placeholders. Rendering is pure: the store reads a file (or
//! a built-in fallback), substitutes variables, and returns text. The
//! engine depends on four framework prompts which all have built-in
//! defaults, so a prompts directory is optional.

use echelon_core::error::PromptError;
use std::path::PathBuf;
use tracing::debug;

/// The framework prompts the engine renders itself.
pub const AGENT_SYSTEM: &str = "agent.system";
pub const USER_MESSAGE: &str = "fw.user_message";
pub const TOOL_RESPONSE: &str = "fw.tool_response";
pub const ERROR_REPORT: &str = "fw.error";

/// File-backed prompt store with built-in fallbacks.
#[derive(Debug, Clone)]
pub struct PromptStore {
    dir: Option<PathBuf>,
}

impl PromptStore {
    /// A store that reads `<dir>/<name>.md`, falling back to built-ins.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// A store that serves only the built-in defaults.
    pub fn builtin() -> Self {
        Self { dir: None }
    }

    /// Render a template with `{{key}}` substitution.
    pub fn render(
        &self,
        name: &str,
        vars: &[(&str, &str)],
    ) -> Result<String, PromptError> {
        let template = self.load(name)?;
        let mut out = template;
        for (key, value) in vars {
            out = out.replace(&format!("{{{{{key}}}}}"), value);
        }
        Ok(out)
    }

    fn load(&self, name: &str) -> Result<String, PromptError> {
        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{name}.md"));
            if path.is_file() {
                debug!(prompt = name, path = %path.display(), "Loading prompt file");
                return std::fs::read_to_string(&path).map_err(|e| PromptError::Read {
                    name: name.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        builtin(name)
            .map(str::to_string)
            .ok_or_else(|| PromptError::NotFound(name.to_string()))
    }
}

impl Default for PromptStore {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Built-in fallback templates.
fn builtin(name: &str) -> Option<&'static str> {
    match name {
        AGENT_SYSTEM => Some(
            "You are Agent {{agent_number}}, an autonomous assistant in a \
             hierarchical agent system. Solve the task in the latest user \
             message. When you receive a tool response from a subordinate, \
             evaluate it and produce your own answer.",
        ),
        USER_MESSAGE => Some("{{message}}"),
        TOOL_RESPONSE => Some(
            "Response from tool '{{tool_name}}':\n\n{{tool_response}}",
        ),
        ERROR_REPORT => Some(
            "An error occurred:\n\n{{error}}\n\nInspect the error above and \
             try a different approach.",
        ),
        _ => None,
    }
}
