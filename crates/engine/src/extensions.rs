//! Lifecycle hook points for the monologue loop.
//!
//! Collaborators register named callbacks against phases; the agent
//! invokes them at defined points of its loop, in registration order,
//! passing the current `LoopData` by mutable reference so callbacks can
//! append system prompt parts or inspect the run. A failing callback is
//! a recoverable condition local to that callback: it is logged and the
//! remaining callbacks for the phase still run.

use crate::agent::Agent;
use crate::loop_data::LoopData;
use async_trait::async_trait;
use echelon_core::error::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// The phases the engine itself invokes. The set is open: extensions and
/// embedders may register and call additional phase names.
pub mod phase {
    /// Start of a monologue pass, before the user message is appended.
    pub const MONOLOGUE_START: &str = "monologue_start";
    /// Every iteration, after the system prompt parts were cleared;
    /// callbacks rebuild them here.
    pub const MESSAGE_LOOP_PROMPTS: &str = "message_loop_prompts";
    /// End of every iteration, regardless of its outcome.
    pub const MESSAGE_LOOP_END: &str = "message_loop_end";
    /// End of a monologue pass, regardless of its outcome.
    pub const MONOLOGUE_END: &str = "monologue_end";
}

/// A lifecycle hook.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Name used in logs when the extension fails.
    fn name(&self) -> &str;

    async fn execute(&self, agent: &Agent, loop_data: &mut LoopData) -> Result<()>;
}

/// Ordered, named hook points.
pub struct ExtensionRegistry {
    phases: Mutex<HashMap<String, Vec<Arc<dyn Extension>>>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self {
            phases: Mutex::new(HashMap::new()),
        }
    }

    /// Register a callback at the end of a phase's invocation order.
    pub fn register(&self, phase: &str, extension: Arc<dyn Extension>) {
        let mut phases = self.phases.lock().unwrap_or_else(|e| e.into_inner());
        phases.entry(phase.to_string()).or_default().push(extension);
    }

    /// Invoke every callback registered for `phase`, in registration
    /// order. A callback failure never aborts the phase for the
    /// remaining callbacks.
    pub async fn call(&self, phase: &str, agent: &Agent, loop_data: &mut LoopData) {
        let callbacks: Vec<Arc<dyn Extension>> = {
            let phases = self.phases.lock().unwrap_or_else(|e| e.into_inner());
            phases.get(phase).cloned().unwrap_or_default()
        };

        for extension in callbacks {
            if let Err(e) = extension.execute(agent, loop_data).await {
                warn!(
                    extension = extension.name(),
                    phase,
                    error = %e,
                    "Extension failed, continuing phase"
                );
            }
        }
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Baseline extension: renders the agent's system prompt.
///
/// Registered on `message_loop_prompts` so every iteration starts from a
/// freshly rendered system text; further extensions append tool specs,
/// memory excerpts and the like after it.
pub struct SystemPromptExtension {
    prompts: echelon_prompts::PromptStore,
}

impl SystemPromptExtension {
    pub fn new(prompts: echelon_prompts::PromptStore) -> Self {
        Self { prompts }
    }
}

#[async_trait]
impl Extension for SystemPromptExtension {
    fn name(&self) -> &str {
        "system_prompt"
    }

    async fn execute(&self, agent: &Agent, loop_data: &mut LoopData) -> Result<()> {
        let text = self.prompts.render(
            echelon_prompts::AGENT_SYSTEM,
            &[("agent_number", &agent.ordinal().to_string())],
        )?;
        loop_data.system_parts.push(text);
        Ok(())
    }
}
