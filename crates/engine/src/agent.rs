//! The agent and its monologue state machine.
//!
//! An agent owns a conversation history and runs the generate/respond
//! loop. One agent may have a superior (the agent that delegated to it)
//! and spawn subordinates. The monologue is two nested loops:
//!
//! - The **outer loop** restarts the whole run when an intervention is
//!   observed — the in-progress partial response is discarded and the
//!   intervention text becomes the new input message.
//! - The **inner loop** is the turn-taking cycle: rebuild the system
//!   prompt through the extension phases, reserve rate-limiter budget,
//!   stream the model's response chunk by chunk, append the result to
//!   history, and ask the turn policy whether the turn is over.
//!
//! Interventions are ordinary control flow (`StreamOutcome`), never
//! errors. Recoverable errors become corrective context the model sees
//! on its next iteration; faults terminate the monologue and surface as
//! the owning task's result. Cleanup (clearing the context's streaming
//! agent, the `monologue_end` phase) runs on every exit path.

use crate::context::AgentContext;
use crate::extensions::phase;
use crate::loop_data::LoopData;
use crate::runtime::Runtime;
use echelon_core::error::{EngineError, Result};
use echelon_core::log::{LogItemHandle, LogKind};
use echelon_core::message::Message;
use echelon_core::model::{ChatRequest, compose_request};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Typed per-agent extension state, keyed by type.
///
/// Extensions stash whatever they need here; each type gets one slot.
#[derive(Default)]
pub struct Attributes {
    entries: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Attributes {
    pub fn set<T: Send + Sync + 'static>(&mut self, value: T) {
        self.entries.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.entries
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast().ok())
            .map(|boxed| *boxed)
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }
}

/// How one streamed generation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The stream finished; the accumulated response text.
    Complete(String),
    /// A pending intervention was observed at a chunk boundary; the
    /// partial response is discarded and the intervention text restarts
    /// the monologue.
    Interrupted(String),
}

/// Result of one outer-loop pass.
enum PassOutcome {
    Done(String),
    Restart(String),
}

/// Result of one inner-loop iteration.
enum Step {
    Continue,
    Done(String),
    Restart(String),
}

/// One agent in a context's hierarchy.
pub struct Agent {
    ordinal: u32,
    runtime: Arc<Runtime>,
    context: Weak<AgentContext>,
    superior: Mutex<Weak<Agent>>,
    history: Mutex<Vec<Message>>,
    intervention: Mutex<Option<String>>,
    attributes: Mutex<Attributes>,
}

impl Agent {
    /// Create an agent. The root agent of a context has ordinal 0;
    /// subordinates are usually created through [`Agent::subordinate`].
    pub fn new(ordinal: u32, runtime: Arc<Runtime>, context: Weak<AgentContext>) -> Arc<Self> {
        Arc::new(Self {
            ordinal,
            runtime,
            context,
            superior: Mutex::new(Weak::new()),
            history: Mutex::new(Vec::new()),
            intervention: Mutex::new(None),
            attributes: Mutex::new(Attributes::default()),
        })
    }

    /// Spawn a subordinate one level below this agent.
    pub fn subordinate(self: &Arc<Self>) -> Arc<Self> {
        let sub = Self::new(self.ordinal + 1, self.runtime.clone(), self.context.clone());
        sub.set_superior(self);
        sub
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn name(&self) -> String {
        format!("Agent {}", self.ordinal)
    }

    /// The owning context, if it is still alive.
    pub fn context(&self) -> Option<Arc<AgentContext>> {
        self.context.upgrade()
    }

    /// The agent that delegated to this one, if any and still alive.
    pub fn superior(&self) -> Option<Arc<Agent>> {
        lock(&self.superior).upgrade()
    }

    pub fn set_superior(&self, superior: &Arc<Agent>) {
        *lock(&self.superior) = Arc::downgrade(superior);
    }

    /// Snapshot of the conversation history.
    pub fn history(&self) -> Vec<Message> {
        lock(&self.history).clone()
    }

    pub fn history_len(&self) -> usize {
        lock(&self.history).len()
    }

    /// Append to history. History is append-only; ordering is the
    /// single source of truth for prompt reconstruction.
    pub fn append_message(&self, message: Message) {
        lock(&self.history).push(message);
    }

    /// Set the pending intervention; observed at the next chunk
    /// boundary of a running stream.
    pub fn intervene(&self, text: impl Into<String>) {
        *lock(&self.intervention) = Some(text.into());
    }

    /// The pending intervention, if any, without consuming it.
    pub fn pending_intervention(&self) -> Option<String> {
        lock(&self.intervention).clone()
    }

    fn take_intervention(&self) -> Option<String> {
        lock(&self.intervention).take()
    }

    /// Access the typed extension-state map.
    pub fn with_attributes<R>(&self, f: impl FnOnce(&mut Attributes) -> R) -> R {
        f(&mut lock(&self.attributes))
    }

    /// Run the full generate/respond loop for `message` and return the
    /// final response. The agent remains usable after a fault.
    pub async fn monologue(self: &Arc<Self>, message: impl Into<String>) -> Result<String> {
        let mut message = message.into();
        loop {
            match self.run_pass(&message).await? {
                PassOutcome::Done(text) => return Ok(text),
                PassOutcome::Restart(text) => {
                    info!(agent = %self.name(), "Intervention received, restarting monologue");
                    message = text;
                }
            }
        }
    }

    /// One outer-loop pass: fresh `LoopData`, the start/end phases, and
    /// the inner iteration loop. Cleanup runs regardless of outcome.
    async fn run_pass(self: &Arc<Self>, message: &str) -> Result<PassOutcome> {
        let extensions = self.runtime.extensions.clone();
        let mut loop_data = LoopData::new(message, self.history_len());

        extensions
            .call(phase::MONOLOGUE_START, self, &mut loop_data)
            .await;
        self.append_message(Message::human(message));

        let result = self.run_iterations(&mut loop_data).await;

        if let Some(context) = self.context() {
            context.clear_streaming_agent();
        }
        extensions
            .call(phase::MONOLOGUE_END, self, &mut loop_data)
            .await;
        result
    }

    /// The inner turn-taking loop.
    async fn run_iterations(self: &Arc<Self>, loop_data: &mut LoopData) -> Result<PassOutcome> {
        let extensions = self.runtime.extensions.clone();
        loop {
            if let Some(context) = self.context() {
                context.set_streaming_agent(self);
            }
            loop_data.iteration += 1;
            loop_data.system_parts.clear();
            loop_data.history = self.history();
            extensions
                .call(phase::MESSAGE_LOOP_PROMPTS, self, loop_data)
                .await;

            let step = self.run_iteration(loop_data).await;

            // Finally-semantics: runs even when the iteration faulted.
            extensions
                .call(phase::MESSAGE_LOOP_END, self, loop_data)
                .await;

            match step? {
                Step::Continue => {}
                Step::Done(text) => return Ok(PassOutcome::Done(text)),
                Step::Restart(text) => return Ok(PassOutcome::Restart(text)),
            }
        }
    }

    /// One iteration: compose the prompt, reserve budget, stream the
    /// response, classify the outcome.
    async fn run_iteration(self: &Arc<Self>, loop_data: &mut LoopData) -> Result<Step> {
        let settings = &self.runtime.settings;
        let request = compose_request(
            &settings.model,
            &loop_data.system_parts,
            &loop_data.history,
            settings.temperature,
            settings.max_tokens,
        );

        self.runtime.limiter.reserve(request.estimated_tokens()).await;

        info!(
            agent = %self.name(),
            iteration = loop_data.iteration,
            history = loop_data.history.len(),
            "Generating"
        );
        let progress = self
            .context()
            .map(|context| context.log().log(LogKind::Agent, format!("{}: generating", self.name()), ""));

        match self.stream_response(request, progress.as_ref()).await {
            Ok(StreamOutcome::Complete(text)) => {
                self.append_message(Message::assistant(&text));
                if self.runtime.policy.end_turn(loop_data, &text) {
                    debug!(agent = %self.name(), "Turn complete");
                    Ok(Step::Done(text))
                } else {
                    Ok(Step::Continue)
                }
            }
            Ok(StreamOutcome::Interrupted(text)) => Ok(Step::Restart(text)),
            Err(e) if e.is_recoverable() => {
                let diagnostic = self
                    .runtime
                    .prompts
                    .render(echelon_prompts::ERROR_REPORT, &[("error", &e.to_string())])
                    .unwrap_or_else(|_| format!("An error occurred:\n\n{e}"));
                warn!(agent = %self.name(), error = %e, "Recoverable error, reporting to model");
                if let Some(context) = self.context() {
                    context.log().log(LogKind::Error, "", diagnostic.clone());
                }
                // The model sees its own mistake on the next iteration.
                self.append_message(Message::human(diagnostic));
                Ok(Step::Continue)
            }
            Err(e) => {
                error!(agent = %self.name(), error = %e, "Fault, terminating monologue");
                if let Some(context) = self.context() {
                    context.log().log(LogKind::Error, "Fault", e.to_string());
                }
                Err(e)
            }
        }
    }

    /// Stream one generation, checking the pause flag and the pending
    /// intervention at every chunk boundary. Dropping the receiver
    /// abandons the rest of the generation.
    async fn stream_response(
        &self,
        request: ChatRequest,
        progress: Option<&LogItemHandle>,
    ) -> Result<StreamOutcome> {
        let mut rx = self
            .runtime
            .chat_model
            .stream(request)
            .await
            .map_err(EngineError::Model)?;
        let mut response = String::new();

        while let Some(chunk) = rx.recv().await {
            self.pause_gate().await;
            if let Some(text) = self.take_intervention() {
                return Ok(StreamOutcome::Interrupted(text));
            }
            let chunk = chunk.map_err(EngineError::Model)?;
            if let Some(content) = chunk.content {
                response.push_str(&content);
                if let Some(item) = progress {
                    item.update(response.clone());
                }
            }
        }

        Ok(StreamOutcome::Complete(response))
    }

    /// Cooperative pause: wait at the chunk boundary while the context
    /// is paused. `communicate` unpauses.
    async fn pause_gate(&self) {
        loop {
            match self.context() {
                Some(context) if context.is_paused() => {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                _ => return,
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
