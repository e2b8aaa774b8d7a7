//! Contexts and the context registry.
//!
//! An `AgentContext` owns one conversation: a chain of agents rooted at
//! agent 0, a session log, the pause flag, and at most one in-flight
//! `DeferredTask` at a time. `communicate` is the single entry point for
//! user text: it either starts a new run or, when a run is already
//! alive, turns the text into an intervention broadcast up the chain.
//!
//! Contexts live in an explicit `ContextRegistry` owned by the embedder.
//! Agents hold only weak back-references to their context, so dropping
//! the registry entry (plus any outstanding handles) is enough to tear a
//! context down.

use crate::agent::Agent;
use crate::deferred::DeferredTask;
use crate::runtime::Runtime;
use echelon_core::error::{EngineError, Result};
use echelon_core::log::SessionLog;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info};
use uuid::Uuid;

/// One conversation: an agent chain, its log, and the active task.
pub struct AgentContext {
    id: String,
    name: Option<String>,
    /// Creation order within the registry, for "first context" lookups.
    seq: u64,
    runtime: Arc<Runtime>,
    root: Mutex<Arc<Agent>>,
    streaming: Mutex<Weak<Agent>>,
    task: Mutex<Option<Arc<DeferredTask<String>>>>,
    paused: AtomicBool,
    log: SessionLog,
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl AgentContext {
    fn new(runtime: Arc<Runtime>, id: String, name: Option<String>, seq: u64) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<AgentContext>| Self {
            id,
            name,
            seq,
            root: Mutex::new(Agent::new(0, runtime.clone(), weak.clone())),
            runtime,
            streaming: Mutex::new(Weak::new()),
            task: Mutex::new(None),
            paused: AtomicBool::new(false),
            log: SessionLog::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    pub fn root_agent(&self) -> Arc<Agent> {
        lock(&self.root).clone()
    }

    /// The agent currently generating, if any and still alive.
    pub fn streaming_agent(&self) -> Option<Arc<Agent>> {
        lock(&self.streaming).upgrade()
    }

    pub fn set_streaming_agent(&self, agent: &Arc<Agent>) {
        *lock(&self.streaming) = Arc::downgrade(agent);
    }

    pub fn clear_streaming_agent(&self) {
        *lock(&self.streaming) = Weak::new();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    /// The active task, if one was ever started.
    pub fn task(&self) -> Option<Arc<DeferredTask<String>>> {
        lock(&self.task).clone()
    }

    /// Deliver user text to this context.
    ///
    /// Unpauses the context. If a task is still alive, the text becomes
    /// an intervention: starting at the streaming agent (or the root when
    /// nobody is streaming), up to `broadcast_level` agents along the
    /// superior chain get it — 0 reaches nobody, a negative level the
    /// whole chain — and the existing task is returned. Otherwise a new
    /// task runs the agent chain on the text.
    ///
    /// The task slot lock is never held across an await.
    pub fn communicate(
        self: &Arc<Self>,
        text: impl Into<String>,
        broadcast_level: i32,
    ) -> Arc<DeferredTask<String>> {
        let text = text.into();
        self.set_paused(false);
        let current = self
            .streaming_agent()
            .unwrap_or_else(|| self.root_agent());

        let mut slot = lock(&self.task);
        if let Some(task) = slot.as_ref() {
            if task.is_alive() {
                debug!(context = %self.id, broadcast_level, "Intervening in live task");
                let mut level = broadcast_level;
                let mut next = Some(current);
                while let Some(agent) = next {
                    if level == 0 {
                        break;
                    }
                    agent.intervene(text.clone());
                    level -= 1;
                    next = agent.superior();
                }
                return task.clone();
            }
        }

        debug!(context = %self.id, agent = current.ordinal(), "Starting task");
        let task = Arc::new(DeferredTask::new(run_chain(self.clone(), current, text)));
        task.start();
        *slot = Some(task.clone());
        task
    }

    /// Cancel any active task and replace the agent chain with a fresh
    /// root agent. Identity and session log survive.
    pub fn reset(self: &Arc<Self>) {
        if let Some(task) = self.task() {
            task.cancel();
        }
        self.clear_streaming_agent();
        self.set_paused(false);
        *lock(&self.root) = Agent::new(0, self.runtime.clone(), Arc::downgrade(self));
        info!(context = %self.id, "Context reset");
    }
}

/// Run the chain: the starting agent handles the message, then each
/// response feeds its superior as a tool response, until the root's
/// response resolves the task.
async fn run_chain(
    context: Arc<AgentContext>,
    mut agent: Arc<Agent>,
    text: String,
) -> Result<String> {
    let prompts = &context.runtime().prompts;
    let mut message = prompts.render(echelon_prompts::USER_MESSAGE, &[("message", &text)])?;

    loop {
        let response = agent.monologue(message).await?;
        match agent.superior() {
            Some(superior) => {
                message = prompts.render(
                    echelon_prompts::TOOL_RESPONSE,
                    &[("tool_name", "delegate"), ("tool_response", &response)],
                )?;
                agent = superior;
            }
            None => return Ok(response),
        }
    }
}

/// Explicitly owned collection of live contexts.
pub struct ContextRegistry {
    contexts: Mutex<HashMap<String, Arc<AgentContext>>>,
    counter: AtomicU64,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// Create and register a context. A random id is assigned when none
    /// is given; an explicit id must be free.
    pub fn create(
        &self,
        runtime: Arc<Runtime>,
        id: Option<String>,
        name: Option<String>,
    ) -> Result<Arc<AgentContext>> {
        let mut contexts = lock(&self.contexts);
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if contexts.contains_key(&id) {
            return Err(EngineError::DuplicateContext(id));
        }
        let seq = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let context = AgentContext::new(runtime, id.clone(), name, seq);
        info!(context = %id, seq, "Context created");
        contexts.insert(id, context.clone());
        Ok(context)
    }

    pub fn get(&self, id: &str) -> Option<Arc<AgentContext>> {
        lock(&self.contexts).get(id).cloned()
    }

    /// The earliest-created live context.
    pub fn first(&self) -> Option<Arc<AgentContext>> {
        lock(&self.contexts)
            .values()
            .min_by_key(|context| context.seq())
            .cloned()
    }

    /// Deregister a context. Does not cancel its task; callers that want
    /// the work stopped cancel before removing.
    pub fn remove(&self, id: &str) -> Option<Arc<AgentContext>> {
        let removed = lock(&self.contexts).remove(id);
        if removed.is_some() {
            info!(context = %id, "Context removed");
        }
        removed
    }

    /// All live contexts in creation order.
    pub fn list(&self) -> Vec<Arc<AgentContext>> {
        let mut contexts: Vec<_> = lock(&self.contexts).values().cloned().collect();
        contexts.sort_by_key(|context| context.seq());
        contexts
    }

    pub fn len(&self) -> usize {
        lock(&self.contexts).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
