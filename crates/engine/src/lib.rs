//! The Echelon orchestration engine.
//!
//! A session (`AgentContext`) owns a chain of cooperating agents. Each
//! agent runs an iterative generate/respond loop (its *monologue*)
//! against a chat model. The engine coordinates exactly one background
//! task per context, lets a user interrupt a running generation without
//! corrupting shared state, and propagates responses up the
//! superior/subordinate chain until the root agent produces the final
//! answer.
//!
//! Control flow in one sentence: a caller submits text to a context →
//! the context either starts a new `DeferredTask` running the current
//! agent's monologue, or, if one is already running, broadcasts the text
//! as an intervention up the active agent chain → the monologue streams
//! model output, checks for intervention at every chunk, appends to
//! history, and on completion forwards the result to the superior agent
//! until the chain bottoms out at the root.

pub mod agent;
pub mod context;
pub mod deferred;
pub mod extensions;
pub mod loop_data;
pub mod policy;
pub mod runtime;

pub use agent::{Agent, Attributes, StreamOutcome};
pub use context::{AgentContext, ContextRegistry};
pub use deferred::{DeferredTask, TaskState};
pub use extensions::{Extension, ExtensionRegistry, SystemPromptExtension, phase};
pub use loop_data::LoopData;
pub use policy::{IterationCapPolicy, SingleReplyPolicy, TurnPolicy};
pub use runtime::{ChatSettings, Runtime};

#[cfg(test)]
pub(crate) mod test_helpers;
