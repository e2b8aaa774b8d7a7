//! # Echelon Core
//!
//! Domain types, traits, and error definitions for the Echelon
//! agent-orchestration engine. This crate has **zero framework
//! dependencies** — it defines the contracts that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator of the engine (chat model, rate limiter,
//! prompt source) is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod limit;
pub mod log;
pub mod message;
pub mod model;

// Re-export key types at crate root for ergonomics
pub use error::{EngineError, ModelError, PromptError, Result};
pub use limit::{NoopLimiter, RateLimiter, SlidingWindowLimiter};
pub use log::{LogItem, LogItemHandle, LogKind, SessionLog};
pub use message::{Message, Sender};
pub use model::{ChatModel, ChatRequest, ChatResponse, TokenChunk, Usage};
