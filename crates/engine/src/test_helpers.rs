//! Shared test fixtures: a scripted chat model and context builders.

use crate::agent::Agent;
use crate::context::{AgentContext, ContextRegistry};
use crate::runtime::Runtime;
use async_trait::async_trait;
use echelon_core::error::ModelError;
use echelon_core::model::{ChatModel, ChatRequest, ChatResponse, TokenChunk};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};

/// One scripted generation.
pub(crate) enum ScriptedReply {
    /// Delivered as a single chunk, then the stream closes.
    Text(String),
    /// Delivered chunk by chunk. After the first chunk `started` is
    /// notified; each further chunk waits for a `release` permit, so a
    /// test can act mid-stream at a known point.
    Gated {
        chunks: Vec<String>,
        started: Arc<Notify>,
        release: Arc<Notify>,
    },
    /// The request itself fails.
    Fail(ModelError),
}

/// Chat model that plays back a fixed queue of replies, one per call.
pub(crate) struct ScriptedModel {
    replies: Mutex<VecDeque<ScriptedReply>>,
}

impl ScriptedModel {
    pub(crate) fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
        }
    }

    fn next_reply(&self) -> ScriptedReply {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .expect("scripted model ran out of replies")
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, ModelError> {
        match self.next_reply() {
            ScriptedReply::Text(content) => Ok(ChatResponse {
                content,
                usage: None,
                model: "scripted".into(),
            }),
            ScriptedReply::Fail(err) => Err(err),
            ScriptedReply::Gated { .. } => Err(ModelError::NotConfigured(
                "gated replies are stream-only".into(),
            )),
        }
    }

    async fn stream(
        &self,
        _request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<TokenChunk, ModelError>>, ModelError> {
        let reply = self.next_reply();
        let (tx, rx) = mpsc::channel(8);

        match reply {
            ScriptedReply::Fail(err) => return Err(err),
            ScriptedReply::Text(content) => {
                tokio::spawn(async move {
                    let _ = tx
                        .send(Ok(TokenChunk {
                            content: Some(content),
                            done: true,
                            usage: None,
                        }))
                        .await;
                });
            }
            ScriptedReply::Gated {
                chunks,
                started,
                release,
            } => {
                tokio::spawn(async move {
                    let mut chunks = chunks.into_iter();
                    if let Some(first) = chunks.next() {
                        if tx
                            .send(Ok(TokenChunk {
                                content: Some(first),
                                done: false,
                                usage: None,
                            }))
                            .await
                            .is_err()
                        {
                            return;
                        }
                        started.notify_one();
                    }
                    for chunk in chunks {
                        release.notified().await;
                        // A send error means the receiver was dropped and
                        // the generation abandoned
                        if tx
                            .send(Ok(TokenChunk {
                                content: Some(chunk),
                                done: false,
                                usage: None,
                            }))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                });
            }
        }

        Ok(rx)
    }
}

/// A model answering each call with the next plain-text reply.
pub(crate) fn scripted_model(replies: Vec<&str>) -> Arc<ScriptedModel> {
    Arc::new(ScriptedModel::new(
        replies
            .into_iter()
            .map(|r| ScriptedReply::Text(r.to_string()))
            .collect(),
    ))
}

pub(crate) fn test_runtime(model: Arc<ScriptedModel>) -> Runtime {
    Runtime::new(model)
}

/// A fresh context (with its root agent) over a default runtime.
pub(crate) fn test_context(model: Arc<ScriptedModel>) -> (Arc<AgentContext>, Arc<Agent>) {
    test_context_with_runtime(Arc::new(test_runtime(model)))
}

pub(crate) fn test_context_with_runtime(
    runtime: Arc<Runtime>,
) -> (Arc<AgentContext>, Arc<Agent>) {
    let registry = ContextRegistry::new();
    let context = registry
        .create(runtime, None, None)
        .expect("fresh registry cannot collide");
    let agent = context.root_agent();
    (context, agent)
}
