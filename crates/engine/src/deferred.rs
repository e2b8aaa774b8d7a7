//! Background execution handle for one in-flight monologue run.
//!
//! A `DeferredTask` wraps an asynchronous unit of work. `start()`
//! schedules it on the tokio runtime, `is_alive()` reports liveness,
//! `result()` awaits completion, and `cancel()` requests cooperative
//! cancellation (it takes effect at the wrapped work's next suspension
//! point).
//!
//! `result()` is single-waiter by construction: the first caller takes
//! the join handle, any later caller gets `EngineError::TaskUnavailable`.
//! The context's message-handling path is the sole intended caller.

use echelon_core::error::{EngineError, Result};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::debug;

/// Lifecycle of a deferred task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

type TaskFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// A deferred unit of work producing a `T`.
pub struct DeferredTask<T> {
    state: Arc<Mutex<TaskState>>,
    future: Mutex<Option<TaskFuture<T>>>,
    handle: Mutex<Option<JoinHandle<Result<T>>>>,
    abort: Mutex<Option<AbortHandle>>,
}

impl<T: Send + 'static> DeferredTask<T> {
    /// Wrap a future without scheduling it.
    pub fn new(future: impl Future<Output = Result<T>> + Send + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(TaskState::Pending)),
            future: Mutex::new(Some(Box::pin(future))),
            handle: Mutex::new(None),
            abort: Mutex::new(None),
        }
    }

    /// Schedule the wrapped work on the runtime (pending → running).
    ///
    /// Calling `start` twice is a no-op.
    pub fn start(&self) {
        let Some(future) = lock(&self.future).take() else {
            return;
        };
        *lock(&self.state) = TaskState::Running;

        let state = self.state.clone();
        let handle = tokio::spawn(async move {
            let result = future.await;
            let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
            // A cancel that raced with completion keeps its state
            if *guard == TaskState::Running {
                *guard = match &result {
                    Ok(_) => TaskState::Completed,
                    Err(_) => TaskState::Failed,
                };
            }
            result
        });

        *lock(&self.abort) = Some(handle.abort_handle());
        *lock(&self.handle) = Some(handle);
    }

    /// True while the work is scheduled and not yet finished.
    pub fn is_alive(&self) -> bool {
        *lock(&self.state) == TaskState::Running
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        *lock(&self.state)
    }

    /// Await the task's value. Single-waiter: the first caller claims the
    /// join handle; later callers get `TaskUnavailable`.
    pub async fn result(&self) -> Result<T> {
        let handle = lock(&self.handle).take().ok_or_else(|| {
            EngineError::TaskUnavailable("result already claimed or task not started".into())
        })?;

        match handle.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_cancelled() => Err(EngineError::TaskCancelled),
            Err(join_err) => Err(EngineError::Internal(format!(
                "task panicked: {join_err}"
            ))),
        }
    }

    /// Request cooperative cancellation.
    ///
    /// The wrapped work is aborted at its next suspension point; work
    /// already suspended inside an external call is not preempted
    /// mid-instruction.
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            TaskState::Pending | TaskState::Running => {
                *state = TaskState::Cancelled;
                drop(state);
                lock(&self.future).take();
                if let Some(abort) = lock(&self.abort).as_ref() {
                    debug!("Cancelling deferred task");
                    abort.abort();
                }
            }
            _ => {}
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn completes_with_value() {
        let task = DeferredTask::new(async { Ok(42) });
        assert_eq!(task.state(), TaskState::Pending);
        assert!(!task.is_alive());

        task.start();
        assert_eq!(task.result().await.unwrap(), 42);
        assert_eq!(task.state(), TaskState::Completed);
    }

    #[tokio::test]
    async fn failure_is_captured() {
        let task: DeferredTask<String> =
            DeferredTask::new(async { Err(EngineError::Internal("boom".into())) });
        task.start();

        let err = task.result().await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(task.state(), TaskState::Failed);
    }

    #[tokio::test]
    async fn second_waiter_is_rejected() {
        let task = DeferredTask::new(async { Ok(1) });
        task.start();
        task.result().await.unwrap();

        let err = task.result().await.unwrap_err();
        assert!(matches!(err, EngineError::TaskUnavailable(_)));
    }

    #[tokio::test]
    async fn result_before_start_is_rejected() {
        let task: DeferredTask<i32> = DeferredTask::new(async { Ok(1) });
        let err = task.result().await.unwrap_err();
        assert!(matches!(err, EngineError::TaskUnavailable(_)));
    }

    #[tokio::test]
    async fn cancel_aborts_at_suspension_point() {
        let task: DeferredTask<i32> = DeferredTask::new(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(1)
        });
        task.start();
        assert!(task.is_alive());

        task.cancel();
        assert_eq!(task.state(), TaskState::Cancelled);
        assert!(!task.is_alive());
        assert!(matches!(
            task.result().await.unwrap_err(),
            EngineError::TaskCancelled
        ));
    }

    #[tokio::test]
    async fn cancel_before_start_discards_the_work() {
        let task: DeferredTask<i32> = DeferredTask::new(async { Ok(1) });
        task.cancel();
        task.start();
        assert_eq!(task.state(), TaskState::Cancelled);
    }

    #[tokio::test]
    async fn double_start_is_a_noop() {
        let task = DeferredTask::new(async { Ok(7) });
        task.start();
        task.start();
        assert_eq!(task.result().await.unwrap(), 7);
    }
}
