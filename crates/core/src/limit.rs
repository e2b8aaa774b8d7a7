//! Rate limiting for model calls.
//!
//! The engine reserves an estimated token cost before every generation
//! and suspends until the limiter grants it. The trait keeps the engine
//! ignorant of the policy; the sliding-window implementation bounds both
//! call count and input tokens per window.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Grants permission to issue a model call.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Reserve `estimated_tokens` of input budget, suspending until the
    /// reservation fits inside the current window.
    async fn reserve(&self, estimated_tokens: usize);
}

/// A limiter that always grants immediately. Useful in tests.
pub struct NoopLimiter;

#[async_trait]
impl RateLimiter for NoopLimiter {
    async fn reserve(&self, _estimated_tokens: usize) {}
}

/// Sliding-window limiter over call count and input tokens.
///
/// Tracks `(timestamp, tokens)` per granted reservation and expires
/// entries older than the window. The lock is held only to inspect or
/// mutate the queue, never while sleeping.
pub struct SlidingWindowLimiter {
    max_requests: usize,
    max_input_tokens: usize,
    window: Duration,
    entries: Mutex<VecDeque<(Instant, usize)>>,
}

impl SlidingWindowLimiter {
    /// `max_requests` and `max_input_tokens` of zero mean "unlimited"
    /// for that dimension.
    pub fn new(max_requests: usize, max_input_tokens: usize, window: Duration) -> Self {
        Self {
            max_requests,
            max_input_tokens,
            window,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Try to reserve now. Returns how long to wait before retrying, or
    /// `None` when the reservation was granted.
    fn try_reserve(&self, tokens: usize) -> Option<Duration> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        while let Some(&(t, _)) = entries.front() {
            if now.duration_since(t) >= self.window {
                entries.pop_front();
            } else {
                break;
            }
        }

        let used_tokens: usize = entries.iter().map(|&(_, t)| t).sum();
        let requests_ok = self.max_requests == 0 || entries.len() < self.max_requests;
        let tokens_ok =
            self.max_input_tokens == 0 || used_tokens + tokens <= self.max_input_tokens;

        if requests_ok && tokens_ok {
            entries.push_back((now, tokens));
            return None;
        }

        // Wait until the oldest entry leaves the window.
        let wait = entries
            .front()
            .map(|&(t, _)| self.window.saturating_sub(now.duration_since(t)))
            .unwrap_or(self.window);
        Some(wait.max(Duration::from_millis(10)))
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn reserve(&self, estimated_tokens: usize) {
        loop {
            match self.try_reserve(estimated_tokens) {
                None => return,
                Some(wait) => {
                    debug!(
                        wait_ms = wait.as_millis() as u64,
                        estimated_tokens, "Rate limit reached, waiting"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}
