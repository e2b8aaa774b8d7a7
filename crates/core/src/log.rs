//! Per-session append-only log.
//!
//! Every context carries a `SessionLog` that the engine and the gateway
//! write to: user messages, generation progress, errors. The log is
//! versioned — every mutation (new item or in-place update of an
//! existing item) bumps a monotonic version counter, so pollers can ask
//! "what changed since version N" and re-render only those items. A
//! streaming generation updates one item in place as tokens arrive.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Category of a log item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    User,
    Agent,
    Error,
    Warning,
    Info,
}

/// One entry in a session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogItem {
    /// Position in the log, assigned on creation
    pub no: usize,
    pub kind: LogKind,
    pub heading: String,
    pub content: String,
}

#[derive(Debug)]
struct LogInner {
    items: Vec<LogItem>,
    /// Item numbers in mutation order; `updates.len()` is the version
    updates: Vec<usize>,
    progress: String,
}

/// Append-only, versioned log owned by one context.
///
/// Cheap to clone; all clones share the same state. Locks are held only
/// for the duration of a single mutation or read, never across awaits.
#[derive(Debug, Clone)]
pub struct SessionLog {
    guid: String,
    inner: Arc<Mutex<LogInner>>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self {
            guid: Uuid::new_v4().to_string(),
            inner: Arc::new(Mutex::new(LogInner {
                items: Vec::new(),
                updates: Vec::new(),
                progress: String::new(),
            })),
        }
    }

    /// Identity of this log; a new guid tells pollers to re-fetch from zero.
    pub fn guid(&self) -> &str {
        &self.guid
    }

    /// Append a new item and return a handle for in-place updates.
    pub fn log(
        &self,
        kind: LogKind,
        heading: impl Into<String>,
        content: impl Into<String>,
    ) -> LogItemHandle {
        let heading = heading.into();
        let mut inner = self.lock();
        let no = inner.items.len();
        if !heading.is_empty() {
            inner.progress = heading.clone();
        }
        inner.items.push(LogItem {
            no,
            kind,
            heading,
            content: content.into(),
        });
        inner.updates.push(no);
        drop(inner);
        LogItemHandle {
            log: self.clone(),
            no,
        }
    }

    /// Current version — the number of mutations so far.
    pub fn version(&self) -> usize {
        self.lock().updates.len()
    }

    /// Number of items in the log.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One-line progress summary (last non-empty heading).
    pub fn progress(&self) -> String {
        self.lock().progress.clone()
    }

    /// Items touched since `from_version`, deduplicated, in touch order.
    pub fn output(&self, from_version: usize) -> Vec<LogItem> {
        let inner = self.lock();
        let mut seen = Vec::new();
        for &no in inner.updates.iter().skip(from_version) {
            if !seen.contains(&no) {
                seen.push(no);
            }
        }
        seen.into_iter().map(|no| inner.items[no].clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one log item, for streaming updates.
#[derive(Debug, Clone)]
pub struct LogItemHandle {
    log: SessionLog,
    no: usize,
}

impl LogItemHandle {
    pub fn no(&self) -> usize {
        self.no
    }

    /// Replace the item's content and bump the log version.
    ///
    /// Called repeatedly with the accumulated text while a generation
    /// streams.
    pub fn update(&self, content: impl Into<String>) {
        let mut inner = self.log.lock();
        let no = self.no;
        inner.items[no].content = content.into();
        inner.updates.push(no);
    }

    /// Replace the item's heading and bump the log version.
    pub fn set_heading(&self, heading: impl Into<String>) {
        let heading = heading.into();
        let mut inner = self.log.lock();
        let no = self.no;
        inner.progress = heading.clone();
        inner.items[no].heading = heading;
        inner.updates.push(no);
    }
}
