//! Per-iteration scratch state for one monologue run.

use echelon_core::message::Message;

/// State threaded through the extension phases of a single monologue.
///
/// Created fresh at the top of each outer-loop pass and discarded when
/// the pass exits. The system prompt parts are cleared and rebuilt every
/// inner-loop iteration; the history snapshot is refreshed alongside
/// them.
#[derive(Debug, Default)]
pub struct LoopData {
    /// Inner-loop iteration index; -1 before the first pass,
    /// incremented at the top of each iteration.
    pub iteration: i64,

    /// Ordered system prompt parts, rebuilt every iteration by the
    /// `message_loop_prompts` phase.
    pub system_parts: Vec<String>,

    /// The message that started this monologue pass.
    pub user_message: String,

    /// History length at the start of the pass; everything from this
    /// offset was produced by the current run.
    pub history_from: usize,

    /// Snapshot of the agent's history for the current iteration.
    pub history: Vec<Message>,
}

impl LoopData {
    pub fn new(user_message: impl Into<String>, history_from: usize) -> Self {
        Self {
            iteration: -1,
            system_parts: Vec::new(),
            user_message: user_message.into(),
            history_from,
            history: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_before_first_iteration() {
        let data = LoopData::new("hello", 3);
        assert_eq!(data.iteration, -1);
        assert_eq!(data.history_from, 3);
        assert_eq!(data.user_message, "hello");
        assert!(data.system_parts.is_empty());
    }
}
