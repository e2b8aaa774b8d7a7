//! Message domain types.
//!
//! A conversation history is an ordered, append-only sequence of
//! `Message` values. History ordering is the single source of truth for
//! prompt reconstruction — no reordering, no deduplication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a message.
///
/// Diagnostics shown to the model (recoverable-error reports, rendered
/// tool responses from subordinates) are tagged `Human` so the model
/// treats them as input on the next turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The user, or framework text presented as user input
    Human,
    /// The model
    Assistant,
}

/// A single message in an agent's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub sender: Sender,

    /// Ordered content segments; joined with blank lines for prompting
    pub segments: Vec<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a human-tagged message with a single segment.
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: Sender::Human,
            segments: vec![content.into()],
            timestamp: Utc::now(),
        }
    }

    /// Create an assistant-tagged message with a single segment.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: Sender::Assistant,
            segments: vec![content.into()],
            timestamp: Utc::now(),
        }
    }

    /// The full text of this message.
    pub fn text(&self) -> String {
        self.segments.join("\n\n")
    }

    /// Rough token estimate (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.segments.iter().map(|s| s.len()).sum::<usize>() / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_human_message() {
        let msg = Message::human("Hello, agent!");
        assert_eq!(msg.sender, Sender::Human);
        assert_eq!(msg.text(), "Hello, agent!");
    }

    #[test]
    fn segments_join_with_blank_lines() {
        let mut msg = Message::assistant("first");
        msg.segments.push("second".into());
        assert_eq!(msg.text(), "first\n\nsecond");
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::human("Test message");
        let json = serde_json::to_string(&msg).unwrap();
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.text(), "Test message");
        assert_eq!(deserialized.sender, Sender::Human);
    }

    #[test]
    fn token_estimate() {
        // 20 chars ≈ 5 tokens
        let msg = Message::human("12345678901234567890");
        assert_eq!(msg.estimated_tokens(), 5);
    }
}
