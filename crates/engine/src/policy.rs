//! Turn termination policy.
//!
//! The inner monologue loop has no natural exit of its own: a reply that
//! triggers no follow-up action must end the turn *somewhere*, and in the
//! full system that boundary belongs to the tool-execution layer. The
//! engine makes it an injectable policy instead of guessing.

use crate::loop_data::LoopData;

/// Decides, after each completed iteration, whether the turn is over.
pub trait TurnPolicy: Send + Sync {
    /// Called with the iteration's final response text. Returning `true`
    /// ends the monologue with that response; `false` issues another
    /// iteration.
    fn end_turn(&self, loop_data: &LoopData, response: &str) -> bool;
}

/// Ends the turn after one completed reply.
///
/// This is the behavior a tool layer would produce for a plain reply
/// that requests no delegation or tool call, and the default policy.
pub struct SingleReplyPolicy;

impl TurnPolicy for SingleReplyPolicy {
    fn end_turn(&self, _loop_data: &LoopData, _response: &str) -> bool {
        true
    }
}

/// Keeps iterating until a fixed number of iterations have completed.
///
/// Useful for multi-pass reasoning setups and for exercising the
/// iteration machinery in tests.
pub struct IterationCapPolicy {
    max_iterations: i64,
}

impl IterationCapPolicy {
    pub fn new(max_iterations: i64) -> Self {
        Self { max_iterations }
    }
}

impl TurnPolicy for IterationCapPolicy {
    fn end_turn(&self, loop_data: &LoopData, _response: &str) -> bool {
        loop_data.iteration + 1 >= self.max_iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_reply_always_ends() {
        let data = LoopData::new("m", 0);
        assert!(SingleReplyPolicy.end_turn(&data, "any reply"));
    }

    #[test]
    fn iteration_cap_counts_completed_iterations() {
        let policy = IterationCapPolicy::new(3);
        let mut data = LoopData::new("m", 0);

        data.iteration = 0;
        assert!(!policy.end_turn(&data, "r"));
        data.iteration = 1;
        assert!(!policy.end_turn(&data, "r"));
        data.iteration = 2;
        assert!(policy.end_turn(&data, "r"));
    }
}
