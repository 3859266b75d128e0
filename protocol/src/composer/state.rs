//! Post flow state machine.
//!
//! ```text
//! Idle -> CheckingBalance -> [Funding] -> Composing -> Submitting -> Confirming -> Done
//!                                             ^            |             |
//!                                             +------------+-------------+  (fresh blockhash)
//! any non-terminal state -> Failed
//! ```
//!
//! Illegal transitions are logged and ignored. `Done` and `Failed` never
//! change again.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostState {
    Idle,
    CheckingBalance,
    Funding,
    Composing,
    Submitting,
    Confirming,
    Done,
    Failed,
}

impl PostState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PostState::Done | PostState::Failed)
    }

    pub fn can_transition_to(self, next: PostState) -> bool {
        use PostState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Failed) => true,
            (Idle, CheckingBalance) => true,
            (CheckingBalance, Funding) | (CheckingBalance, Composing) => true,
            (Funding, Composing) => true,
            (Composing, Submitting) => true,
            (Submitting, Confirming) | (Submitting, Composing) => true,
            (Confirming, Done) | (Confirming, Submitting) | (Confirming, Composing) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One recorded step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: PostState,
    pub to: PostState,
    /// Unix milliseconds.
    pub at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostStateMachine {
    state: PostState,
    history: Vec<Transition>,
}

impl Default for PostStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PostStateMachine {
    pub fn new() -> Self {
        Self {
            state: PostState::Idle,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> PostState {
        self.state
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// Move to `next` if legal. Returns whether the move happened.
    pub fn transition(&mut self, next: PostState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "ignoring illegal post state transition");
            return false;
        }
        debug!(from = %self.state, to = %next, "post state");
        self.history.push(Transition {
            from: self.state,
            to: next,
            at: Utc::now().timestamp_millis(),
        });
        self.state = next;
        true
    }

    pub fn fail(&mut self) {
        self.transition(PostState::Failed);
    }

    /// The sequence of states visited, starting at `Idle`.
    pub fn visited(&self) -> Vec<PostState> {
        let mut states = vec![PostState::Idle];
        states.extend(self.history.iter().map(|t| t.to));
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PostState::*;

    #[test]
    fn happy_path_with_funding() {
        let mut m = PostStateMachine::new();
        for next in [CheckingBalance, Funding, Composing, Submitting, Confirming, Done] {
            assert!(m.transition(next), "{:?}", next);
        }
        assert_eq!(
            m.visited(),
            vec![Idle, CheckingBalance, Funding, Composing, Submitting, Confirming, Done]
        );
    }

    #[test]
    fn illegal_transitions_ignored() {
        let mut m = PostStateMachine::new();
        assert!(!m.transition(Submitting));
        assert_eq!(m.state(), Idle);
        assert!(m.history().is_empty());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut m = PostStateMachine::new();
        m.transition(CheckingBalance);
        m.fail();
        assert_eq!(m.state(), Failed);
        assert!(!m.transition(Composing));
        assert!(!m.transition(Failed));
        assert_eq!(m.history().len(), 2);
    }

    #[test]
    fn recompose_after_expired_blockhash() {
        let mut m = PostStateMachine::new();
        for next in [CheckingBalance, Composing, Submitting, Composing, Submitting, Confirming] {
            assert!(m.transition(next));
        }
        assert_eq!(m.state(), Confirming);
    }
}
