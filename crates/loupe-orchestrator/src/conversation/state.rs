//! Conversation lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Conversation lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    /// Built but not started.
    Idle,
    /// Turns are being taken.
    Running,
    /// Finished by approval or an explicit stop instruction.
    Completed,
    /// Finished by round budget, agent failure or cancellation.
    Aborted,
}

impl ConversationState {
    /// Checks if the conversation can move to the given state.
    #[must_use]
    pub fn can_transition_to(&self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Idle, Self::Running) | (Self::Running, Self::Completed | Self::Aborted)
        )
    }

    /// Whether no further turns will be taken.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(ConversationState::Idle.can_transition_to(ConversationState::Running));
        assert!(ConversationState::Running.can_transition_to(ConversationState::Completed));
        assert!(ConversationState::Running.can_transition_to(ConversationState::Aborted));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!ConversationState::Idle.can_transition_to(ConversationState::Completed));
        assert!(!ConversationState::Completed.can_transition_to(ConversationState::Running));
        assert!(!ConversationState::Aborted.can_transition_to(ConversationState::Idle));
        assert!(!ConversationState::Running.can_transition_to(ConversationState::Running));
    }

    #[test]
    fn test_terminal_states() {
        assert!(ConversationState::Completed.is_terminal());
        assert!(ConversationState::Aborted.is_terminal());
        assert!(!ConversationState::Running.is_terminal());
    }
}
