//! Result of a finished conversation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::message::AgentId;
use crate::policy::Verdict;
use crate::transcript::Transcript;

use super::state::ConversationState;

/// Why a conversation completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinishReason {
    /// The latest review approved the artifact.
    Approved,
    /// A reply carried an explicit stop instruction.
    StopRequested {
        /// Agent that asked to stop.
        agent: AgentId,
    },
}

/// Why a conversation was aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// Every round was used without approval.
    RoundBudgetExceeded {
        /// Configured round limit.
        max_rounds: u32,
    },
    /// An agent failed after exhausting its retries.
    AgentFailed {
        /// Failing agent.
        agent: AgentId,
        /// Error kind.
        #[serde(rename = "error_kind")]
        kind: String,
        /// Error message.
        error: String,
    },
    /// The cancellation token fired.
    Cancelled,
}

/// How a conversation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Finish {
    /// Reached `Completed`.
    Completed(FinishReason),
    /// Reached `Aborted`.
    Aborted(AbortReason),
}

impl Finish {
    /// Terminal state this finish corresponds to.
    pub fn state(&self) -> ConversationState {
        match self {
            Self::Completed(_) => ConversationState::Completed,
            Self::Aborted(_) => ConversationState::Aborted,
        }
    }
}

impl fmt::Display for Finish {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(FinishReason::Approved) => write!(f, "artifact approved"),
            Self::Completed(FinishReason::StopRequested { agent }) => {
                write!(f, "stop requested by {}", agent)
            }
            Self::Aborted(AbortReason::RoundBudgetExceeded { max_rounds }) => {
                write!(f, "round budget of {} exhausted without approval", max_rounds)
            }
            Self::Aborted(AbortReason::AgentFailed { agent, kind, error }) => {
                write!(f, "agent {} failed ({}): {}", agent, kind, error)
            }
            Self::Aborted(AbortReason::Cancelled) => write!(f, "cancelled"),
        }
    }
}

/// Everything a finished conversation produced.
///
/// Returned for every run, including aborted ones, with the transcript as it
/// stood when the conversation stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationOutcome {
    /// Conversation id.
    pub conversation_id: String,
    /// Terminal state.
    pub state: ConversationState,
    /// How it ended.
    pub finish: Finish,
    /// Verdict of the latest review, `Undetermined` if there was none.
    pub verdict: Verdict,
    /// Every message exchanged.
    pub transcript: Transcript,
    /// Completed produce/review rounds.
    pub rounds: u32,
    /// Agent turns taken.
    pub turns: u32,
}

impl ConversationOutcome {
    /// Whether the conversation completed.
    pub fn is_completed(&self) -> bool {
        self.state == ConversationState::Completed
    }

    /// Most recent artifact in the transcript.
    pub fn final_artifact(&self) -> Option<&crate::artifact::ImageArtifact> {
        self.transcript.latest_artifact().and_then(|m| m.artifact.as_ref())
    }
}
