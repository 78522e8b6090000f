//! Conversation event model for streaming progress to clients.
//!
//! Events are broadcast while a conversation runs. Receivers that lag or
//! disappear never slow the conversation down.

use serde::{Deserialize, Serialize};

use crate::agents::Capability;
use crate::message::{AgentId, Message};
use crate::policy::Verdict;

use super::outcome::Finish;

/// Identifier correlating the events of one conversation.
pub type ConversationId = String;

/// Progress events emitted by a running conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// The conversation left `Idle`.
    Started {
        conversation_id: ConversationId,
        max_rounds: u32,
        roster: Vec<AgentId>,
    },

    /// An agent is about to take a turn.
    TurnStarted {
        conversation_id: ConversationId,
        agent: AgentId,
        capability: Capability,
        round: u32,
        attempt: u32,
    },

    /// A message was appended to the transcript.
    MessageAppended {
        conversation_id: ConversationId,
        message: Message,
    },

    /// A review was classified.
    VerdictReached {
        conversation_id: ConversationId,
        round: u32,
        verdict: Verdict,
    },

    /// A review could not be classified; the conversation continues.
    PolicyAmbiguity {
        conversation_id: ConversationId,
        round: u32,
        reason: String,
        excerpt: String,
    },

    /// A failed turn will be retried.
    RetryScheduled {
        conversation_id: ConversationId,
        agent: AgentId,
        attempt: u32,
        error: String,
    },

    /// An agent failed for good.
    AgentFailed {
        conversation_id: ConversationId,
        agent: AgentId,
        kind: String,
        error: String,
    },

    /// The conversation reached a terminal state.
    Finished {
        conversation_id: ConversationId,
        finish: Finish,
        verdict: Verdict,
        rounds: u32,
        turns: u32,
    },
}

impl ConversationEvent {
    /// Conversation the event belongs to.
    pub fn conversation_id(&self) -> &str {
        match self {
            Self::Started { conversation_id, .. }
            | Self::TurnStarted { conversation_id, .. }
            | Self::MessageAppended { conversation_id, .. }
            | Self::VerdictReached { conversation_id, .. }
            | Self::PolicyAmbiguity { conversation_id, .. }
            | Self::RetryScheduled { conversation_id, .. }
            | Self::AgentFailed { conversation_id, .. }
            | Self::Finished { conversation_id, .. } => conversation_id,
        }
    }
}
