// Conversation transcript
//
// Append-only record of every message in a conversation. Only the
// orchestrator appends; everyone else gets shared references.

use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageRole};

/// Ordered, append-only sequence of messages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Create an empty transcript
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// All messages in order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether nothing has been said yet
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Most recent message carrying an image
    pub fn latest_artifact(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == MessageRole::Artifact)
    }

    /// Most recent review
    pub fn latest_review(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == MessageRole::Review)
    }

    /// All reviews in order
    pub fn reviews(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role == MessageRole::Review)
    }

    /// All messages with the given role
    pub fn with_role(&self, role: MessageRole) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.role == role)
    }

    /// Whether every review follows an artifact of the same round that has
    /// not already been reviewed, and rounds never go backwards
    pub fn is_causally_ordered(&self) -> bool {
        let mut pending_artifact: Option<u32> = None;
        let mut last_round = 0;

        for message in &self.messages {
            if message.round < last_round {
                return false;
            }
            last_round = message.round;

            match message.role {
                MessageRole::Artifact => {
                    if pending_artifact.is_some() {
                        return false;
                    }
                    pending_artifact = Some(message.round);
                }
                MessageRole::Review => match pending_artifact.take() {
                    Some(round) if round == message.round => {}
                    _ => return false,
                },
                MessageRole::Task | MessageRole::Control => {}
            }
        }
        true
    }

    /// Pretty JSON export
    ///
    /// # Errors
    /// Returns an error if serialization fails
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
