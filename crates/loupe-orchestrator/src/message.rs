// Conversation messages
//
// A message is what one participant says in a conversation. Messages are
// plain values; once the orchestrator appends one to a transcript nothing
// hands out a mutable reference to it again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::artifact::ImageArtifact;

/// Identifier of a conversation participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create an agent id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AgentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// What a message is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// The task (or a revision request) addressed to a producer
    Task,
    /// A generated artifact awaiting review
    Artifact,
    /// A reviewer's analysis of an artifact
    Review,
    /// A coordination instruction (continue / terminate)
    Control,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task => write!(f, "task"),
            Self::Artifact => write!(f, "artifact"),
            Self::Review => write!(f, "review"),
            Self::Control => write!(f, "control"),
        }
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who said it
    pub sender: AgentId,
    /// What kind of message it is
    pub role: MessageRole,
    /// Textual content
    pub text: String,
    /// Attached image, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ImageArtifact>,
    /// Review round the message belongs to (0 for the initial task)
    pub round: u32,
    /// When the message was created
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn build(
        sender: AgentId,
        role: MessageRole,
        text: impl Into<String>,
        artifact: Option<ImageArtifact>,
        round: u32,
    ) -> Self {
        Self { sender, role, text: text.into(), artifact, round, timestamp: Utc::now() }
    }

    /// Create a task message
    pub fn task(sender: impl Into<AgentId>, text: impl Into<String>, round: u32) -> Self {
        Self::build(sender.into(), MessageRole::Task, text, None, round)
    }

    /// Create an artifact message carrying an image
    pub fn artifact(
        sender: impl Into<AgentId>,
        text: impl Into<String>,
        artifact: ImageArtifact,
        round: u32,
    ) -> Self {
        Self::build(sender.into(), MessageRole::Artifact, text, Some(artifact), round)
    }

    /// Create a review message
    pub fn review(sender: impl Into<AgentId>, text: impl Into<String>, round: u32) -> Self {
        Self::build(sender.into(), MessageRole::Review, text, None, round)
    }

    /// Create a control message
    pub fn control(sender: impl Into<AgentId>, text: impl Into<String>, round: u32) -> Self {
        Self::build(sender.into(), MessageRole::Control, text, None, round)
    }

    /// Whether an image is attached
    pub fn has_artifact(&self) -> bool {
        self.artifact.is_some()
    }

    /// First `max_chars` characters of the text, for logs and events
    pub fn excerpt(&self, max_chars: usize) -> String {
        excerpt(&self.text, max_chars)
    }
}

pub(crate) fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{cut}...")
}
