//! Conversation participants.
//!
//! Agents form a closed set: every participant is a producer, a describer
//! or a coordinator, and [`ConversationAgent::reply`] dispatches to the
//! handler for its variant. Agents never touch the transcript; they consume
//! one message and return at most one reply.

pub mod coordinator;
pub mod describer;
pub mod producer;

pub use coordinator::{ConfirmationGate, Coordinator};
pub use describer::{DescriberConfig, VisionDescriber};
pub use producer::{ArtifactProducer, ProducerConfig};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AgentError;
use crate::message::{AgentId, Message};

/// What an agent is able to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Generates artifacts.
    ProduceArtifact,
    /// Reviews artifacts.
    DescribeArtifact,
    /// Issues the task and gates rounds.
    Coordinate,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProduceArtifact => write!(f, "produce-artifact"),
            Self::DescribeArtifact => write!(f, "describe-artifact"),
            Self::Coordinate => write!(f, "coordinate"),
        }
    }
}

/// A conversation participant.
#[derive(Debug)]
pub enum ConversationAgent {
    /// Artifact producer.
    Producer(ArtifactProducer),
    /// Vision describer.
    Describer(VisionDescriber),
    /// Coordinator.
    Coordinator(Coordinator),
}

impl ConversationAgent {
    /// Agent id.
    pub fn id(&self) -> &AgentId {
        match self {
            Self::Producer(agent) => agent.id(),
            Self::Describer(agent) => agent.id(),
            Self::Coordinator(agent) => agent.id(),
        }
    }

    /// Agent capability.
    pub fn capability(&self) -> Capability {
        match self {
            Self::Producer(_) => Capability::ProduceArtifact,
            Self::Describer(_) => Capability::DescribeArtifact,
            Self::Coordinator(_) => Capability::Coordinate,
        }
    }

    /// Remote model the agent talks to, if any.
    pub fn model_id(&self) -> Option<&str> {
        match self {
            Self::Producer(agent) => Some(agent.model_id()),
            Self::Describer(agent) => Some(agent.model_id()),
            Self::Coordinator(_) => None,
        }
    }

    /// Handles one incoming message.
    ///
    /// # Errors
    /// Producer and describer failures, wrapped in [`AgentError`].
    pub async fn reply(&self, input: &Message, round: u32) -> Result<Option<Message>, AgentError> {
        match self {
            Self::Producer(agent) => Ok(Some(agent.produce(input, round).await?)),
            Self::Describer(agent) => Ok(Some(agent.describe(input, round).await?)),
            Self::Coordinator(agent) => Ok(agent.coordinate(input, round).await),
        }
    }
}

impl From<ArtifactProducer> for ConversationAgent {
    fn from(agent: ArtifactProducer) -> Self {
        Self::Producer(agent)
    }
}

impl From<VisionDescriber> for ConversationAgent {
    fn from(agent: VisionDescriber) -> Self {
        Self::Describer(agent)
    }
}

impl From<Coordinator> for ConversationAgent {
    fn from(agent: Coordinator) -> Self {
        Self::Coordinator(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteModelError;
    use loupe_models::ScriptedModel;
    use std::sync::Arc;

    #[test]
    fn test_capability_serializes_kebab_case() {
        assert_eq!(serde_json::to_value(Capability::ProduceArtifact).unwrap(), "produce-artifact");
        assert_eq!(Capability::DescribeArtifact.to_string(), "describe-artifact");
    }

    #[tokio::test]
    async fn test_dispatch_by_variant() {
        let describer: ConversationAgent =
            VisionDescriber::new("reviewer", Arc::new(ScriptedModel::new("vision"))).into();
        assert_eq!(describer.capability(), Capability::DescribeArtifact);
        assert_eq!(describer.model_id(), Some("vision"));

        let err = describer.reply(&Message::task("user", "draw", 0), 1).await.unwrap_err();
        assert!(matches!(err, AgentError::RemoteModel(RemoteModelError::MissingImage)));

        let coordinator: ConversationAgent = Coordinator::new("user").into();
        assert_eq!(coordinator.id().as_str(), "user");
        assert_eq!(coordinator.model_id(), None);
        let review = Message::review("reviewer", "ok", 1);
        assert!(coordinator.reply(&review, 1).await.unwrap().is_none());
    }
}
