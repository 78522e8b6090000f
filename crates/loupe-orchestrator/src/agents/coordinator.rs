//! Coordinator (human proxy).

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::message::{AgentId, Message};

/// Instruction sent when the gate allows another round.
pub const CONTINUE_INSTRUCTION: &str = "CONTINUE";

/// Instruction sent when the gate declines another round.
pub const TERMINATE_INSTRUCTION: &str = "TERMINATE";

/// External confirmation consulted before another revision round.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    /// Returns `true` to let the conversation continue after `review`.
    async fn confirm(&self, review: &Message) -> bool;
}

/// Participant that issues the task and optionally gates further rounds.
#[derive(Clone)]
pub struct Coordinator {
    id: AgentId,
    gate: Option<Arc<dyn ConfirmationGate>>,
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("id", &self.id)
            .field("gated", &self.gate.is_some())
            .finish()
    }
}

impl Coordinator {
    /// Creates an ungated coordinator.
    pub fn new(id: impl Into<AgentId>) -> Self {
        Self { id: id.into(), gate: None }
    }

    /// Requires confirmation before every revision round.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<dyn ConfirmationGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Agent id.
    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Whether a confirmation gate is attached.
    pub fn is_gated(&self) -> bool {
        self.gate.is_some()
    }

    /// Builds the opening task message.
    pub fn issue_task(&self, task: &str) -> Message {
        Message::task(self.id.clone(), task, 0)
    }

    /// Passes judgement on a review. Ungated coordinators stay silent.
    pub async fn coordinate(&self, review: &Message, round: u32) -> Option<Message> {
        let gate = self.gate.as_ref()?;
        let confirmed = gate.confirm(review).await;
        info!(agent_id = %self.id, round, confirmed, "Coordinator confirmation");

        let instruction = if confirmed { CONTINUE_INSTRUCTION } else { TERMINATE_INSTRUCTION };
        Some(Message::control(self.id.clone(), instruction, round))
    }
}
