//! Vision describer.

use loupe_abstraction::{ChatMessage, ContentBlock, MessageContent, Model, ModelParameters};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::error::RemoteModelError;
use crate::message::{AgentId, Message};
use crate::prompts::{DESCRIBE_INSTRUCTION, REVIEWER_SYSTEM_PROMPT, REVIEW_REQUEST};

/// Describer settings.
#[derive(Debug, Clone)]
pub struct DescriberConfig {
    /// Sampling temperature for the vision model.
    pub temperature: f32,
    /// System prompt carrying the review format.
    pub system_prompt: String,
    /// Text sent alongside the image.
    pub instruction: String,
    /// Budget for one vision model call.
    pub model_timeout: Duration,
}

impl Default for DescriberConfig {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            system_prompt: REVIEWER_SYSTEM_PROMPT.to_string(),
            instruction: format!("{DESCRIBE_INSTRUCTION} {REVIEW_REQUEST}"),
            model_timeout: Duration::from_secs(120),
        }
    }
}

/// Agent that reviews image artifacts with a vision-capable model.
pub struct VisionDescriber {
    id: AgentId,
    model: Arc<dyn Model + Send + Sync>,
    config: DescriberConfig,
}

impl fmt::Debug for VisionDescriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionDescriber")
            .field("id", &self.id)
            .field("model", &self.model.model_id())
            .finish_non_exhaustive()
    }
}

impl VisionDescriber {
    /// Creates a describer with default settings.
    pub fn new(id: impl Into<AgentId>, model: Arc<dyn Model + Send + Sync>) -> Self {
        Self { id: id.into(), model, config: DescriberConfig::default() }
    }

    /// Replaces the describer settings.
    #[must_use]
    pub fn with_config(mut self, config: DescriberConfig) -> Self {
        self.config = config;
        self
    }

    /// Agent id.
    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Model behind this describer.
    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    /// Reviews the image attached to `input`.
    ///
    /// # Errors
    /// [`RemoteModelError::MissingImage`] without an attachment, otherwise
    /// any failure or empty reply from the vision model.
    pub async fn describe(&self, input: &Message, round: u32) -> Result<Message, RemoteModelError> {
        let artifact = input.artifact.as_ref().ok_or(RemoteModelError::MissingImage)?;

        debug!(
            agent_id = %self.id,
            round,
            media_type = %artifact.media_type,
            "Describer sending image to vision model"
        );

        let messages = [
            ChatMessage::system(self.config.system_prompt.clone()),
            ChatMessage::user(MessageContent::Blocks(vec![
                ContentBlock::text(self.config.instruction.clone()),
                artifact.to_content_block(),
            ])),
        ];
        let parameters = ModelParameters::with_temperature(self.config.temperature);

        let response = tokio::time::timeout(
            self.config.model_timeout,
            self.model.generate_chat_completion(&messages, Some(parameters)),
        )
        .await
        .map_err(|_| RemoteModelError::Timeout { seconds: self.config.model_timeout.as_secs() })?
        .map_err(|e| {
            error!(agent_id = %self.id, error = %e, "Vision model call failed");
            e
        })?;

        let review = response.content.trim();
        if review.is_empty() {
            return Err(RemoteModelError::EmptyResponse { model: self.model.model_id().to_string() });
        }

        debug!(agent_id = %self.id, round, review_len = review.len(), "Review received");
        Ok(Message::review(self.id.clone(), review, round))
    }
}
