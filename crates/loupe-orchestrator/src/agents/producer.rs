//! Artifact producer.
//!
//! Asks a coder model for an image-generating script, runs it, and turns the
//! printed base64 into an [`ImageArtifact`].

use loupe_abstraction::{ChatMessage, Model, ModelParameters};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::artifact::ImageArtifact;
use crate::error::GenerationError;
use crate::execution::{CodeExecutor, ExecutionError, ExecutionOutput};
use crate::message::{AgentId, Message};
use crate::prompts::CREATOR_SYSTEM_PROMPT;

/// Longest execution log kept in an artifact message.
const MAX_LOG_CHARS: usize = 2_000;

/// Output lines longer than this are payload, not log.
const MAX_LOG_LINE: usize = 200;

static CODE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:python3?|py)?[ \t]*\r?\n(.*?)```").expect("code block regex should be valid")
});

/// Producer settings.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Sampling temperature for the coder model.
    pub temperature: f32,
    /// System prompt for the coder model.
    pub system_prompt: String,
    /// Budget for one coder model call.
    pub model_timeout: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            system_prompt: CREATOR_SYSTEM_PROMPT.to_string(),
            model_timeout: Duration::from_secs(120),
        }
    }
}

/// Agent that produces image artifacts by executing generated code.
pub struct ArtifactProducer {
    id: AgentId,
    model: Arc<dyn Model + Send + Sync>,
    executor: Arc<dyn CodeExecutor>,
    config: ProducerConfig,
}

impl fmt::Debug for ArtifactProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactProducer")
            .field("id", &self.id)
            .field("model", &self.model.model_id())
            .field("executor", &self.executor.name())
            .finish_non_exhaustive()
    }
}

impl ArtifactProducer {
    /// Creates a producer with default settings.
    pub fn new(
        id: impl Into<AgentId>,
        model: Arc<dyn Model + Send + Sync>,
        executor: Arc<dyn CodeExecutor>,
    ) -> Self {
        Self { id: id.into(), model, executor, config: ProducerConfig::default() }
    }

    /// Replaces the producer settings.
    #[must_use]
    pub fn with_config(mut self, config: ProducerConfig) -> Self {
        self.config = config;
        self
    }

    /// Agent id.
    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Model behind this producer.
    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    /// Generates, runs and validates a script for the given task.
    ///
    /// # Errors
    /// Any failure of the model call, the script run, or image validation.
    pub async fn produce(&self, input: &Message, round: u32) -> Result<Message, GenerationError> {
        debug!(agent_id = %self.id, round, input_len = input.text.len(), "Producer requesting script");

        let messages = [
            ChatMessage::system(self.config.system_prompt.clone()),
            ChatMessage::user(input.text.clone()),
        ];
        let parameters = ModelParameters::with_temperature(self.config.temperature);

        let response = tokio::time::timeout(
            self.config.model_timeout,
            self.model.generate_chat_completion(&messages, Some(parameters)),
        )
        .await
        .map_err(|_| GenerationError::Timeout { seconds: self.config.model_timeout.as_secs() })?
        .map_err(|e| {
            error!(agent_id = %self.id, error = %e, "Coder model call failed");
            e
        })?;

        let script = extract_script(&response.content).ok_or(GenerationError::NoScript)?;
        debug!(agent_id = %self.id, script_len = script.len(), executor = self.executor.name(), "Running script");

        let output = self.executor.execute(&script).await.map_err(|e| match e {
            ExecutionError::Timeout { seconds } => GenerationError::Timeout { seconds },
            other => GenerationError::Execution(other),
        })?;

        if !output.success() {
            return Err(GenerationError::ExecutionFailed {
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        let artifact = ImageArtifact::find_in_output(&output.stdout)?;
        info!(
            agent_id = %self.id,
            round,
            media_type = %artifact.media_type,
            width = artifact.width,
            height = artifact.height,
            "Artifact produced"
        );

        let text = format!(
            "Generated {} image ({}x{}).\n\nScript:\n```python\n{}\n```\n\nExecution log:\n{}",
            artifact.media_type,
            artifact.width,
            artifact.height,
            script.trim_end(),
            execution_log(&output),
        );
        Ok(Message::artifact(self.id.clone(), text, artifact, round))
    }
}

/// First fenced code block in a reply.
pub fn extract_script(reply: &str) -> Option<String> {
    CODE_BLOCK
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|script| !script.trim().is_empty())
}

fn execution_log(output: &ExecutionOutput) -> String {
    let log: Vec<&str> = output
        .stdout
        .lines()
        .chain(output.stderr.lines())
        .filter(|line| !line.trim().is_empty() && line.len() <= MAX_LOG_LINE)
        .collect();
    if log.is_empty() {
        return "(no output besides the image)".to_string();
    }
    crate::message::excerpt(&log.join("\n"), MAX_LOG_CHARS)
}
