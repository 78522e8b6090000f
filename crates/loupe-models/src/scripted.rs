//! Scripted model for tests and offline runs.
//!
//! `ScriptedModel` answers each request with the next queued reply and keeps a
//! copy of every request it receives, so callers can assert on the prompts an
//! agent actually sent.

use async_trait::async_trait;
use loupe_abstraction::{ChatMessage, Model, ModelError, ModelParameters, ModelResponse, ModelUsage};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// A request captured by [`ScriptedModel`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Messages sent with the request.
    pub messages: Vec<ChatMessage>,
    /// Parameters sent with the request.
    pub parameters: Option<ModelParameters>,
}

/// A model that replays queued replies in order.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    id: String,
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    /// Creates a model with an empty script.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Self::default() }
    }

    /// Queues a successful reply.
    #[must_use]
    pub fn reply(self, content: impl Into<String>) -> Self {
        self.push(Ok(content.into()));
        self
    }

    /// Queues a failure.
    #[must_use]
    pub fn fail(self, error: ModelError) -> Self {
        self.push(Err(error));
        self
    }

    /// Sleeps before answering each request.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(&self, entry: Result<String, ModelError>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(entry);
        }
    }

    /// Returns a snapshot of every request received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Number of queued replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Model for ScriptedModel {
    async fn generate_chat_completion(
        &self,
        messages: &[ChatMessage],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            model_id = %self.id,
            message_count = messages.len(),
            "ScriptedModel generating chat completion"
        );

        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest { messages: messages.to_vec(), parameters });
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .replies
            .lock()
            .map_err(|_| ModelError::Other("script lock poisoned".to_string()))?
            .pop_front();

        let content = match next {
            Some(entry) => entry?,
            None => {
                return Err(ModelError::Other(format!(
                    "ScriptedModel '{}' has no replies left",
                    self.id
                )));
            }
        };

        let prompt_tokens = messages.iter().map(|m| count_tokens(&m.content.text())).sum::<u32>();
        let completion_tokens = count_tokens(&content);

        Ok(ModelResponse {
            content,
            model_id: Some(self.id.clone()),
            usage: Some(ModelUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
        })
    }

    fn model_id(&self) -> &str {
        &self.id
    }
}

/// Count tokens in a string (simplified: word count).
#[allow(clippy::cast_possible_truncation)]
fn count_tokens(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}
