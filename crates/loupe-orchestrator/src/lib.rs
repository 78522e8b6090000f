//! Produce/review conversation orchestrator for Loupe.
//!
//! One agent generates an image by running model-written code, another
//! reviews it with a vision model, and a termination policy decides whether
//! the conversation ends or loops back with the reviewer's feedback.
//!
//! - [`agents`]: the closed set of participants (producer, describer, coordinator)
//! - [`conversation`]: the turn-taking state machine and its event stream
//! - [`policy`]: review classification and stop detection
//! - [`execution`]: host and container script runners
//! - [`config`]: environment settings and `loupe.toml`

pub mod agents;
pub mod artifact;
pub mod config;
pub mod conversation;
pub mod error;
pub mod execution;
pub mod message;
pub mod offline;
pub mod policy;
pub mod prompts;
pub mod transcript;

pub use agents::{
    ArtifactProducer, Capability, ConfirmationGate, ConversationAgent, Coordinator, DescriberConfig,
    ProducerConfig, VisionDescriber,
};
pub use artifact::{ArtifactError, ImageArtifact};
pub use config::{LoupeConfig, Provider, Settings};
pub use conversation::{
    AbortReason, Conversation, ConversationBuilder, ConversationConfig, ConversationEvent,
    ConversationOutcome, ConversationState, Finish, FinishReason,
};
pub use error::{
    AgentError, AmbiguityReason, ConfigError, GenerationError, OrchestrationError, PolicyAmbiguity,
    RemoteModelError,
};
pub use execution::{CodeExecutionConfig, CodeExecutor, ExecutionError, ExecutionOutput, ExecutorFactory};
pub use message::{AgentId, Message, MessageRole};
pub use policy::{TerminationPolicy, Verdict, classify};
pub use transcript::Transcript;
