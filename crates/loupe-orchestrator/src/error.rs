// Error types for conversations

use loupe_abstraction::ModelError;
use std::fmt;
use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::execution::ExecutionError;

/// Result type for conversation construction
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Process configuration errors. Fatal at startup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is missing or empty
    #[error("Missing required configuration value: {0}")]
    MissingVariable(String),

    /// A value is present but unusable
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue {
        /// Variable or key name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// A config file could not be read
    #[error("Failed to read config file {path}: {reason}")]
    Read {
        /// File path
        path: String,
        /// Underlying error
        reason: String,
    },

    /// A config file is not valid TOML for this schema
    #[error("Failed to parse config file {path}: {reason}")]
    Parse {
        /// File path
        path: String,
        /// Underlying error
        reason: String,
    },
}

/// Failures of the artifact producer
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The coder model call failed
    #[error("Coder model error: {0}")]
    Model(#[from] ModelError),

    /// The coder reply contained no code block
    #[error("Coder reply contained no code block")]
    NoScript,

    /// The script could not be launched
    #[error("Script execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// The script ran but exited unsuccessfully
    #[error("Script exited with code {exit_code:?}: {stderr}")]
    ExecutionFailed {
        /// Process exit code, if any
        exit_code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// The model call or script exceeded its time budget
    #[error("Generation timed out after {seconds}s")]
    Timeout {
        /// Budget in seconds
        seconds: u64,
    },

    /// The script output did not contain a usable image
    #[error("Script produced no valid image: {0}")]
    InvalidArtifact(#[from] ArtifactError),
}

/// Failures of the vision describer
#[derive(Debug, Error)]
pub enum RemoteModelError {
    /// The incoming message had no image attached
    #[error("Message has no image to describe")]
    MissingImage,

    /// The vision model call failed
    #[error("Vision model error: {0}")]
    Request(#[from] ModelError),

    /// The vision model returned nothing
    #[error("Vision model '{model}' returned an empty response")]
    EmptyResponse {
        /// Model that answered
        model: String,
    },

    /// The call exceeded its time budget
    #[error("Vision model call timed out after {seconds}s")]
    Timeout {
        /// Budget in seconds
        seconds: u64,
    },
}

/// Error from a single agent turn
#[derive(Debug, Error)]
pub enum AgentError {
    /// Producer failure
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Describer failure
    #[error(transparent)]
    RemoteModel(#[from] RemoteModelError),
}

impl AgentError {
    /// Short error kind for events and summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Generation(_) => "generation_error",
            Self::RemoteModel(_) => "remote_model_error",
        }
    }

    /// Whether the failure was a time budget being exceeded
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Generation(GenerationError::Timeout { .. })
                | Self::RemoteModel(RemoteModelError::Timeout { .. })
        )
    }
}

/// Errors building a conversation
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// The roster cannot run a produce/review loop
    #[error("Invalid roster: {0}")]
    InvalidRoster(String),

    /// A conversation setting is out of range
    #[error("Invalid conversation config: {0}")]
    InvalidConfig(String),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Why a review could not be classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbiguityReason {
    /// No approval or revision marker found
    NoMarker,
    /// Both approval and revision markers found
    ConflictingMarkers,
    /// The verdict marker is negated
    Negated,
}

impl fmt::Display for AmbiguityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMarker => write!(f, "no verdict marker"),
            Self::ConflictingMarkers => write!(f, "conflicting verdict markers"),
            Self::Negated => write!(f, "negated verdict marker"),
        }
    }
}

/// A review the termination policy could not classify.
///
/// Logged and surfaced as an event; never fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Ambiguous review ({reason}): {excerpt}")]
pub struct PolicyAmbiguity {
    /// What made it ambiguous
    pub reason: AmbiguityReason,
    /// Start of the offending text
    pub excerpt: String,
}
