//! Error types for script execution.

use std::io;
use thiserror::Error;

/// Result type for script execution.
pub type Result<T> = std::result::Result<T, ExecutionError>;

/// Errors that can occur while running a generation script.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The interpreter or container runtime is not installed.
    #[error("Runtime not found: {0}")]
    RuntimeNotFound(String),

    /// The script did not finish within its time budget.
    #[error("Script timed out after {seconds}s")]
    Timeout {
        /// Budget in seconds.
        seconds: u64,
    },

    /// I/O error while preparing or running the script.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
