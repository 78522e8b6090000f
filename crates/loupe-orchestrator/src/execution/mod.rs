//! Code execution for generation scripts.
//!
//! The producer asks a coder model for a script and hands it to a
//! [`CodeExecutor`]. Scripts run either directly on the host
//! ([`LocalExecutor`]) or inside a throwaway container without network access
//! ([`DockerExecutor`]), selected by [`CodeExecutionConfig::use_isolation`].
//!
//! # Example
//!
//! ```rust,no_run
//! use loupe_orchestrator::execution::{CodeExecutionConfig, ExecutorFactory};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = ExecutorFactory::create(&CodeExecutionConfig::default())?;
//! let output = executor.execute("print('hello')").await?;
//! println!("{}", output.stdout);
//! # Ok(())
//! # }
//! ```

mod docker;
mod error;
mod local;

pub use docker::DockerExecutor;
pub use error::{ExecutionError, Result};
pub use local::LocalExecutor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Name of the script file inside the scratch directory.
pub(crate) const SCRIPT_FILE: &str = "script.py";

/// Output of a finished script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ExecutionOutput {
    /// Whether the script exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

impl From<Output> for ExecutionOutput {
    fn from(output: Output) -> Self {
        Self {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Runs generation scripts.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Runs the script to completion and captures its output.
    ///
    /// A non-zero exit is reported through [`ExecutionOutput::exit_code`],
    /// not as an error.
    async fn execute(&self, script: &str) -> Result<ExecutionOutput>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Code execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeExecutionConfig {
    /// Run scripts in a container instead of on the host.
    pub use_isolation: bool,
    /// Wall-clock budget for one script run.
    pub timeout_seconds: u64,
    /// How many recent reviews the producer sees when revising.
    pub max_turns_considered: usize,
    /// Interpreter for host execution.
    pub interpreter: String,
    /// Container image for isolated execution.
    pub image: String,
}

impl Default for CodeExecutionConfig {
    fn default() -> Self {
        Self {
            use_isolation: false,
            timeout_seconds: 60,
            max_turns_considered: 3,
            interpreter: "python3".to_string(),
            image: "python:3.12-slim".to_string(),
        }
    }
}

impl CodeExecutionConfig {
    /// Script time budget as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Creates executors from configuration.
pub struct ExecutorFactory;

impl ExecutorFactory {
    /// Creates the executor selected by `use_isolation`.
    ///
    /// # Errors
    /// Returns [`ExecutionError::RuntimeNotFound`] if isolation is requested
    /// and Docker is not installed.
    pub fn create(config: &CodeExecutionConfig) -> Result<Arc<dyn CodeExecutor>> {
        debug!(
            use_isolation = config.use_isolation,
            timeout_seconds = config.timeout_seconds,
            "Creating code executor"
        );
        if config.use_isolation {
            Ok(Arc::new(DockerExecutor::new(config.image.clone(), config.timeout())?))
        } else {
            Ok(Arc::new(LocalExecutor::new(config.interpreter.clone(), config.timeout())))
        }
    }
}
