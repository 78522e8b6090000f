//! Host execution.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::{CodeExecutor, ExecutionError, ExecutionOutput, Result, SCRIPT_FILE};

/// Runs scripts with a host interpreter inside a scratch directory.
///
/// The child is killed if it outlives its time budget.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    interpreter: String,
    timeout: Duration,
}

impl LocalExecutor {
    /// Creates an executor for the given interpreter.
    pub fn new(interpreter: impl Into<String>, timeout: Duration) -> Self {
        Self { interpreter: interpreter.into(), timeout }
    }

    /// Interpreter used for scripts.
    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }
}

#[async_trait]
impl CodeExecutor for LocalExecutor {
    async fn execute(&self, script: &str) -> Result<ExecutionOutput> {
        let workdir = tempfile::tempdir()?;
        let script_path = workdir.path().join(SCRIPT_FILE);
        tokio::fs::write(&script_path, script).await?;

        debug!(
            interpreter = %self.interpreter,
            script_bytes = script.len(),
            "Running generation script on host"
        );

        let child = Command::new(&self.interpreter)
            .arg(&script_path)
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ExecutionError::RuntimeNotFound(format!(
                    "interpreter '{}' not found",
                    self.interpreter
                )),
                _ => ExecutionError::Io(e),
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExecutionError::Timeout { seconds: self.timeout.as_secs() })??;

        Ok(output.into())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
