//! Container execution.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CodeExecutor, ExecutionError, ExecutionOutput, Result, SCRIPT_FILE};

const WORKSPACE: &str = "/workspace";

/// Runs scripts in a disposable Docker container with networking disabled.
#[derive(Debug, Clone)]
pub struct DockerExecutor {
    image: String,
    timeout: Duration,
}

impl DockerExecutor {
    /// Creates a Docker executor.
    ///
    /// # Errors
    /// Returns [`ExecutionError::RuntimeNotFound`] if `docker` is not on the path.
    pub fn new(image: impl Into<String>, timeout: Duration) -> Result<Self> {
        std::process::Command::new("docker")
            .arg("--version")
            .output()
            .map_err(|e| ExecutionError::RuntimeNotFound(format!("Docker not found: {}", e)))?;

        Ok(Self::with_image(image, timeout))
    }

    fn with_image(image: impl Into<String>, timeout: Duration) -> Self {
        Self { image: image.into(), timeout }
    }

    /// Builds the `docker run` arguments for a scratch directory.
    fn build_run_args(&self, container: &str, workdir: &Path) -> Vec<String> {
        vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container.to_string(),
            "--network=none".to_string(),
            "-v".to_string(),
            format!("{}:{}", workdir.display(), WORKSPACE),
            "-w".to_string(),
            WORKSPACE.to_string(),
            self.image.clone(),
            "python".to_string(),
            format!("{}/{}", WORKSPACE, SCRIPT_FILE),
        ]
    }
}

#[async_trait]
impl CodeExecutor for DockerExecutor {
    async fn execute(&self, script: &str) -> Result<ExecutionOutput> {
        let workdir = tempfile::tempdir()?;
        tokio::fs::write(workdir.path().join(SCRIPT_FILE), script).await?;

        let container = format!("loupe-{}", uuid::Uuid::new_v4());
        debug!(image = %self.image, container = %container, "Running generation script in container");

        let child = Command::new("docker")
            .args(self.build_run_args(&container, workdir.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => Ok(output?.into()),
            Err(_) => {
                // Killing the client does not stop the container.
                let removed = Command::new("docker").args(["rm", "-f", &container]).output().await;
                if let Err(e) = removed {
                    warn!(container = %container, error = %e, "Failed to remove timed-out container");
                }
                Err(ExecutionError::Timeout { seconds: self.timeout.as_secs() })
            }
        }
    }

    fn name(&self) -> &'static str {
        "docker"
    }
}
