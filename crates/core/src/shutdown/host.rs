//! Powering off the host.

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::info;

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("no shutdown command configured")]
    EmptyCommand,

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("shutdown command exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },
}

/// Something that can shut the host down.
#[async_trait]
pub trait HostShutdown: Send + Sync {
    fn name(&self) -> &str;

    async fn shutdown(&self) -> Result<(), ShutdownError>;
}

/// Runs an external command such as `shutdown -h now`.
pub struct CommandShutdown {
    command: Vec<String>,
}

impl CommandShutdown {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl HostShutdown for CommandShutdown {
    fn name(&self) -> &str {
        "command"
    }

    async fn shutdown(&self) -> Result<(), ShutdownError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or(ShutdownError::EmptyCommand)?;

        info!("Running shutdown command: {}", self.command.join(" "));
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|source| ShutdownError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ShutdownError::CommandFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
