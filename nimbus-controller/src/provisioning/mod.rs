//! Remote provisioning
//!
//! Runs shell commands on an instance's public address. Sequences stop at the
//! first command with a non-zero exit status.

pub mod ssh;

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ControlError, Result};

/// Login used for remote commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshCredentials {
    pub username: String,
    pub key_path: Option<PathBuf>,
}

/// Output of one remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub command: String,
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Human-readable record of the command and what it printed
    pub fn transcript(&self) -> String {
        let mut out = format!("$ {}\nexit status: {}", self.command, self.exit_status);
        if !self.stdout.trim().is_empty() {
            out.push_str("\nstdout:\n");
            out.push_str(self.stdout.trim_end());
        }
        if !self.stderr.trim().is_empty() {
            out.push_str("\nstderr:\n");
            out.push_str(self.stderr.trim_end());
        }
        out
    }
}

/// Results of a command sequence, up to and including the first failure
#[derive(Debug, Clone, Default)]
pub struct SequenceOutcome {
    pub success: bool,
    pub results: Vec<CommandResult>,
}

impl SequenceOutcome {
    /// Converts a failed sequence into a provisioning error carrying the transcript
    pub fn into_result(self) -> Result<()> {
        if self.success {
            return Ok(());
        }
        match self.results.last() {
            Some(failed) => Err(ControlError::Provisioning {
                message: format!(
                    "command '{}' exited with status {}",
                    failed.command, failed.exit_status
                ),
                detail: Some(failed.transcript()),
            }),
            None => Err(ControlError::provisioning("command sequence did not run")),
        }
    }
}

#[async_trait]
pub trait ProvisioningAgent: Send + Sync {
    /// Blocks until the address accepts remote commands
    async fn wait_ready(&self, _address: &str, _creds: &SshCredentials) -> Result<()> {
        Ok(())
    }

    /// Runs one command and captures its output
    ///
    /// A non-zero exit status is returned as a result, not as an error.
    async fn run(&self, address: &str, creds: &SshCredentials, command: &str) -> Result<CommandResult>;

    /// Runs `commands` in order, stopping after the first failure
    async fn run_sequence(
        &self,
        address: &str,
        creds: &SshCredentials,
        commands: &[String],
    ) -> Result<SequenceOutcome> {
        self.wait_ready(address, creds).await?;

        let mut outcome = SequenceOutcome {
            success: true,
            results: Vec::with_capacity(commands.len()),
        };
        for command in commands {
            debug!("Running on {}: {}", address, command);
            let result = self.run(address, creds, command).await?;
            let failed = !result.success();
            outcome.results.push(result);
            if failed {
                outcome.success = false;
                break;
            }
        }
        Ok(outcome)
    }
}
