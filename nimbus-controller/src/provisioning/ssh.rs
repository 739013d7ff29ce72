//! SSH provisioning agent
//!
//! Shells out to the system `ssh` client in batch mode. Each command runs over
//! its own connection; readiness is established once per sequence with a
//! probe that is retried while the node finishes booting.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CommandResult, ProvisioningAgent, SshCredentials};
use crate::error::{ControlError, Result};

/// Exit status the ssh client reports for its own failures
const SSH_CONNECTION_FAILURE: i32 = 255;

#[derive(Debug, Clone)]
pub struct SshSettings {
    /// Attempts of the readiness probe before giving up
    pub connect_retries: u32,
    pub retry_delay: Duration,
    /// Passed to ssh as ConnectTimeout
    pub connect_timeout: Duration,
    /// Upper bound for a single remote command
    pub command_timeout: Duration,
}

pub struct SshAgent {
    settings: SshSettings,
}

impl SshAgent {
    pub fn new(settings: SshSettings) -> Self {
        Self { settings }
    }

    fn command(&self, address: &str, creds: &SshCredentials, remote: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("UserKnownHostsFile=/dev/null")
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.settings.connect_timeout.as_secs().max(1)
            ));
        if let Some(key) = &creds.key_path {
            cmd.arg("-i").arg(key);
        }
        cmd.arg(format!("{}@{}", creds.username, address))
            .arg(remote)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ProvisioningAgent for SshAgent {
    async fn wait_ready(&self, address: &str, creds: &SshCredentials) -> Result<()> {
        let attempts = self.settings.connect_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.run(address, creds, "true").await {
                Ok(result) if result.success() => {
                    debug!("SSH ready on {} after {} attempt(s)", address, attempt);
                    return Ok(());
                }
                Ok(result) => last_error = result.stderr.trim().to_string(),
                Err(e) => last_error = e.to_string(),
            }

            warn!(
                "SSH connection to {} failed (attempt {}/{}): {}",
                address, attempt, attempts, last_error
            );
            if attempt < attempts {
                tokio::time::sleep(self.settings.retry_delay).await;
            }
        }

        Err(ControlError::Provisioning {
            message: format!("could not connect to {} after {} attempts", address, attempts),
            detail: (!last_error.is_empty()).then_some(last_error),
        })
    }

    async fn run(&self, address: &str, creds: &SshCredentials, command: &str) -> Result<CommandResult> {
        let output = tokio::time::timeout(
            self.settings.command_timeout,
            self.command(address, creds, command).output(),
        )
        .await
        .map_err(|_| ControlError::Timeout {
            what: format!("'{}' on {}", command, address),
            elapsed: self.settings.command_timeout,
        })?
        .map_err(|e| ControlError::provisioning(format!("failed to execute ssh: {}", e)))?;

        // Killed by a signal
        let exit_status = output.status.code().unwrap_or(-1);
        if exit_status == SSH_CONNECTION_FAILURE {
            debug!("ssh to {} reported a connection failure", address);
        } else {
            debug!("Command on {} exited with {}: {}", address, exit_status, command);
        }

        Ok(CommandResult {
            command: command.to_string(),
            exit_status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
