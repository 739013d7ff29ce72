//! Compute provider abstraction
//!
//! The lifecycle controller only talks to the compute API through
//! [`ComputeProvider`], so the EC2 adapter can be swapped for an in-memory
//! fake in tests.

pub mod ec2;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ControlError, Result};

/// Instance state as reported by the compute API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
    Unknown,
}

impl RemoteState {
    /// No further transition will happen on its own
    pub fn is_gone(&self) -> bool {
        matches!(self, RemoteState::ShuttingDown | RemoteState::Terminated)
    }
}

impl std::fmt::Display for RemoteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RemoteState::Pending => "pending",
            RemoteState::Running => "running",
            RemoteState::Stopping => "stopping",
            RemoteState::Stopped => "stopped",
            RemoteState::ShuttingDown => "shutting-down",
            RemoteState::Terminated => "terminated",
            RemoteState::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Result of a describe call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInstance {
    pub state: RemoteState,
    /// Public address, present once the node is running
    pub public_address: Option<String>,
}

#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Current state and public address of `id`
    async fn describe(&self, id: &str) -> Result<RemoteInstance>;

    /// Allocates one node from the launch template and returns its id
    async fn create(&self, template_id: Option<&str>) -> Result<String>;

    /// Requests a start, returning the state the node was in before
    async fn start(&self, id: &str) -> Result<RemoteState>;

    /// Requests a stop, returning the state the node was in before
    async fn stop(&self, id: &str) -> Result<RemoteState>;

    /// Polls `describe` until the node reports `target`
    ///
    /// Fails with [`ControlError::Timeout`] once `timeout` has elapsed, and
    /// early with [`ControlError::Provider`] if the node is being terminated.
    async fn wait_until(
        &self,
        id: &str,
        target: RemoteState,
        timeout: Duration,
        poll: Duration,
    ) -> Result<RemoteInstance> {
        let started = Instant::now();
        loop {
            let remote = self.describe(id).await?;
            if remote.state == target {
                return Ok(remote);
            }
            if remote.state.is_gone() && !target.is_gone() {
                return Err(ControlError::Provider(format!(
                    "instance {} is {} while waiting for {}",
                    id, remote.state, target
                )));
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(ControlError::Timeout {
                    what: format!("{} to reach {}", id, target),
                    elapsed,
                });
            }
            debug!("Instance {} is {}, waiting for {}", id, remote.state, target);
            tokio::time::sleep(poll.min(timeout - elapsed)).await;
        }
    }
}
