//! Instance domain types

use serde::{Deserialize, Serialize};

use crate::domain::schedule::Schedule;

/// Number of id characters kept when deriving a default display name
const DEFAULT_NAME_LEN: usize = 8;

/// A tracked compute node
///
/// Structure shared between controller (owns and persists) and client (displays).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Identifier assigned by the compute provider
    pub id: String,

    /// Operator-assigned label
    pub display_name: String,

    /// Current lifecycle status
    pub status: InstanceStatus,

    /// Reachable application endpoint, only present while running
    pub url: Option<String>,

    /// Daily on/off schedule, kept in sync by the scheduler
    #[serde(default)]
    pub schedule: Option<Schedule>,
}

impl Instance {
    /// Creates a record with the given status and a display name
    /// defaulting to a truncated form of the id.
    pub fn new(id: impl Into<String>, display_name: Option<String>, status: InstanceStatus) -> Self {
        let id = id.into();
        let display_name = display_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| default_display_name(&id));

        Self {
            id,
            display_name,
            status,
            url: None,
            schedule: None,
        }
    }
}

/// Derives the default label for an instance id
pub fn default_display_name(id: &str) -> String {
    if id.chars().count() <= DEFAULT_NAME_LEN {
        return id.to_string();
    }
    let prefix: String = id.chars().take(DEFAULT_NAME_LEN).collect();
    format!("{}...", prefix)
}

/// Lifecycle status of a tracked instance
///
/// `Created -> Setup -> Running` for freshly created nodes,
/// `Stopped <-> Running` through start/stop, and any state can fall into `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Node allocated, software not installed yet
    Created,

    /// Software installed, application not launched yet
    Setup,

    /// Start issued, waiting for the node to come up
    Starting,

    /// Node running and application launched
    Running,

    /// Stop issued, waiting for the node to halt
    Stopping,

    /// Node halted
    Stopped,

    /// Node no longer exists on the provider side
    Terminated,

    /// Last lifecycle operation failed
    Error,
}

impl InstanceStatus {
    /// Whether a node in this status is expected to expose its application
    pub fn is_running(&self) -> bool {
        matches!(self, InstanceStatus::Running)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InstanceStatus::Created => "created",
            InstanceStatus::Setup => "setup",
            InstanceStatus::Starting => "starting",
            InstanceStatus::Running => "running",
            InstanceStatus::Stopping => "stopping",
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::Terminated => "terminated",
            InstanceStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_display_name_truncates_long_ids() {
        assert_eq!(default_display_name("i-0123456789abcdef"), "i-012345...");
        assert_eq!(default_display_name("i-0123"), "i-0123");
    }

    #[test]
    fn test_new_instance_uses_given_name() {
        let instance = Instance::new(
            "i-0123456789abcdef",
            Some("build box".to_string()),
            InstanceStatus::Created,
        );
        assert_eq!(instance.display_name, "build box");
        assert!(instance.url.is_none());
        assert!(instance.schedule.is_none());
    }

    #[test]
    fn test_blank_name_falls_back_to_default() {
        let instance = Instance::new("i-0123456789abcdef", Some("  ".to_string()), InstanceStatus::Stopped);
        assert_eq!(instance.display_name, "i-012345...");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&InstanceStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
        assert_eq!(InstanceStatus::Setup.to_string(), "setup");
    }
}
