//! Controller status summary

use serde::{Deserialize, Serialize};

use crate::domain::instance::Instance;
use crate::domain::task::TaskId;

/// Compact view polled by dashboards to detect changes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSummary {
    pub instances: Vec<Instance>,
    pub tasks: Vec<TaskId>,
    pub log_count: usize,
}
