//! Task DTOs

use serde::{Deserialize, Serialize};

use crate::domain::task::TaskId;

/// Acknowledgment returned when an asynchronous operation is accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAccepted {
    pub task_id: TaskId,
}
