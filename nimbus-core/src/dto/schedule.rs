//! Schedule DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::schedule::{Schedule, TimeOfDay};

/// Request to set (or replace) an instance's daily schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSchedule {
    /// Start time as `HH:MM` in the controller's operating timezone
    pub start_time: String,
    pub duration_minutes: i64,
}

/// Schedule together with its resolved trigger times
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleView {
    #[serde(flatten)]
    pub schedule: Schedule,
    pub timezone: String,
    pub next_start: Option<DateTime<Utc>>,
    pub next_stop: Option<DateTime<Utc>>,
}

/// Which lifecycle action a trigger performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Start,
    Stop,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Start => write!(f, "start"),
            Direction::Stop => write!(f, "stop"),
        }
    }
}

/// Diagnostic view of one installed trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerInfo {
    pub instance_id: String,
    pub direction: Direction,
    pub at: TimeOfDay,
    pub next_fire: DateTime<Utc>,
    /// A previous fire of this trigger is still executing
    pub executing: bool,
}
