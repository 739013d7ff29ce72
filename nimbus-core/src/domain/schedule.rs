//! Schedule domain types
//!
//! A schedule turns an instance on at a wall-clock time of day and off again
//! `duration_minutes` later, every day.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minutes in a day; end times wrap around midnight
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Errors raised while validating schedule input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("invalid time of day '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("duration must be a positive number of minutes, got {0}")]
    NonPositiveDuration(i64),

    #[error(
        "duration must be shorter than a day, got {0} minutes (start and stop would coincide)"
    )]
    DurationTooLong(i64),
}

/// Wall-clock time of day with minute resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<Self, ScheduleError> {
        if hour > 23 || minute > 59 {
            return Err(ScheduleError::InvalidTime(format!("{}:{}", hour, minute)));
        }
        Ok(Self { hour, minute })
    }

    /// Parses `H:MM` / `HH:MM`
    pub fn parse(input: &str) -> Result<Self, ScheduleError> {
        let invalid = || ScheduleError::InvalidTime(input.to_string());

        let (hour, minute) = input.trim().split_once(':').ok_or_else(invalid)?;
        if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return Err(invalid());
        }
        let hour: u8 = hour.parse().map_err(|_| invalid())?;
        let minute: u8 = minute.parse().map_err(|_| invalid())?;

        Self::new(hour, minute).map_err(|_| invalid())
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Minutes elapsed since midnight
    pub fn minutes_since_midnight(&self) -> u32 {
        self.hour as u32 * 60 + self.minute as u32
    }

    fn from_minutes(minutes: u32) -> Self {
        let minutes = minutes % MINUTES_PER_DAY;
        Self {
            hour: (minutes / 60) as u8,
            minute: (minutes % 60) as u8,
        }
    }

    /// Adds minutes, wrapping around midnight
    pub fn add_minutes(&self, minutes: u32) -> Self {
        Self::from_minutes(self.minutes_since_midnight() + minutes % MINUTES_PER_DAY)
    }

    pub fn to_naive_time(&self) -> chrono::NaiveTime {
        chrono::NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0)
            .unwrap_or(chrono::NaiveTime::MIN)
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl std::str::FromStr for TimeOfDay {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ScheduleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// Daily on/off schedule of one instance
///
/// `end_time` is derived once when the schedule is built and stays fixed
/// until the schedule is replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub instance_id: String,
    pub start_time: TimeOfDay,
    pub duration_minutes: u32,
    pub end_time: TimeOfDay,
}

impl Schedule {
    /// Validates operator input and derives the end time
    pub fn new(
        instance_id: impl Into<String>,
        start_time: TimeOfDay,
        duration_minutes: i64,
    ) -> Result<Self, ScheduleError> {
        if duration_minutes <= 0 {
            return Err(ScheduleError::NonPositiveDuration(duration_minutes));
        }
        if duration_minutes >= MINUTES_PER_DAY as i64 {
            return Err(ScheduleError::DurationTooLong(duration_minutes));
        }
        let duration_minutes = duration_minutes as u32;

        Ok(Self {
            instance_id: instance_id.into(),
            start_time,
            duration_minutes,
            end_time: start_time.add_minutes(duration_minutes),
        })
    }

    /// Parses a `HH:MM` start time and builds the schedule
    pub fn parse(
        instance_id: impl Into<String>,
        start_time: &str,
        duration_minutes: i64,
    ) -> Result<Self, ScheduleError> {
        Self::new(instance_id, TimeOfDay::parse(start_time)?, duration_minutes)
    }
}
