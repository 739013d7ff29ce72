//! Controller error types
//!
//! One error enum shared by every controller component. Validation and
//! not-found conditions are returned synchronously to callers; the remaining
//! kinds are caught at the lifecycle operation boundary and written to the
//! operation log.

use std::time::Duration;

use nimbus_core::domain::schedule::ScheduleError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ControlError>;

/// Underlying cause kept on errors that wrap a library failure
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ControlError {
    /// Compute API rejected or failed a request
    #[error("provider error: {0}")]
    Provider(String),

    /// Compute API call failed; the SDK error is kept as the source
    #[error("provider error: failed to {action} {target}")]
    ProviderApi {
        action: String,
        target: String,
        #[source]
        source: BoxError,
    },

    /// Remote command sequence failed or the node was unreachable
    #[error("provisioning error: {message}")]
    Provisioning {
        message: String,
        /// Transcript of the failing command, if one ran
        detail: Option<String>,
    },

    /// Unknown instance id
    #[error("instance {0} not found")]
    NotFound(String),

    /// Instance exists but has no schedule
    #[error("instance {0} has no schedule")]
    NoSchedule(String),

    /// Malformed operator input
    #[error("validation error: {0}")]
    Validation(String),

    /// Bounded wait exceeded
    #[error("timed out after {secs}s waiting for {what}", secs = .elapsed.as_secs())]
    Timeout { what: String, elapsed: Duration },

    /// Trigger still executing a previous fire
    #[error("{0}")]
    Busy(String),

    /// Snapshot persistence failed
    #[error("snapshot error: {message}")]
    Snapshot {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Worker panicked or the runtime went away
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    pub fn snapshot(message: impl Into<String>) -> Self {
        ControlError::Snapshot {
            message: message.into(),
            source: None,
        }
    }

    pub fn provisioning(message: impl Into<String>) -> Self {
        ControlError::Provisioning {
            message: message.into(),
            detail: None,
        }
    }

    /// Renders the error with its source chain and any attached transcript
    pub fn report(&self) -> String {
        let mut report = self.to_string();

        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            report.push_str(&format!("\n  caused by: {}", cause));
            source = cause.source();
        }

        if let ControlError::Provisioning {
            detail: Some(detail),
            ..
        } = self
        {
            report.push('\n');
            report.push_str(detail);
        }

        report
    }
}

impl From<ScheduleError> for ControlError {
    fn from(err: ScheduleError) -> Self {
        ControlError::Validation(err.to_string())
    }
}

impl From<sqlx::Error> for ControlError {
    fn from(err: sqlx::Error) -> Self {
        ControlError::Snapshot {
            message: "database request failed".to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(err: serde_json::Error) -> Self {
        ControlError::Snapshot {
            message: "invalid snapshot document".to_string(),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_error_becomes_validation() {
        let err: ControlError = ScheduleError::NonPositiveDuration(0).into();
        assert!(matches!(err, ControlError::Validation(_)));
    }

    #[test]
    fn test_report_includes_transcript() {
        let err = ControlError::Provisioning {
            message: "command exited with status 1".to_string(),
            detail: Some("$ bash bin/install\nstderr: boom".to_string()),
        };
        let report = err.report();
        assert!(report.starts_with("provisioning error: command exited with status 1"));
        assert!(report.contains("stderr: boom"));
    }

    #[test]
    fn test_report_walks_source_chain() {
        let err = ControlError::ProviderApi {
            action: "start".to_string(),
            target: "i-1".to_string(),
            source: Box::new(std::io::Error::other("connection reset")),
        };
        assert_eq!(
            err.report(),
            "provider error: failed to start i-1\n  caused by: connection reset"
        );

        let parse = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let report = ControlError::from(parse).report();
        assert!(report.starts_with("snapshot error: invalid snapshot document\n  caused by: "));
    }

    #[test]
    fn test_snapshot_without_source() {
        assert_eq!(ControlError::snapshot("disk full").report(), "snapshot error: disk full");
    }

    #[test]
    fn test_timeout_message() {
        let err = ControlError::Timeout {
            what: "i-1 to reach running".to_string(),
            elapsed: Duration::from_secs(600),
        };
        assert_eq!(
            err.to_string(),
            "timed out after 600s waiting for i-1 to reach running"
        );
    }
}
