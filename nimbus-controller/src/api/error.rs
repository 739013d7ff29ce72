//! API Error Handling
//!
//! Maps controller errors onto HTTP responses with a `{"error": "..."}` body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::ControlError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::NotFound(_) | ControlError::NoSchedule(_) => {
                ApiError::NotFound(err.to_string())
            }
            ControlError::Validation(msg) => ApiError::BadRequest(msg),
            ControlError::Busy(msg) => ApiError::Conflict(msg),
            other => ApiError::InternalError(other.report()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ControlError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_of(ControlError::NotFound("i-1".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(ControlError::NoSchedule("i-1".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(ControlError::Validation("bad".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(ControlError::Busy("busy".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(ControlError::Provider("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_message() {
        match ApiError::from(ControlError::NotFound("i-1".into())) {
            ApiError::NotFound(msg) => assert_eq!(msg, "instance i-1 not found"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
