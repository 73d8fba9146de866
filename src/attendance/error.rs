use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;

use crate::model::attendance::RecordStatus;

/// Everything the attendance core can refuse to do. None of these are fatal:
/// the caller re-prompts, retries next cycle, or asks an administrator.
#[derive(Debug, Display, Clone, PartialEq)]
pub enum AttendanceError {
    #[display(fmt = "invalid input: {}", _0)]
    InvalidInput(String),

    #[display(fmt = "no shift starts near this time; select a shift explicitly")]
    NoApplicableShift,

    #[display(fmt = "shift {} is not configured at this location", _0)]
    UnknownShift(u64),

    #[display(fmt = "not within any registered location")]
    OutsideGeofence { nearest_meters: Option<f64> },

    #[display(fmt = "record {} is {}", record_id, status)]
    InvalidState { record_id: u64, status: RecordStatus },
}

impl std::error::Error for AttendanceError {}

impl ResponseError for AttendanceError {
    fn status_code(&self) -> StatusCode {
        match self {
            AttendanceError::InvalidInput(_) | AttendanceError::UnknownShift(_) => StatusCode::BAD_REQUEST,
            AttendanceError::NoApplicableShift | AttendanceError::OutsideGeofence { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AttendanceError::InvalidState { .. } => StatusCode::CONFLICT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = json!({ "message": self.to_string() });
        if let AttendanceError::OutsideGeofence { nearest_meters: Some(m) } = self {
            body["nearest_meters"] = json!(m.round());
        }
        HttpResponse::build(self.status_code()).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_http_statuses() {
        assert_eq!(AttendanceError::InvalidInput("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AttendanceError::NoApplicableShift.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            AttendanceError::InvalidState { record_id: 7, status: RecordStatus::Completed }.status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn state_message_names_status() {
        let err = AttendanceError::InvalidState { record_id: 7, status: RecordStatus::Pending };
        assert_eq!(err.to_string(), "record 7 is pending");
    }
}
