use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;

use super::store::StorageError;
use crate::model::attendance::AttendanceSlot;

#[derive(Debug, Display)]
pub enum AttendanceError {
    /// Missing or malformed input; the message is shown to the user.
    #[display(fmt = "{}", _0)]
    Validation(String),

    #[display(fmt = "Attendance already marked for this date. Please edit existing attendance.")]
    Conflict(AttendanceSlot),

    #[display(fmt = "{}", _0)]
    NotFound(String),

    #[display(fmt = "{}", _0)]
    Storage(StorageError),
}

impl std::error::Error for AttendanceError {}

impl From<StorageError> for AttendanceError {
    fn from(e: StorageError) -> Self {
        AttendanceError::Storage(e)
    }
}

impl AttendanceError {
    pub fn validation(message: impl Into<String>) -> Self {
        AttendanceError::Validation(message.into())
    }
}

impl ResponseError for AttendanceError {
    fn status_code(&self) -> StatusCode {
        match self {
            AttendanceError::Validation(_) => StatusCode::BAD_REQUEST,
            AttendanceError::Conflict(_) => StatusCode::CONFLICT,
            AttendanceError::NotFound(_) => StatusCode::NOT_FOUND,
            AttendanceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AttendanceError::Storage(e) => {
                tracing::error!(error = %e, "Attendance storage failure");
                HttpResponse::InternalServerError().json(json!({
                    "message": "Internal Server Error"
                }))
            }
            AttendanceError::Conflict(slot) => HttpResponse::Conflict().json(json!({
                "message": self.to_string(),
                "slot": slot,
            })),
            _ => HttpResponse::build(self.status_code()).json(json!({
                "message": self.to_string()
            })),
        }
    }
}
