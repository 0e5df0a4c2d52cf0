use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NotFound,
    OutOfWindow,
    Conflict,
    Forbidden,
    InvalidInput,
}

impl ErrorKind {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::OutOfWindow => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    #[error("Requested time is not in the future")]
    PastDate,
    #[error("Barber does not exist or is inactive")]
    BarberNotFound,
    #[error("Service does not exist")]
    ServiceNotFound,
    #[error("Booking does not exist")]
    BookingNotFound,
    #[error("Requested time lies outside the barber's working hours")]
    OutsideWorkingHours,
    #[error("Requested time overlaps an existing booking")]
    SlotTaken,
    #[error("Booking starts too soon to be cancelled")]
    CancellationTooLate,
    #[error("Booking starts too soon to be modified")]
    ModificationTooLate,
    #[error("Actor is not allowed to perform this action")]
    NotPermitted,
    #[error("Status transition is not allowed")]
    InvalidTransition,
    #[error("Booking is already completed or cancelled")]
    BookingClosed,
    #[error("Duration must be between 1 minute and 24 hours")]
    InvalidDuration,
    #[error("Slot size must be between 1 minute and 24 hours")]
    InvalidSlotSize,
    #[error("Working hours must close after they open")]
    InvalidWorkingHours,
    #[error("Date or time is outside the supported range")]
    OutOfRange,
}

impl RejectionReason {
    pub fn kind(&self) -> ErrorKind {
        use RejectionReason::*;
        match self {
            BarberNotFound | ServiceNotFound | BookingNotFound => ErrorKind::NotFound,
            PastDate | OutsideWorkingHours => ErrorKind::OutOfWindow,
            SlotTaken => ErrorKind::Conflict,
            CancellationTooLate | ModificationTooLate | NotPermitted | InvalidTransition
            | BookingClosed => ErrorKind::Forbidden,
            InvalidDuration | InvalidSlotSize | InvalidWorkingHours | OutOfRange => {
                ErrorKind::InvalidInput
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The write would break the no-overlap invariant, either through the
    /// in-lock re-check or the unique index.
    #[error("Booking conflicts with an active booking")]
    Conflict,
    /// The booking no longer has the status the write was authorized
    /// against.
    #[error("Booking status changed concurrently")]
    StatusChanged,
    #[error("Record not found")]
    NotFound,
    #[error("Storage lock poisoned")]
    Poisoned,
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error(transparent)]
    Rejected(#[from] RejectionReason),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl BookingError {
    #[cfg(test)]
    pub fn rejection(&self) -> Option<RejectionReason> {
        match self {
            BookingError::Rejected(reason) => Some(*reason),
            BookingError::Storage(_) => None,
        }
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        match self {
            BookingError::Rejected(reason) => {
                let kind = reason.kind();
                let body = Json(json!({
                    "error": {
                        "kind": kind,
                        "reason": reason,
                        "message": reason.to_string(),
                    }
                }));
                (kind.status_code(), body).into_response()
            }
            BookingError::Storage(err) => {
                error!(?err, "Storage failure");
                let body = Json(json!({
                    "error": {
                        "kind": "Internal",
                        "message": "An internal server error occurred",
                    }
                }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}
