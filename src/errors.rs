use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::services::booking::BookingError;
use crate::services::dialogue::DialogError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::SlotUnavailable
            | BookingError::DuplicateSameDay
            | BookingError::AlreadyCancelled => AppError::Conflict(err.to_string()),
            BookingError::AppointmentNotFound | BookingError::SlotNotFound => {
                AppError::NotFound(err.to_string())
            }
            BookingError::Persistence(e) => AppError::Database(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {self}");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

/// Chat turns always answer with `{"message": ...}` so the widget can show it.
impl IntoResponse for DialogError {
    fn into_response(self) -> Response {
        let status = match &self {
            DialogError::InputRejected(_)
            | DialogError::IdentityMismatch
            | DialogError::SlotUnavailable
            | DialogError::DuplicateSameDay
            | DialogError::AlreadyCancelled => StatusCode::BAD_REQUEST,
            DialogError::NoAvailability(_) => StatusCode::OK,
            DialogError::SessionNotFound => StatusCode::NOT_FOUND,
            DialogError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({ "message": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
