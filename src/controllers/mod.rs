pub mod reservations;
pub mod seats;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use crate::error::{ErrorKind, ReservationError};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(reservations::routes())
        .merge(seats::routes())
}

/// Error response body: `{"error": message, "code": status}`.
#[derive(Debug)]
pub enum ApiError {
    MissingUserId,
    Reservation(ReservationError),
}

impl From<ReservationError> for ApiError {
    fn from(e: ReservationError) -> Self {
        ApiError::Reservation(e)
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        ApiError::Reservation(e.into())
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::InvalidState => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::ResourceBusy => StatusCode::LOCKED,
        ErrorKind::ValidationFailed => StatusCode::BAD_REQUEST,
        ErrorKind::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MissingUserId => (StatusCode::UNAUTHORIZED, "X-User-ID header is required".to_string()),
            ApiError::Reservation(e) => {
                let status = status_for(e.kind());
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!(error = %e, "Request failed");
                    (status, "internal server error".to_string())
                } else {
                    (status, e.to_string())
                }
            }
        };

        (status, Json(json!({ "error": message, "code": status.as_u16() }))).into_response()
    }
}
