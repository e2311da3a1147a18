//! HTTP API of the reservation service.
//!
//! - [`property`]: calendar reads, owner calendar management and the internal
//!   lock / commit / release / unbook endpoints used by remote booking services
//! - [`booking`]: tenant and owner booking endpoints
//! - [`internal`]: service-to-service booking reads
//!
//! Every error response carries an [`ErrorBody`].

pub mod booking;
pub mod extractors;
pub mod internal;
pub mod property;

use crate::state::AppState;
use axum::{Json, Router, http::StatusCode, response::IntoResponse, response::Response};
use rentchain_core::calendar::LockError;
use rentchain_core::reservation::BookingError;
use rentchain_sdk::objects::ErrorBody;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(property::router())
        .merge(booking::router())
        .merge(internal::router())
}

pub(crate) fn error_response(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Errors that can occur in API handlers.
#[derive(Debug)]
pub enum ApiError {
    Lock(LockError),
    Booking(BookingError),
}

impl From<LockError> for ApiError {
    fn from(err: LockError) -> Self {
        ApiError::Lock(err)
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        ApiError::Booking(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ApiError::Lock(e) => match e {
                LockError::InvalidRange { .. } | LockError::RangeTooLong { .. } => {
                    (StatusCode::BAD_REQUEST, "validation")
                }
                LockError::Unavailable => (StatusCode::CONFLICT, "conflict"),
                LockError::InvalidOrExpiredLock => (StatusCode::GONE, "invalid_or_expired_lock"),
                LockError::PropertyNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                LockError::NotOwner { .. } => (StatusCode::FORBIDDEN, "unauthorized"),
                LockError::MinimumStay { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "minimum_stay")
                }
                LockError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            },
            ApiError::Booking(e) => match e {
                BookingError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
                BookingError::Conflict => (StatusCode::CONFLICT, "conflict"),
                BookingError::InvalidOrExpiredLock => {
                    (StatusCode::GONE, "invalid_or_expired_lock")
                }
                BookingError::Unauthorized(_) => (StatusCode::FORBIDDEN, "unauthorized"),
                BookingError::InvalidState { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "invalid_state")
                }
                BookingError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                BookingError::DuplicateTransaction(_) => {
                    (StatusCode::CONFLICT, "duplicate_transaction")
                }
                BookingError::ServiceIntegration(_) => {
                    (StatusCode::BAD_GATEWAY, "service_integration")
                }
                BookingError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            },
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            match &self {
                ApiError::Lock(e) => tracing::error!(error = %e, "Calendar API internal error"),
                ApiError::Booking(e) => tracing::error!(error = %e, "Booking API internal error"),
            }
            "internal server error".to_string()
        } else {
            if status == StatusCode::BAD_GATEWAY {
                tracing::warn!(error = ?self, "Collaborator call failed");
            }
            match &self {
                ApiError::Lock(e) => e.to_string(),
                ApiError::Booking(e) => e.to_string(),
            }
        };
        error_response(status, kind, &message)
    }
}
