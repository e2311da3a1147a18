//! Custom Axum extractors for caller identity.
//!
//! Authentication happens at the gateway in front of this service, which
//! forwards the authenticated user id in the `X-User-Id` header.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// The authenticated user making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub i64);

/// Errors returned by the [`CallerId`] extractor.
#[derive(Debug)]
pub enum CallerIdError {
    Missing,
    Invalid,
}

impl IntoResponse for CallerIdError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            CallerIdError::Missing => (StatusCode::UNAUTHORIZED, "missing X-User-Id header"),
            CallerIdError::Invalid => (StatusCode::BAD_REQUEST, "invalid X-User-Id header"),
        };
        super::error_response(status, "unauthenticated", message)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CallerId {
    type Rejection = CallerIdError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or(CallerIdError::Missing)?
            .to_str()
            .map_err(|_| CallerIdError::Invalid)?;
        let id: i64 = value.trim().parse().map_err(|_| CallerIdError::Invalid)?;
        if id <= 0 {
            return Err(CallerIdError::Invalid);
        }
        Ok(CallerId(id))
    }
}
