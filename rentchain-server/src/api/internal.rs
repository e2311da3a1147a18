//! Service-to-service endpoints.
//!
//! These are not exposed through the public gateway and carry no caller
//! identity.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
};
use rentchain_sdk::objects::BookingResponse;

use crate::api::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/internal/bookings/{booking_id}", get(get_booking))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state.bookings.get(booking_id).await?;
    Ok(Json(BookingResponse::from(&booking)))
}
