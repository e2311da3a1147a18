//! Booking API handlers.
//!
//! # Endpoints
//!
//! - `POST /bookings`                      – lock dates and create a pending booking
//! - `GET  /bookings`                      – the caller's bookings as tenant or owner
//! - `GET  /bookings/owner/stats`          – owner dashboard totals
//! - `POST /bookings/link-rental`          – attach the escrow rental id
//! - `GET  /bookings/{booking_id}`         – one booking (tenant or owner)
//! - `POST /bookings/{booking_id}/confirm` – submit the payment transaction
//! - `POST /bookings/{booking_id}/cancel`  – cancel and free the dates

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use rentchain_sdk::objects::{
    BookingListQuery, BookingResponse, CancelBookingRequest, ConfirmBookingRequest,
    CreateBookingRequest, LinkRentalRequest,
};

use crate::api::ApiError;
use crate::api::extractors::CallerId;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(create_booking).get(list_bookings))
        .route("/bookings/owner/stats", get(owner_stats))
        .route("/bookings/link-rental", post(link_rental))
        .route("/bookings/{booking_id}", get(get_booking))
        .route("/bookings/{booking_id}/confirm", post(confirm_booking))
        .route("/bookings/{booking_id}/cancel", post(cancel_booking))
}

async fn create_booking(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Json(body): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state.bookings.create(caller, body).await?;
    Ok((StatusCode::CREATED, Json(BookingResponse::from(&booking))))
}

async fn list_bookings(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Query(query): Query<BookingListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let bookings = state
        .bookings
        .list_for(caller, query.role, query.status)
        .await?;
    Ok(Json(
        bookings
            .iter()
            .map(BookingResponse::from)
            .collect::<Vec<_>>(),
    ))
}

async fn owner_stats(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.bookings.owner_stats(caller).await?))
}

async fn link_rental(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Json(body): Json<LinkRentalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state
        .bookings
        .link_rental(
            caller,
            body.property_id,
            body.blockchain_rental_id,
            body.tx_hash.as_deref(),
        )
        .await?;
    Ok(Json(BookingResponse::from(&booking)))
}

async fn get_booking(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(booking_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state.bookings.get_for(booking_id, caller).await?;
    Ok(Json(BookingResponse::from(&booking)))
}

/// Verification is asynchronous: a successful call answers `202 Accepted`
/// with the booking in `PAYMENT_PROCESSING`.
async fn confirm_booking(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(booking_id): Path<i64>,
    Json(body): Json<ConfirmBookingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state
        .bookings
        .confirm(booking_id, caller, &body.tx_hash)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(BookingResponse::from(&booking))))
}

async fn cancel_booking(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(booking_id): Path<i64>,
    body: Option<Json<CancelBookingRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let reason = body.and_then(|Json(body)| body.reason);
    let booking = state.bookings.cancel(booking_id, caller, reason).await?;
    Ok(Json(BookingResponse::from(&booking)))
}
