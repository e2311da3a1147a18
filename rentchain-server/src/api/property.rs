//! Property calendar API handlers.
//!
//! # Endpoints
//!
//! - `GET  /properties/{property_id}/snapshot`                 – property snapshot
//! - `GET  /properties/{property_id}/availability`             – is a range free
//! - `GET  /properties/{property_id}/availability/unavailable` – taken dates in a range
//! - `GET  /properties/{property_id}/availability/booked-by`   – is a range committed for a holder
//! - `GET  /properties/{property_id}/price`                    – price quote
//! - `POST /properties/{property_id}/availability/generate`    – materialize the calendar (owner)
//! - `POST /properties/{property_id}/availability/block`       – manual block (owner)
//! - `POST /properties/{property_id}/availability/unblock`     – undo manual block (owner)
//! - `POST /properties/{property_id}/availability/lock`        – provisional lock
//! - `POST /properties/{property_id}/availability/commit`      – lock to booked
//! - `POST /properties/{property_id}/availability/release`     – give a lock back
//! - `POST /properties/{property_id}/availability/unbook`      – free a cancelled booking's days

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use rentchain_core::calendar::DateRange;
use rentchain_core::calendar::lock_manager::CALENDAR_HORIZON_DAYS;
use rentchain_sdk::objects::{
    AvailabilityResponse, BookedByQuery, BookedByResponse, CommitDatesRequest, DateRangeQuery,
    GenerateCalendarResponse, LockDatesRequest, LockDatesResponse, ManualBlockRequest,
    ReleaseDatesRequest, UnavailableDatesResponse, UnbookDatesRequest,
};
use serde::Serialize;
use time::OffsetDateTime;

use crate::api::ApiError;
use crate::api::extractors::CallerId;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/properties/{property_id}/snapshot", get(get_snapshot))
        .route("/properties/{property_id}/availability", get(check_availability))
        .route(
            "/properties/{property_id}/availability/unavailable",
            get(unavailable_dates),
        )
        .route(
            "/properties/{property_id}/availability/booked-by",
            get(booked_by),
        )
        .route("/properties/{property_id}/price", get(price_quote))
        .route(
            "/properties/{property_id}/availability/generate",
            post(generate_calendar),
        )
        .route("/properties/{property_id}/availability/block", post(block_dates))
        .route(
            "/properties/{property_id}/availability/unblock",
            post(unblock_dates),
        )
        .route("/properties/{property_id}/availability/lock", post(lock_dates))
        .route("/properties/{property_id}/availability/commit", post(commit_dates))
        .route(
            "/properties/{property_id}/availability/release",
            post(release_dates),
        )
        .route("/properties/{property_id}/availability/unbook", post(unbook_dates))
}

/// Days changed by an owner calendar update.
#[derive(Debug, Serialize)]
struct CalendarUpdateResponse {
    property_id: i64,
    days_updated: usize,
}

async fn get_snapshot(
    State(state): State<AppState>,
    Path(property_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.locks.snapshot(property_id).await?))
}

async fn check_availability(
    State(state): State<AppState>,
    Path(property_id): Path<i64>,
    Query(query): Query<DateRangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let range = DateRange::new(query.start_date, query.end_date)?;
    let available = state.locks.is_available(property_id, range).await?;
    Ok(Json(AvailabilityResponse {
        property_id,
        start_date: range.start,
        end_date: range.end,
        available,
    }))
}

async fn unavailable_dates(
    State(state): State<AppState>,
    Path(property_id): Path<i64>,
    Query(query): Query<DateRangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let range = DateRange::new(query.start_date, query.end_date)?;
    let dates = state.locks.unavailable_dates(property_id, range).await?;
    Ok(Json(UnavailableDatesResponse { property_id, dates }))
}

async fn booked_by(
    State(state): State<AppState>,
    Path(property_id): Path<i64>,
    Query(query): Query<BookedByQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let range = DateRange::new(query.start_date, query.end_date)?;
    let booked = state
        .locks
        .is_booked_by(property_id, range, query.holder_id)
        .await?;
    Ok(Json(BookedByResponse {
        property_id,
        holder_id: query.holder_id,
        booked,
    }))
}

async fn price_quote(
    State(state): State<AppState>,
    Path(property_id): Path<i64>,
    Query(query): Query<DateRangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let range = DateRange::new(query.start_date, query.end_date)?;
    Ok(Json(state.locks.quote(property_id, range).await?))
}

/// `POST /properties/{property_id}/availability/generate`: materialize the
/// next year of days starting today. Existing days are left untouched.
async fn generate_calendar(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(property_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.locks.ensure_owner(property_id, caller).await?;
    let today = OffsetDateTime::now_utc().date();
    let days_created = state
        .locks
        .generate_calendar(property_id, today, CALENDAR_HORIZON_DAYS)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(GenerateCalendarResponse {
            property_id,
            days_created,
        }),
    ))
}

async fn block_dates(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(property_id): Path<i64>,
    Json(body): Json<ManualBlockRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let today = OffsetDateTime::now_utc().date();
    let days_updated = state
        .locks
        .block_dates(property_id, caller, &body.dates, today)
        .await?;
    Ok(Json(CalendarUpdateResponse {
        property_id,
        days_updated,
    }))
}

async fn unblock_dates(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(property_id): Path<i64>,
    Json(body): Json<ManualBlockRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let today = OffsetDateTime::now_utc().date();
    let days_updated = state
        .locks
        .unblock_dates(property_id, caller, &body.dates, today)
        .await?;
    Ok(Json(CalendarUpdateResponse {
        property_id,
        days_updated,
    }))
}

async fn lock_dates(
    State(state): State<AppState>,
    Path(property_id): Path<i64>,
    Json(body): Json<LockDatesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let range = DateRange::new(body.check_in, body.check_out)?;
    let grant = state.locks.lock(property_id, range, body.tenant_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(LockDatesResponse {
            lock_token: grant.lock_token,
            expires_at: grant.expires_at.unix_timestamp(),
        }),
    ))
}

async fn commit_dates(
    State(state): State<AppState>,
    Path(property_id): Path<i64>,
    Json(body): Json<CommitDatesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let range = DateRange::new(body.start_date, body.end_date)?;
    tracing::debug!(property_id, tx_hash = body.tx_hash.as_deref(), "Commit requested");
    state
        .locks
        .commit(property_id, body.lock_token, Some(range))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn release_dates(
    State(state): State<AppState>,
    Path(property_id): Path<i64>,
    Json(body): Json<ReleaseDatesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.locks.release(property_id, body.lock_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unbook_dates(
    State(state): State<AppState>,
    Path(property_id): Path<i64>,
    Json(body): Json<UnbookDatesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let range = DateRange::new(body.start_date, body.end_date)?;
    state
        .locks
        .unbook(property_id, range, body.holder_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{OWNER, PROPERTY, TENANT, state};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use rentchain_sdk::objects::{ErrorBody, PriceQuote};
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    fn app(state: AppState) -> Router {
        crate::api::router().with_state(state)
    }

    async fn json<T: DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, caller: Option<i64>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::post(uri).header("content-type", "application/json");
        if let Some(caller) = caller {
            builder = builder.header("X-User-Id", caller.to_string());
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn future_date(days: i64) -> time::Date {
        OffsetDateTime::now_utc().date() + time::Duration::days(days)
    }

    #[tokio::test]
    async fn test_lock_conflict_and_release() {
        let state = state().await;
        let lock = |start: i64, end: i64| {
            post_json(
                &format!("/properties/{PROPERTY}/availability/lock"),
                None,
                serde_json::json!({
                    "check_in": future_date(start).to_string(),
                    "check_out": future_date(end).to_string(),
                    "tenant_id": TENANT,
                }),
            )
        };

        let response = app(state.clone()).oneshot(lock(10, 13)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let grant: LockDatesResponse = json(response).await;

        let response = app(state.clone()).oneshot(lock(12, 14)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body: ErrorBody = json(response).await;
        assert_eq!(body.error, "conflict");

        let release = post_json(
            &format!("/properties/{PROPERTY}/availability/release"),
            None,
            serde_json::json!({ "lock_token": grant.lock_token }),
        );
        let response = app(state.clone()).oneshot(release).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app(state).oneshot(lock(12, 14)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_commit_with_unknown_token_is_gone() {
        let state = state().await;
        let commit = post_json(
            &format!("/properties/{PROPERTY}/availability/commit"),
            None,
            serde_json::json!({
                "start_date": future_date(10).to_string(),
                "end_date": future_date(12).to_string(),
                "lock_token": uuid::Uuid::new_v4(),
            }),
        );
        let response = app(state).oneshot(commit).await.unwrap();
        assert_eq!(response.status(), StatusCode::GONE);
    }

    #[tokio::test]
    async fn test_price_quote_and_min_stay() {
        let state = state().await;
        let uri = |nights: i64| {
            format!(
                "/properties/{PROPERTY}/price?start_date={}&end_date={}",
                future_date(10),
                future_date(10 + nights)
            )
        };

        let response = app(state.clone())
            .oneshot(Request::get(uri(3)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let quote: PriceQuote = json(response).await;
        assert_eq!(quote.number_of_nights, 3);
        assert_eq!(quote.total_price, rust_decimal::Decimal::new(15, 1));
        assert!(quote.available);

        let response = app(state)
            .oneshot(Request::get(uri(1)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_owner_calendar_management() {
        let state = state().await;
        let body = serde_json::json!({ "dates": [future_date(5).to_string()] });
        let uri = format!("/properties/{PROPERTY}/availability/block");

        let response = app(state.clone())
            .oneshot(post_json(&uri, None, body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app(state.clone())
            .oneshot(post_json(&uri, Some(TENANT), body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app(state.clone())
            .oneshot(post_json(&uri, Some(OWNER), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let unavailable = format!(
            "/properties/{PROPERTY}/availability/unavailable?start_date={}&end_date={}",
            future_date(1),
            future_date(10)
        );
        let response = app(state.clone())
            .oneshot(Request::get(unavailable).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let dates: UnavailableDatesResponse = json(response).await;
        assert_eq!(dates.dates, vec![future_date(5)]);

        let generate = Request::post(format!("/properties/{PROPERTY}/availability/generate"))
            .header("X-User-Id", OWNER.to_string())
            .body(Body::empty())
            .unwrap();
        let response = app(state).oneshot(generate).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let generated: GenerateCalendarResponse = json(response).await;
        assert_eq!(generated.days_created, u64::from(CALENDAR_HORIZON_DAYS) - 1);
    }

    #[tokio::test]
    async fn test_booked_by_after_commit() {
        let state = state().await;
        let lock = post_json(
            &format!("/properties/{PROPERTY}/availability/lock"),
            None,
            serde_json::json!({
                "check_in": future_date(20).to_string(),
                "check_out": future_date(22).to_string(),
                "tenant_id": TENANT,
            }),
        );
        let grant: LockDatesResponse = json(app(state.clone()).oneshot(lock).await.unwrap()).await;
        let booked_by = |holder: i64| {
            Request::get(format!(
                "/properties/{PROPERTY}/availability/booked-by?start_date={}&end_date={}&holder_id={holder}",
                future_date(20),
                future_date(22)
            ))
            .body(Body::empty())
            .unwrap()
        };

        let response = app(state.clone()).oneshot(booked_by(TENANT)).await.unwrap();
        let before: BookedByResponse = json(response).await;
        assert!(!before.booked);

        let commit = post_json(
            &format!("/properties/{PROPERTY}/availability/commit"),
            None,
            serde_json::json!({
                "start_date": future_date(20).to_string(),
                "end_date": future_date(22).to_string(),
                "lock_token": grant.lock_token,
            }),
        );
        let response = app(state.clone()).oneshot(commit).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let after: BookedByResponse =
            json(app(state.clone()).oneshot(booked_by(TENANT)).await.unwrap()).await;
        assert!(after.booked);
        let stranger: BookedByResponse =
            json(app(state).oneshot(booked_by(OWNER)).await.unwrap()).await;
        assert!(!stranger.booked);
    }

    #[tokio::test]
    async fn test_oversized_range_is_rejected() {
        let uri = format!(
            "/properties/{PROPERTY}/availability?start_date={}&end_date={}",
            future_date(1),
            future_date(1 + 40 * 365)
        );
        let response = app(state().await)
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = json(response).await;
        assert_eq!(body.error, "validation");
    }

    #[tokio::test]
    async fn test_unknown_property_is_not_found() {
        let response = app(state().await)
            .oneshot(Request::get("/properties/7/snapshot").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
