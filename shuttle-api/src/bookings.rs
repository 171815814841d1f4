use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use shuttle_booking::{BookingOutcome, BookingRequest, BookingView};
use shuttle_core::Booking;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::Claims;
use crate::state::AppState;

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking).get(list_bookings))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/bookings/{id}/feedback", post(leave_feedback))
}

/// Unauthenticated creation for operational testing; mounted only when
/// `server.enable_test_routes` is set.
pub fn test_routes() -> Router<AppState> {
    Router::new().route("/v1/test/bookings", post(create_test_booking))
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackBody {
    pub rating: i16,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub tip_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct TestBookingBody {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub request: BookingRequest,
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingOutcome>), AppError> {
    let Json(request) = payload?;
    book(&state, claims.sub, with_idempotency_key(request, &headers)).await
}

async fn create_test_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<TestBookingBody>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingOutcome>), AppError> {
    let Json(body) = payload?;
    info!(user_id = %body.user_id, "booking through test route");
    book(&state, body.user_id, with_idempotency_key(body.request, &headers)).await
}

async fn book(
    state: &AppState,
    user_id: Uuid,
    request: BookingRequest,
) -> Result<(StatusCode, Json<BookingOutcome>), AppError> {
    let outcome = state.bookings.create_booking(user_id, request).await?;
    let status = if outcome.replayed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(outcome)))
}

/// The header wins over a key in the body.
fn with_idempotency_key(mut request: BookingRequest, headers: &HeaderMap) -> BookingRequest {
    if let Some(key) = headers.get(IDEMPOTENCY_HEADER).and_then(|v| v.to_str().ok()) {
        request.idempotency_key = Some(key.to_string());
    }
    request
}

async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<BookingView>>, AppError> {
    Ok(Json(state.bookings.list_bookings(claims.sub).await?))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingView>, AppError> {
    Ok(Json(state.bookings.get_booking(claims.sub, id).await?))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    payload: Result<Json<CancelBody>, JsonRejection>,
) -> Result<Json<Booking>, AppError> {
    let Json(body) = payload?;
    let booking = state.bookings.cancel_by_user(claims.sub, id, body.reason).await?;
    Ok(Json(booking))
}

async fn leave_feedback(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    payload: Result<Json<FeedbackBody>, JsonRejection>,
) -> Result<Json<Booking>, AppError> {
    let Json(body) = payload?;
    let booking = state
        .bookings
        .leave_feedback(claims.sub, id, body.rating, body.comment, body.tip_cents)
        .await?;
    Ok(Json(booking))
}
