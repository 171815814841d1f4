use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{delete, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use shuttle_core::{Booking, Trip};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::Claims;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/admin/bookings/{id}", delete(delete_booking))
        .route("/v1/admin/trips/{id}/seats", post(adjust_seats))
}

#[derive(Debug, Deserialize)]
pub struct AdminCancelBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeatAdjustment {
    /// Seats to add (positive) or remove (negative).
    pub delta: i32,
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    payload: Result<Json<AdminCancelBody>, JsonRejection>,
) -> Result<Json<Booking>, AppError> {
    let Json(body) = payload?;
    info!(admin = %claims.sub, booking_id = %id, "admin cancellation");
    Ok(Json(state.bookings.cancel_by_admin(id, body.reason).await?))
}

async fn delete_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    info!(admin = %claims.sub, booking_id = %id, "admin hard delete");
    state.bookings.admin_delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn adjust_seats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
    payload: Result<Json<SeatAdjustment>, JsonRejection>,
) -> Result<Json<Trip>, AppError> {
    let Json(body) = payload?;
    info!(admin = %claims.sub, trip_id = %trip_id, delta = body.delta, "manual seat adjustment");
    Ok(Json(state.bookings.adjust_seats(trip_id, body.delta).await?))
}
