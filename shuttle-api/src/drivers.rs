use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::post,
    Extension, Json, Router,
};
use serde::Deserialize;
use shuttle_core::Booking;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::Claims;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/driver/bookings/{id}/onboard", post(onboard))
        .route("/v1/driver/bookings/{id}/decline", post(decline))
        .route("/v1/driver/bookings/{id}/complete", post(complete))
}

#[derive(Debug, Deserialize)]
pub struct OnboardBody {
    #[serde(default)]
    pub boarding_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeclineBody {
    pub reason: String,
}

async fn onboard(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    payload: Result<Json<OnboardBody>, JsonRejection>,
) -> Result<Json<Booking>, AppError> {
    let Json(body) = payload?;
    let booking = state
        .bookings
        .onboard(claims.sub, id, body.boarding_code.as_deref())
        .await?;
    Ok(Json(booking))
}

async fn decline(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    payload: Result<Json<DeclineBody>, JsonRejection>,
) -> Result<Json<Booking>, AppError> {
    let Json(body) = payload?;
    Ok(Json(state.bookings.decline_by_driver(claims.sub, id, &body.reason).await?))
}

async fn complete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.complete(claims.sub, id).await?))
}
