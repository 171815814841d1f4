use axum::{extract::State, routing::post, Json, Router};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::{Claims, Role},
    state::AppState,
};

#[derive(Debug, Deserialize)]
struct TokenRequest {
    sub: Uuid,
    role: Role,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
}

/// Token minting for operational testing; mounted next to the test booking
/// route. Real sign-in lives in the identity service.
pub fn test_routes() -> Router<AppState> {
    Router::new().route("/v1/test/tokens", post(issue_test_token))
}

async fn issue_test_token(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let token = issue_token(&state.auth.secret, req.sub, req.role, state.auth.expiration)
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))?;
    Ok(Json(AuthResponse { token }))
}

/// Mint a bearer token for `sub` acting as `role`.
pub fn issue_token(
    secret: &str,
    sub: Uuid,
    role: Role,
    ttl_seconds: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub,
        role,
        exp: (Utc::now() + Duration::seconds(ttl_seconds as i64)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}
