use axum::{
    extract::{ConnectInfo, State},
    http::{Method, StatusCode},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod auth;
pub mod bookings;
pub mod drivers;
pub mod error;
pub mod middleware;
pub mod state;

pub use state::AppState;

use middleware::auth::{admin_auth_middleware, driver_auth_middleware, passenger_auth_middleware};

/// Build the HTTP router. The test booking and token routes are mounted only when
/// `enable_test_routes` is set.
pub fn app(state: AppState, enable_test_routes: bool) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
            axum::http::HeaderName::from_static("idempotency-key"),
        ]);

    let mut router = Router::new()
        .route("/health", get(health))
        .merge(bookings::routes().route_layer(from_fn_with_state(state.clone(), passenger_auth_middleware)))
        .merge(drivers::routes().route_layer(from_fn_with_state(state.clone(), driver_auth_middleware)))
        .merge(admin::routes().route_layer(from_fn_with_state(state.clone(), admin_auth_middleware)));

    if enable_test_routes {
        tracing::warn!("test booking and token routes enabled");
        router = router.merge(bookings::test_routes()).merge(auth::test_routes());
    }

    let router = router.layer(cors).layer(TraceLayer::new_for_http());

    let router = if state.redis.is_some() {
        router.layer(from_fn_with_state(state.clone(), rate_limit_middleware))
    } else {
        router
    };

    router.with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, impl IntoResponse> {
    let Some(redis) = state.redis.as_ref() else {
        return Ok(next.run(req).await);
    };
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let key = format!("ratelimit:{}", ip);

    match redis.check_rate_limit(&key, state.rate_limit_per_minute, 60).await {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => Err((StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")),
        Err(e) => {
            // Fail open
            tracing::warn!(error = %e, "rate limiter unavailable");
            Ok(next.run(req).await)
        }
    }
}
