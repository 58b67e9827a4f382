use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use appointment_cell::{appointment_routes, AppointmentBookingService};
use rate_limit_cell::{rate_limit_middleware, RateLimitPreset, RateLimitState, RateLimiter};
use shared_config::AppConfig;

#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<AppConfig>,
    pub limiter: Arc<RateLimiter>,
    pub booking: Arc<AppointmentBookingService>,
}

pub fn create_router(state: ApiState) -> Router {
    let auth_limit = middleware::from_fn_with_state(
        RateLimitState::new(
            state.limiter.clone(),
            RateLimitPreset::Auth,
            state.config.trust_proxy_headers,
        ),
        rate_limit_middleware,
    );

    // Authentication itself lives with the session provider; this endpoint
    // only lets clients and probes exercise the auth admission budget.
    let auth_routes = Router::new()
        .route("/attempt", post(|| async { StatusCode::NO_CONTENT }))
        .layer(auth_limit);

    Router::new()
        .route("/", get(|| async { "Support Forge API is running!" }))
        .route("/health", get(health).with_state(state.clone()))
        .nest("/auth", auth_routes)
        .nest(
            "/appointments",
            appointment_routes(
                state.booking.clone(),
                state.limiter.clone(),
                state.config.clone(),
            ),
        )
}

async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "rate_limit_backend": if state.config.uses_redis() { "redis" } else { "memory" },
        "rate_limit_tracked_keys": state.limiter.tracked_keys().await
    }))
}
