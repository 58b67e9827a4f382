// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post},
    middleware,
};

use rate_limit_cell::{rate_limit_middleware, RateLimitPreset, RateLimitState, RateLimiter};
use shared_config::AppConfig;

use crate::handlers;
use crate::services::booking::AppointmentBookingService;

pub fn appointment_routes(
    service: Arc<AppointmentBookingService>,
    limiter: Arc<RateLimiter>,
    config: Arc<AppConfig>,
) -> Router {
    let booking_limit = middleware::from_fn_with_state(
        RateLimitState::new(limiter, RateLimitPreset::Booking, config.trust_proxy_headers),
        rate_limit_middleware,
    );

    Router::new()
        // Creating a booking is the only rate-limited operation
        .route(
            "/",
            post(handlers::book_appointment)
                .layer(booking_limit)
                .get(handlers::list_appointments),
        )
        .route("/conflicts/check", get(handlers::check_appointment_conflicts))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/reschedule", patch(handlers::reschedule_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/status", patch(handlers::update_appointment_status))
        .with_state(service)
}
