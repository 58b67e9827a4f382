// =====================================================================================
// RATE LIMIT MIDDLEWARE
// =====================================================================================

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::error;

use shared_models::error::AppError;
use shared_utils::extractor::client_address;

use crate::models::{RateLimitPreset, RateLimitResult};
use crate::services::RateLimiter;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub preset: RateLimitPreset,
    pub trust_proxy_headers: bool,
}

impl RateLimitState {
    pub fn new(limiter: Arc<RateLimiter>, preset: RateLimitPreset, trust_proxy_headers: bool) -> Self {
        Self {
            limiter,
            preset,
            trust_proxy_headers,
        }
    }
}

/// Admit or reject the request under the state's preset, keyed by client address.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_address(&request, state.trust_proxy_headers);

    let result = match state.limiter.check_preset(state.preset, &client).await {
        Ok(result) => result,
        Err(e) => {
            // Store outage must not take the endpoint down with it.
            error!("Rate limit check failed for {}, admitting request: {}", client, e);
            return next.run(request).await;
        }
    };

    if !result.success {
        let retry_after_seconds = result.retry_after_seconds(state.limiter.clock().now());
        let mut response = AppError::TooManyRequests {
            message: format!(
                "Too many {} requests, limit is {} per window. Retry in {} seconds",
                state.preset, result.limit, retry_after_seconds
            ),
            retry_after_seconds,
        }
        .into_response();

        apply_rate_limit_headers(response.headers_mut(), &result);
        return response;
    }

    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &result);
    response
}

pub fn apply_rate_limit_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    headers.insert(HEADER_LIMIT, HeaderValue::from(result.limit));
    headers.insert(HEADER_REMAINING, HeaderValue::from(result.remaining));
    headers.insert(HEADER_RESET, HeaderValue::from(result.reset_time.timestamp()));
}
