// =====================================================================================
// RATE LIMIT MIDDLEWARE TESTS
// =====================================================================================

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    middleware,
    routing::post,
    Router,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tower::ServiceExt;

use rate_limit_cell::middleware::{HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET};
use rate_limit_cell::{
    rate_limit_middleware, InMemoryRateLimitStore, RateLimitEntry, RateLimitError,
    RateLimitPreset, RateLimitState, RateLimitStore, RateLimiter,
};
use shared_utils::clock::{Clock, ManualClock};
use shared_utils::test_utils::test_clock;

fn app(limiter: Arc<RateLimiter>, preset: RateLimitPreset) -> Router {
    Router::new()
        .route("/attempt", post(|| async { StatusCode::NO_CONTENT }))
        .layer(middleware::from_fn_with_state(
            RateLimitState::new(limiter, preset, true),
            rate_limit_middleware,
        ))
}

fn limiter(clock: &ManualClock) -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(
        Arc::new(InMemoryRateLimitStore::new()),
        Arc::new(clock.clone()),
    ))
}

fn attempt_from(ip: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/attempt")
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn admitted_requests_carry_rate_limit_headers() {
    let clock = test_clock();
    let app = app(limiter(&clock), RateLimitPreset::Auth);

    let response = app.oneshot(attempt_from("203.0.113.7")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers().get(HEADER_LIMIT).unwrap(), "5");
    assert_eq!(response.headers().get(HEADER_REMAINING).unwrap(), "4");
    let expected_reset = (clock.now() + Duration::minutes(15)).timestamp().to_string();
    assert_eq!(response.headers().get(HEADER_RESET).unwrap(), expected_reset.as_str());
}

#[tokio::test]
async fn exceeding_the_preset_returns_429_with_retry_after() {
    let clock = test_clock();
    let limiter = limiter(&clock);

    for _ in 0..5 {
        let response = app(limiter.clone(), RateLimitPreset::Auth)
            .oneshot(attempt_from("203.0.113.8"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    clock.advance(Duration::minutes(5));

    let response = app(limiter.clone(), RateLimitPreset::Auth)
        .oneshot(attempt_from("203.0.113.8"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "600");
    assert_eq!(response.headers().get(HEADER_REMAINING).unwrap(), "0");

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("auth"));
}

#[tokio::test]
async fn other_clients_are_not_affected() {
    let clock = test_clock();
    let limiter = limiter(&clock);

    for _ in 0..6 {
        app(limiter.clone(), RateLimitPreset::Auth)
            .oneshot(attempt_from("203.0.113.9"))
            .await
            .unwrap();
    }

    let response = app(limiter, RateLimitPreset::Auth)
        .oneshot(attempt_from("198.51.100.1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn window_reset_readmits_client() {
    let clock = test_clock();
    let limiter = limiter(&clock);

    for _ in 0..4 {
        app(limiter.clone(), RateLimitPreset::Registration)
            .oneshot(attempt_from("192.0.2.44"))
            .await
            .unwrap();
    }

    clock.advance(Duration::hours(1));

    let response = app(limiter, RateLimitPreset::Registration)
        .oneshot(attempt_from("192.0.2.44"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers().get(HEADER_REMAINING).unwrap(), "2");
}

struct UnreachableStore;

#[async_trait]
impl RateLimitStore for UnreachableStore {
    async fn hit(
        &self,
        _key: &str,
        _window: Duration,
        _now: DateTime<Utc>,
    ) -> Result<RateLimitEntry, RateLimitError> {
        Err(RateLimitError::StoreUnavailable("connection refused".to_string()))
    }

    async fn sweep_expired(&self, _now: DateTime<Utc>) -> Result<usize, RateLimitError> {
        Err(RateLimitError::StoreUnavailable("connection refused".to_string()))
    }

    async fn tracked_keys(&self) -> Option<usize> {
        None
    }
}

#[tokio::test]
async fn store_outage_admits_requests_without_headers() {
    let limiter = Arc::new(RateLimiter::new(Arc::new(UnreachableStore), Arc::new(test_clock())));

    for _ in 0..10 {
        let response = app(limiter.clone(), RateLimitPreset::Auth)
            .oneshot(attempt_from("203.0.113.10"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(HEADER_LIMIT).is_none());
    }
}
