pub mod config;
pub mod engine;
mod error;
pub mod helpers;
pub mod history;
pub mod notifier;
pub mod plan;
pub mod rate_limit;
pub mod reconcile;
mod routes;
pub mod scheduler;
pub mod snapshot;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

use axum::{Router, http::StatusCode, middleware, routing::get};
use rate_limit::{RateLimitConfig, RateLimiter};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub db: fivewatch_db::Database,
    pub source: source::HttpStatusSource,
}

/// Create the read-only API router
pub fn create_app(
    state: AppState,
    request_timeout: Duration,
    limits: RateLimitConfig,
) -> Router {
    let state = Arc::new(state);
    let limiter = Arc::new(RateLimiter::new(limits));

    // Public read endpoints share one per-client budget
    let limited_routes = Router::new()
        .route("/status", get(routes::status))
        .route("/player-history", get(routes::player_history))
        .layer(middleware::from_fn_with_state(limiter, rate_limit::rate_limit));

    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .merge(limited_routes)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
