pub mod config;
mod error;
pub mod helpers;
mod routes;
pub mod tracker;
pub mod validation;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

pub use error::{AppError, ErrorResponse};
use tracker::Tracker;

/// Build metadata reported by /version
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub service: String,
    pub version: String,
    pub sha: String,
    pub build_time: String,
}

impl BuildInfo {
    pub fn from_config(config: &config::Config) -> Self {
        Self {
            service: config.service_name.clone(),
            version: config.build_version.clone(),
            sha: config.build_sha.clone(),
            build_time: config.build_time.clone(),
        }
    }
}

pub struct AppState {
    pub tracker: Tracker,
    /// SHA-256 of the shared ingest key; the key itself is never kept
    pub api_key_hash: String,
    pub server_max_players: usize,
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(tracker: Tracker, api_key: &str, server_max_players: usize, build: BuildInfo) -> Self {
        Self {
            tracker,
            api_key_hash: helpers::hash_api_key(api_key),
            server_max_players,
            build,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Off for tests and trusted deployments
    pub enabled: bool,
    /// Requests per second for /ingest/log
    pub ingest_per_sec: u64,
    /// Burst size for /ingest/log
    pub ingest_burst: u32,
    /// Requests per second for read endpoints
    pub general_per_sec: u64,
    /// Burst size for read endpoints
    pub general_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ingest_per_sec: 50,
            ingest_burst: 200,
            general_per_sec: 10,
            general_burst: 20,
        }
    }
}

impl RateLimitConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn from_config(config: &config::Config) -> Self {
        Self {
            enabled: config.rate_limit_enabled,
            ingest_per_sec: config.rate_limit_ingest_per_sec,
            ingest_burst: config.rate_limit_ingest_burst,
            general_per_sec: config.rate_limit_general_per_sec,
            general_burst: config.rate_limit_general_burst,
        }
    }
}

/// Wrap `routes` in a per-IP governor when rate limiting is enabled
fn rate_limited(
    routes: Router<Arc<AppState>>,
    enabled: bool,
    per_second: u64,
    burst: u32,
) -> Router<Arc<AppState>> {
    if !enabled {
        return routes;
    }

    let governor = GovernorConfigBuilder::default()
        .per_second(per_second.max(1))
        .burst_size(burst.max(1))
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .unwrap();

    routes.layer(GovernorLayer::new(governor))
}

/// Create the application router with the given state and configuration
pub fn create_app(
    state: AppState,
    request_body_limit: usize,
    request_timeout: Duration,
    rate_limit: RateLimitConfig,
) -> Router {
    let state = Arc::new(state);

    // Lenient rate limit for ingest - the log shipper sends lines in bursts
    let ingest_routes = rate_limited(
        Router::new().route("/ingest/log", post(routes::ingest_log)),
        rate_limit.enabled,
        rate_limit.ingest_per_sec,
        rate_limit.ingest_burst,
    );

    // General rate limit for the read endpoints
    let read_routes = rate_limited(
        Router::new()
            .route("/player/online", get(routes::online_players))
            .route("/server/status", get(routes::server_status))
            .route("/raids", get(routes::raids)),
        rate_limit.enabled,
        rate_limit.general_per_sec,
        rate_limit.general_burst,
    );

    Router::new()
        .route("/health", get(routes::health))
        .route("/version", get(routes::version))
        .merge(ingest_routes)
        .merge(read_routes)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(RequestBodyLimitLayer::new(request_body_limit))
        .with_state(state)
}
