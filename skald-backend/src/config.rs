use std::env::var;
use std::time::Duration;

use dotenvy::dotenv;

use crate::tracker::TrackerSettings;

/// Application configuration with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// Request body size limit in bytes
    /// Env: REQUEST_BODY_LIMIT (default: 65536 = 64KiB)
    pub request_body_limit: usize,

    /// Request timeout in seconds
    /// Env: REQUEST_TIMEOUT_SECS (default: 30)
    pub request_timeout: Duration,

    /// Server port
    /// Env: PORT (default: 3000)
    pub port: u16,

    /// Database file path
    /// Env: DATABASE_PATH (default: "skald.db")
    pub database_path: String,

    /// Per-operation store timeout in milliseconds
    /// Env: STORE_TIMEOUT_MS (default: 500)
    pub store_timeout: Duration,

    /// Shared ingest API key
    /// Env: API_KEY (optional, generated at startup when missing)
    pub api_key: Option<String>,

    /// Online index capacity
    /// Env: MAX_ONLINE (default: 10)
    pub max_online: usize,

    /// Player slots reported to readers
    /// Env: SERVER_MAX_PLAYERS (default: 10)
    pub server_max_players: usize,

    /// Lifetime of a connection candidate in seconds
    /// Env: STEAM_CANDIDATE_TTL_SECS (default: 60)
    pub steam_candidate_ttl: Duration,

    /// Candidate/spawn pairing window in milliseconds
    /// Env: STEAM_PAIR_WINDOW_MS (default: 30000)
    pub steam_pair_window: Duration,

    /// Lifetime of player records, sessions and connection mappings in seconds
    /// Env: PLAYER_TTL_SECS (default: 86400)
    pub player_ttl: Duration,

    /// History entries returned by /server/status
    /// Env: STATUS_HISTORY_LIMIT (default: 20)
    pub status_history_limit: usize,

    /// Interval of the expired-key sweep in seconds
    /// Env: PURGE_INTERVAL_SECS (default: 300)
    pub purge_interval: Duration,

    /// Turn per-IP rate limiting off (tests, trusted deployments)
    /// Env: RATE_LIMIT_ENABLED (default: true)
    pub rate_limit_enabled: bool,

    /// Rate limit for /ingest/log (requests per second)
    /// Env: RATE_LIMIT_INGEST_PER_SEC (default: 50)
    /// This is lenient since a busy server emits log lines in bursts
    pub rate_limit_ingest_per_sec: u64,

    /// Burst size for /ingest/log
    /// Env: RATE_LIMIT_INGEST_BURST (default: 200)
    pub rate_limit_ingest_burst: u32,

    /// Rate limit for read endpoints (requests per second)
    /// Env: RATE_LIMIT_GENERAL_PER_SEC (default: 10)
    pub rate_limit_general_per_sec: u64,

    /// Burst size for read endpoints
    /// Env: RATE_LIMIT_GENERAL_BURST (default: 20)
    pub rate_limit_general_burst: u32,

    /// Env: SERVICE_NAME (default: "skald")
    pub service_name: String,

    /// Env: BUILD_VERSION (default: crate version)
    pub build_version: String,

    /// Env: BUILD_SHA (default: "unknown")
    pub build_sha: String,

    /// Env: BUILD_TIME (default: "unknown")
    pub build_time: String,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let _ = dotenv(); //for debugging mostly
        let defaults = Self::default();
        Self {
            request_body_limit: env_or_default("REQUEST_BODY_LIMIT", defaults.request_body_limit),
            request_timeout: Duration::from_secs(env_or_default("REQUEST_TIMEOUT_SECS", 30)),
            port: env_or_default("PORT", defaults.port),
            database_path: env_or_default_string("DATABASE_PATH", &defaults.database_path),
            store_timeout: Duration::from_millis(env_or_default("STORE_TIMEOUT_MS", 500)),
            api_key: var("API_KEY").ok().filter(|key| !key.trim().is_empty()),
            max_online: env_or_default("MAX_ONLINE", defaults.max_online),
            server_max_players: env_or_default("SERVER_MAX_PLAYERS", defaults.server_max_players),
            steam_candidate_ttl: Duration::from_secs(env_or_default("STEAM_CANDIDATE_TTL_SECS", 60)),
            steam_pair_window: Duration::from_millis(env_or_default("STEAM_PAIR_WINDOW_MS", 30_000)),
            player_ttl: Duration::from_secs(env_or_default("PLAYER_TTL_SECS", 86_400)),
            status_history_limit: env_or_default(
                "STATUS_HISTORY_LIMIT",
                defaults.status_history_limit,
            ),
            purge_interval: Duration::from_secs(env_or_default("PURGE_INTERVAL_SECS", 300)),
            rate_limit_enabled: env_or_default("RATE_LIMIT_ENABLED", true),
            rate_limit_ingest_per_sec: env_or_default("RATE_LIMIT_INGEST_PER_SEC", 50),
            rate_limit_ingest_burst: env_or_default("RATE_LIMIT_INGEST_BURST", 200),
            rate_limit_general_per_sec: env_or_default("RATE_LIMIT_GENERAL_PER_SEC", 10),
            rate_limit_general_burst: env_or_default("RATE_LIMIT_GENERAL_BURST", 20),
            service_name: env_or_default_string("SERVICE_NAME", &defaults.service_name),
            build_version: env_or_default_string("BUILD_VERSION", &defaults.build_version),
            build_sha: env_or_default_string("BUILD_SHA", &defaults.build_sha),
            build_time: env_or_default_string("BUILD_TIME", &defaults.build_time),
        }
    }

    /// Create configuration with all default values
    pub fn default() -> Self {
        Self {
            request_body_limit: 64 * 1024, // 64 KiB
            request_timeout: Duration::from_secs(30),
            port: 3000,
            database_path: "skald.db".to_string(),
            store_timeout: Duration::from_millis(500),
            api_key: None,
            max_online: 10,
            server_max_players: 10,
            steam_candidate_ttl: Duration::from_secs(60),
            steam_pair_window: Duration::from_millis(30_000),
            player_ttl: Duration::from_secs(86_400),
            status_history_limit: 20,
            purge_interval: Duration::from_secs(300),
            rate_limit_enabled: true,
            rate_limit_ingest_per_sec: 50,
            rate_limit_ingest_burst: 200,
            rate_limit_general_per_sec: 10,
            rate_limit_general_burst: 20,
            service_name: "skald".to_string(),
            build_version: env!("CARGO_PKG_VERSION").to_string(),
            build_sha: "unknown".to_string(),
            build_time: "unknown".to_string(),
        }
    }

    /// Engine settings derived from this configuration
    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            max_online: self.max_online.max(1),
            candidate_ttl: self.steam_candidate_ttl,
            pair_window: self.steam_pair_window,
            player_ttl: self.player_ttl,
            status_history_limit: self.status_history_limit,
            ..TrackerSettings::default()
        }
    }
}

/// Parse environment variable or return default value
fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

/// Parse environment variable string or return default value
fn env_or_default_string(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|_| default.to_string())
}
