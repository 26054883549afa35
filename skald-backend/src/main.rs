use skald_backend::config::Config;
use skald_backend::helpers::{generate_api_key, mask_api_key};
use skald_backend::tracker::Tracker;
use skald_backend::{AppState, BuildInfo, RateLimitConfig, create_app};
use skald_store::Store;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Periodically drop expired keys so idle data does not pile up.
fn spawn_purge_task(store: Store, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "purged expired keys"),
                Err(e) => tracing::error!("Expired key purge failed: {}", e),
            }
        }
    });
}

#[tokio::main]
async fn main() {
    // Initialize tracing for structured logging
    #[cfg(debug_assertions)]
    let log_level = "debug";
    #[cfg(not(debug_assertions))]
    let log_level = "info";

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .compact()
        .init();
    tracing::info!("Starting Skald backend server...");
    // Load configuration from environment variables or use defaults
    let config = Config::from_env();
    tracing::info!(
        "Configuration: port={}, db_path={}, body_limit={}KB, timeout={}s, store_timeout={}ms",
        config.port,
        config.database_path,
        config.request_body_limit / 1024,
        config.request_timeout.as_secs(),
        config.store_timeout.as_millis()
    );
    tracing::info!(
        "Tracking: max_online={}, pair_window={}ms, candidate_ttl={}s, player_ttl={}s",
        config.max_online,
        config.steam_pair_window.as_millis(),
        config.steam_candidate_ttl.as_secs(),
        config.player_ttl.as_secs()
    );
    tracing::info!(
        "Rate limits: enabled={}, ingest={}/sec (burst {}), general={}/sec (burst {})",
        config.rate_limit_enabled,
        config.rate_limit_ingest_per_sec,
        config.rate_limit_ingest_burst,
        config.rate_limit_general_per_sec,
        config.rate_limit_general_burst
    );

    let api_key = match config.api_key.clone() {
        Some(key) => {
            tracing::info!("Using configured API key {}", mask_api_key(&key));
            key
        }
        None => {
            let key = generate_api_key();
            // the only time the full key is printed
            tracing::warn!("API_KEY not set, generated ingest key: {}", key);
            key
        }
    };

    let store = Store::open(&config.database_path, config.store_timeout)
        .await
        .unwrap();
    spawn_purge_task(store.clone(), config.purge_interval);

    let tracker = Tracker::new(store, config.tracker_settings());
    let state = AppState::new(
        tracker,
        &api_key,
        config.server_max_players,
        BuildInfo::from_config(&config),
    );
    let app = create_app(
        state,
        config.request_body_limit,
        config.request_timeout,
        RateLimitConfig::from_config(&config),
    );

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await.unwrap();
    tracing::info!("Server listening on {}", addr);

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!("Axum server error: {}", e);
    }
}
