use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use skald_backend::config::Config;
use skald_backend::tracker::{Tracker, TrackerSettings};
use skald_backend::{AppState, BuildInfo, RateLimitConfig, create_app};
use skald_store::{Clock, Store};
use tower::ServiceExt;
// for `oneshot` method

const API_KEY: &str = "skald-sk-integration0000000000000000000";
const T0: i64 = 1_700_000_000_000;

/// Helper to create a tracker over an in-memory store with a frozen clock
async fn setup_test_tracker() -> Tracker {
    let store = Store::open_in_memory()
        .await
        .expect("Failed to create in-memory store")
        .with_clock(Clock::manual(T0));
    Tracker::new(store, TrackerSettings::default())
}

/// Helper to create app with default test configuration
fn create_test_app(tracker: Tracker) -> axum::Router {
    let config = Config::default();
    let state = AppState::new(
        tracker,
        API_KEY,
        config.server_max_players,
        BuildInfo::from_config(&config),
    );
    create_app(
        state,
        config.request_body_limit,
        config.request_timeout,
        RateLimitConfig::disabled(),
    )
}

/// Helper to send a request and get response
async fn send_request(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    auth_token: Option<&str>,
) -> (StatusCode, Value) {
    let mut request_builder = Request::builder().uri(uri).method(method);

    // Add Authorization header if provided
    if let Some(token) = auth_token {
        request_builder = request_builder.header("Authorization", format!("Bearer {}", token));
    }

    // Build request with body
    let request = if let Some(json_body) = body {
        request_builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&json_body).unwrap()))
            .unwrap()
    } else {
        request_builder.body(Body::empty()).unwrap()
    };

    // Send request
    let response = app.oneshot(request).await.unwrap();

    // Extract status
    let status = response.status();

    // Extract body
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();

    // Try to parse as JSON, or return empty object
    let json = if body_bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(json!({}))
    };

    (status, json)
}

/// Helper to ingest one line with the test key
async fn ingest(app: &axum::Router, line: &str, ts: Option<Value>) -> (StatusCode, Value) {
    let mut body = json!({ "line": line });
    if let Some(ts) = ts {
        body["ts"] = ts;
    }
    send_request(app.clone(), "POST", "/ingest/log", Some(body), Some(API_KEY)).await
}

// =============================================================================
// HEALTH AND VERSION ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    // GIVEN: A running application
    let app = create_test_app(setup_test_tracker().await);

    // WHEN: Making a GET request to /health
    let (status, _body) = send_request(app, "GET", "/health", None, None).await;

    // THEN: Should return 200 OK
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_endpoint_with_post_method() {
    // GIVEN: A running application
    let app = create_test_app(setup_test_tracker().await);

    // WHEN: Making a POST request to /health (wrong method)
    let (status, _body) = send_request(app, "POST", "/health", None, None).await;

    // THEN: Should return 405 Method Not Allowed
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_version_reports_build_info() {
    // GIVEN: A running application with default configuration
    let app = create_test_app(setup_test_tracker().await);

    // WHEN: Making a GET request to /version
    let (status, body) = send_request(app, "GET", "/version", None, None).await;

    // THEN: Should describe the service and build
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "skald");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["sha"], "unknown");
    assert_eq!(body["buildTime"], "unknown");
}

// =============================================================================
// INGEST AUTHENTICATION TESTS
// =============================================================================

#[tokio::test]
async fn test_ingest_without_authorization() {
    // GIVEN: A running application
    let app = create_test_app(setup_test_tracker().await);

    // WHEN: Ingesting without an Authorization header
    let (status, _body) = send_request(
        app,
        "POST",
        "/ingest/log",
        Some(json!({ "line": "Opened Steam server" })),
        None,
    )
    .await;

    // THEN: Should return 401 Unauthorized
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ingest_with_wrong_api_key() {
    // GIVEN: A running application and a wrong key
    let tracker = setup_test_tracker().await;
    let app = create_test_app(tracker.clone());

    // WHEN: Ingesting a status line with the wrong key
    let (status, _body) = send_request(
        app,
        "POST",
        "/ingest/log",
        Some(json!({ "line": "Opened Steam server" })),
        Some("skald-sk-wrong000000000000000000000000000"),
    )
    .await;

    // THEN: Should return 401 and not touch state
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(tracker.status().current().await.unwrap(), None);
}

// =============================================================================
// INGEST PIPELINE TESTS
// =============================================================================

#[tokio::test]
async fn test_ingest_connection_candidate() {
    // GIVEN: A running application
    let app = create_test_app(setup_test_tracker().await);

    // WHEN: Ingesting a connection line
    let (status, body) = ingest(
        &app,
        "Got connection SteamID 76561198000000001",
        Some(json!(1000)),
    )
    .await;

    // THEN: Should report a steam candidate
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "handled": true,
            "category": "steam-candidate",
            "connectionId": "76561198000000001",
        })
    );
}

#[tokio::test]
async fn test_join_death_leave_lifecycle() {
    // GIVEN: A running application
    let tracker = setup_test_tracker().await;
    let app = create_test_app(tracker.clone());

    // WHEN: A player connects, spawns, dies and leaves
    ingest(&app, "Got connection SteamID 76561198000000001", Some(json!(1000))).await;
    let (_, join) = ingest(&app, "Got character ZDOID from Erik : 100 : 200", Some(json!(1005))).await;
    let (_, death) = ingest(&app, "Got character ZDOID from Erik : 0 : 0", Some(json!(2000))).await;
    let (_, online) = send_request(app.clone(), "GET", "/player/online", None, None).await;
    let (_, leave) = ingest(&app, "Closing socket 76561198000000001", Some(json!(3000))).await;
    let (_, after) = send_request(app, "GET", "/player/online", None, None).await;

    // THEN: Each step should be reported and the player should be gone at the end
    assert_eq!(
        join,
        json!({
            "handled": true,
            "category": "join",
            "playerId": "Erik",
            "connectionId": "76561198000000001",
        })
    );
    assert_eq!(
        death,
        json!({ "handled": true, "category": "death", "playerId": "Erik", "sessionDeaths": 1 })
    );

    assert_eq!(online["count"], 1);
    assert_eq!(online["maxCount"], 10);
    assert_eq!(online["players"][0]["id"], "Erik");
    assert_eq!(online["players"][0]["steamId"], "76561198000000001");
    assert_eq!(online["players"][0]["joinedAt"], 1005);
    assert_eq!(online["players"][0]["source"], "spawned");
    assert_eq!(online["players"][0]["sessionDeaths"], 1);
    assert_eq!(online["players"][0]["lastDeathAt"], 2000);

    assert_eq!(
        leave,
        json!({
            "handled": true,
            "category": "leave",
            "connectionId": "76561198000000001",
            "resolved": true,
            "playerId": "Erik",
        })
    );
    assert_eq!(after, json!({ "count": 0, "maxCount": 10, "players": [] }));
    assert_eq!(tracker.sessions().get("Erik").await.unwrap(), None);
}

#[tokio::test]
async fn test_join_without_recent_candidate() {
    // GIVEN: A candidate seen more than the pairing window ago
    let app = create_test_app(setup_test_tracker().await);
    ingest(&app, "Got connection SteamID 76561198000000001", Some(json!(1000))).await;

    // WHEN: A player spawns 30 seconds later
    let (status, body) = ingest(&app, "Got character ZDOID from Erik : 7 : 9", Some(json!(31000))).await;

    // THEN: Should join without a connection id
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"], "join");
    assert_eq!(body["connectionId"], Value::Null);
}

#[tokio::test]
async fn test_leave_for_unknown_socket() {
    // GIVEN: A running application with nobody online
    let app = create_test_app(setup_test_tracker().await);

    // WHEN: A socket with no mapping closes
    let (status, body) = ingest(&app, "Closing socket 76561198000000042", None).await;

    // THEN: Should be handled but unresolved
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "handled": true,
            "category": "leave",
            "connectionId": "76561198000000042",
            "resolved": false,
        })
    );
}

#[tokio::test]
async fn test_fallback_leave_removes_guessed_player() {
    // GIVEN: A paired player
    let app = create_test_app(setup_test_tracker().await);
    ingest(&app, "Got connection SteamID 76561198000000001", Some(json!(1000))).await;
    ingest(&app, "Got character ZDOID from Erik : 1 : 1", Some(json!(1500))).await;

    // WHEN: A disconnect without an id arrives
    let (status, body) = ingest(&app, "RPC_Disconnect", Some(json!(9000))).await;
    let (_, online) = send_request(app, "GET", "/player/online", None, None).await;

    // THEN: Should guess the newest candidate and remove its player
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "handled": true,
            "category": "leave-fallback",
            "guess": { "connectionId": "76561198000000001", "playerId": "Erik" },
        })
    );
    assert_eq!(online["count"], 0);
}

#[tokio::test]
async fn test_eleventh_player_evicts_the_oldest() {
    // GIVEN: Ten players online
    let app = create_test_app(setup_test_tracker().await);
    for i in 0..10 {
        let line = format!("Got character ZDOID from Viking{i} : 3 : 3");
        ingest(&app, &line, Some(json!(1000 + i))).await;
    }

    // WHEN: An eleventh player spawns
    ingest(&app, "Got character ZDOID from Latecomer : 3 : 3", Some(json!(5000))).await;
    let (_, online) = send_request(app, "GET", "/player/online", None, None).await;

    // THEN: The least recently active player should be gone
    assert_eq!(online["count"], 10);
    let names: Vec<&str> = online["players"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert!(!names.contains(&"Viking0"));
    assert_eq!(names.first(), Some(&"Viking1"));
    assert_eq!(names.last(), Some(&"Latecomer"));
}

#[tokio::test]
async fn test_unclassified_line() {
    // GIVEN: A running application
    let app = create_test_app(setup_test_tracker().await);

    // WHEN: Ingesting a line that matches nothing
    let (status, body) = ingest(&app, "Loading world 'Midgard'", None).await;

    // THEN: Should be accepted but not handled
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "handled": false }));
}

#[tokio::test]
async fn test_iso_timestamp_is_honoured() {
    // GIVEN: A running application
    let app = create_test_app(setup_test_tracker().await);

    // WHEN: Ingesting a spawn with an ISO-8601 timestamp
    ingest(
        &app,
        "Got character ZDOID from Erik : 1 : 1",
        Some(json!("2024-01-01T00:00:00Z")),
    )
    .await;
    let (_, online) = send_request(app, "GET", "/player/online", None, None).await;

    // THEN: The record should carry that time
    assert_eq!(online["players"][0]["joinedAt"], 1_704_067_200_000i64);
}

#[tokio::test]
async fn test_unparseable_timestamp_uses_processing_time() {
    // GIVEN: A running application with a frozen clock
    let app = create_test_app(setup_test_tracker().await);

    // WHEN: Ingesting a spawn with a garbage timestamp
    let (status, _) = ingest(
        &app,
        "Got character ZDOID from Erik : 1 : 1",
        Some(json!("last tuesday")),
    )
    .await;
    let (_, online) = send_request(app, "GET", "/player/online", None, None).await;

    // THEN: Should still be handled at processing time
    assert_eq!(status, StatusCode::OK);
    assert_eq!(online["players"][0]["joinedAt"], T0);
}

// =============================================================================
// SERVER STATUS ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_server_status_unknown_initially() {
    // GIVEN: A running application with no lifecycle lines
    let app = create_test_app(setup_test_tracker().await);

    // WHEN: Reading the server status
    let (status, body) = send_request(app, "GET", "/server/status", None, None).await;

    // THEN: Current should be null with empty history
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "current": null, "history": [] }));
}

#[tokio::test]
async fn test_server_status_tracks_lifecycle() {
    // GIVEN: A server that starts and comes online
    let app = create_test_app(setup_test_tracker().await);
    let (_, starting) = ingest(&app, "Launching Valheim server", Some(json!(1000))).await;
    ingest(&app, "Opened Steam server", Some(json!(2000))).await;

    // WHEN: Reading the server status
    let (status, body) = send_request(app, "GET", "/server/status", None, None).await;

    // THEN: Current should be online with both transitions newest first
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        starting,
        json!({ "handled": true, "category": "server", "status": "starting" })
    );
    assert_eq!(body["current"]["status"], "online");
    assert_eq!(body["current"]["at"], 2000);
    assert_eq!(body["current"]["detail"], "Opened Steam server");
    assert_eq!(body["history"][0]["status"], "online");
    assert_eq!(body["history"][1]["status"], "starting");
}

#[tokio::test]
async fn test_status_rides_along_with_player_event() {
    // GIVEN: A running application
    let app = create_test_app(setup_test_tracker().await);

    // WHEN: One line carries both a spawn and a lifecycle phrase
    let (_, body) = ingest(
        &app,
        "Got character ZDOID from Erik : 4 : 2 Game server connected",
        Some(json!(1000)),
    )
    .await;

    // THEN: Both effects should be reported
    assert_eq!(body["category"], "join");
    assert_eq!(body["status"], "online");
}

// =============================================================================
// RAIDS ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_raids_newest_first() {
    // GIVEN: Two raids announced
    let app = create_test_app(setup_test_tracker().await);
    let (_, first) = ingest(&app, "Random event set:army_eikthyr", Some(json!(1000))).await;
    ingest(&app, "Random event set:foresttrolls", Some(json!(2000))).await;

    // WHEN: Listing raids
    let (status, body) = send_request(app, "GET", "/raids", None, None).await;

    // THEN: Should list them newest first
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, json!({ "handled": true, "category": "raid", "raid": "army_eikthyr" }));
    assert_eq!(body["count"], 2);
    assert_eq!(body["raids"][0]["raid"], "foresttrolls");
    assert_eq!(body["raids"][0]["time"], 2000);
    assert_eq!(body["raids"][1]["raid"], "army_eikthyr");
}

#[tokio::test]
async fn test_raids_limit_is_clamped() {
    // GIVEN: Fifteen raids announced
    let app = create_test_app(setup_test_tracker().await);
    for i in 0..15 {
        ingest(&app, "Random event set:wolves", Some(json!(1000 + i))).await;
    }

    // WHEN: Listing with no limit, a zero limit, a small limit and a huge limit
    let (_, default) = send_request(app.clone(), "GET", "/raids", None, None).await;
    let (_, zero) = send_request(app.clone(), "GET", "/raids?limit=0", None, None).await;
    let (_, small) = send_request(app.clone(), "GET", "/raids?limit=3", None, None).await;
    let (_, huge) = send_request(app, "GET", "/raids?limit=5000", None, None).await;

    // THEN: Should default to 10 and cap at what exists
    assert_eq!(default["count"], 10);
    assert_eq!(zero["count"], 10);
    assert_eq!(small["count"], 3);
    assert_eq!(huge["count"], 15);
}

#[tokio::test]
async fn test_negative_raid_limit_clamps_to_one() {
    // GIVEN: Fifteen raids announced
    let app = create_test_app(setup_test_tracker().await);
    for i in 0..15 {
        ingest(&app, "Random event set:wolves", Some(json!(1000 + i))).await;
    }

    // WHEN: Listing with a negative limit
    let (status, body) = send_request(app, "GET", "/raids?limit=-5", None, None).await;

    // THEN: Should return only the newest raid
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["raids"][0]["time"], 1014);
}
