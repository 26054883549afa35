use crate::AppState;
use crate::error::AppError;
use crate::helpers::hash_api_key;
use crate::tracker::models::{PlayerRecord, RaidEvent};
use crate::validation;

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::TypedHeader;
use axum_macros::debug_handler;
use headers::Authorization;
use headers::authorization::Bearer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Loosely typed so that wrong field types surface as validation errors.
#[derive(Deserialize)]
pub(crate) struct IngestRequest {
    line: Option<Value>,
    ts: Option<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OnlineResponse {
    count: usize,
    max_count: usize,
    players: Vec<PlayerRecord>,
}

#[derive(Deserialize)]
pub(crate) struct RaidQuery {
    limit: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct RaidsResponse {
    count: usize,
    raids: Vec<RaidEvent>,
}

fn authorize(
    state: &AppState,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<(), AppError> {
    let Some(TypedHeader(auth)) = auth else {
        return Err(AppError::Unauthorized);
    };

    if hash_api_key(auth.token()) != state.api_key_hash {
        return Err(AppError::Unauthorized);
    }

    Ok(())
}

#[debug_handler]
pub(crate) async fn ingest_log(
    State(state): State<Arc<AppState>>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, auth)?;

    let Json(payload) = payload?;
    let line = validation::line_field(payload.line.as_ref())?;
    let ts = validation::ts_field(payload.ts.as_ref())?;

    let outcome = state.tracker.ingest(line, ts.as_deref()).await?;

    Ok((StatusCode::OK, Json(outcome)))
}

#[debug_handler]
pub(crate) async fn online_players(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let players = state.tracker.online().list().await?;

    Ok(Json(OnlineResponse {
        count: players.len(),
        max_count: state.server_max_players,
        players,
    }))
}

pub(crate) async fn server_status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let report = state.tracker.status().get_status().await?;
    Ok(Json(report))
}

pub(crate) async fn raids(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RaidQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = validation::raid_limit(query.limit.as_deref());
    let raids = state.tracker.raids().recent(limit).await?;

    Ok(Json(RaidsResponse {
        count: raids.len(),
        raids,
    }))
}

pub(crate) async fn version(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build.clone())
}

pub(crate) async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    state.tracker.store().ping().await?;
    Ok(StatusCode::OK)
}
