use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use snapshot_core::EntityDetail;
use tracing::debug;

use crate::auth::Authorized;
use crate::error::AppError;
use crate::models::{HealthResponse, LastCycle, RefreshResponse, SnapshotResponse};
use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        ts: Utc::now().timestamp(),
        owner: state.owner().to_string(),
        status: state.cache.status().await,
        phase: state.refresh.phase(),
        subscribers: state.hub.subscriber_count().await,
        last_cycle: state.refresh.last_report().map(LastCycle::from),
    })
}

pub async fn get_snapshot(_auth: Authorized, State(state): State<AppState>) -> Json<SnapshotResponse> {
    let view = state.cache.read().await;
    let ts = Utc::now().timestamp();
    let owner = state.owner().to_string();

    let body = match view.snapshot {
        Some(data) => SnapshotResponse::Snapshot {
            seq: view.generation,
            ts,
            owner,
            status: view.status,
            updated_at: view.updated_at,
            data,
        },
        None => SnapshotResponse::Empty {
            status: view.status,
            ts,
            owner,
        },
    };
    Json(body)
}

pub async fn get_detail(
    _auth: Authorized,
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<EntityDetail>, AppError> {
    let code = code.trim();
    state
        .cache
        .detail(code)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no detail cached for {code}")))
}

pub async fn refresh(_auth: Authorized, State(state): State<AppState>) -> Json<RefreshResponse> {
    let coalesced = state.refresh.trigger_now();
    debug!(coalesced, "manual refresh requested");
    Json(RefreshResponse {
        ok: true,
        ts: Utc::now().timestamp(),
        coalesced,
    })
}
