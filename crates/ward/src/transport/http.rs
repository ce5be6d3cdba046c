// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the coordinator API.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::authz;
use crate::error::WardError;
use crate::limiter::LimiterStats;
use crate::model::{now_iso, AccessEvent, ConnectionStatus, Device, DoorCommand, Outcome};
use crate::state::WardState;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct DevicesStatusResponse {
    pub devices: Vec<Device>,
    pub total_count: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct DeviceConnectionResponse {
    pub device_id: String,
    pub connection_status: ConnectionStatus,
    pub last_seen: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AccessLogsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AccessLogsResponse {
    pub logs: Vec<AccessEvent>,
    pub count: usize,
    pub timestamp: String,
}

/// Body of a card-reader or dashboard attempt over HTTP. The user field is
/// named for the card readers that post here.
#[derive(Debug, Deserialize)]
pub struct AccessRequest {
    pub device_id: String,
    pub user_card_id: String,
    pub command: DoorCommand,
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub status: Outcome,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_state: Option<Device>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_lockout_seconds: Option<u64>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct LimiterStatsResponse {
    #[serde(flatten)]
    pub stats: LimiterStats,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct UserStatusQuery {
    pub device_id: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared_attempts: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub metrics: HealthMetrics,
}

#[derive(Debug, Serialize)]
pub struct HealthMetrics {
    pub device_count: usize,
    pub online_controllers: usize,
    pub observer_count: usize,
    pub access_log_entries: usize,
    pub uptime_seconds: u64,
}

// -- Helpers ------------------------------------------------------------------

/// Render "this long ago" as an ISO-8601 UTC instant.
fn iso_since(elapsed: Duration) -> String {
    let delta = chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
    (chrono::Utc::now() - delta).to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/devices/status`
pub async fn devices_status(State(s): State<Arc<WardState>>) -> impl IntoResponse {
    let devices = s.store.list_devices().await;
    Json(DevicesStatusResponse { total_count: devices.len(), devices, timestamp: now_iso() })
}

/// `GET /api/devices/connections` — map of device id to connection status.
pub async fn devices_connections(State(s): State<Arc<WardState>>) -> impl IntoResponse {
    let map: BTreeMap<String, ConnectionStatus> = s
        .store
        .list_devices()
        .await
        .into_iter()
        .map(|d| (d.device_id, d.connection_status))
        .collect();
    Json(map)
}

/// `GET /api/devices/{id}/connection`
pub async fn device_connection(
    State(s): State<Arc<WardState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(device) = s.store.get_device(&id).await else {
        return WardError::not_found("device not found").into_response();
    };
    let last_seen = s.registry.controller_idle(&id).await.map(iso_since);
    Json(DeviceConnectionResponse {
        device_id: id,
        connection_status: device.connection_status,
        last_seen,
    })
    .into_response()
}

/// `GET /api/access_logs?limit=N` — most-recent-first, capped at retention.
pub async fn access_logs(
    State(s): State<Arc<WardState>>,
    Query(q): Query<AccessLogsQuery>,
) -> impl IntoResponse {
    let ceiling = s.config.access_log_retention;
    let limit = q.limit.unwrap_or(ceiling).min(ceiling);
    let logs = s.store.list_events(limit).await;
    Json(AccessLogsResponse { count: logs.len(), logs, timestamp: now_iso() })
}

/// `POST /api/access_log` — run an attempt through the authorization engine.
pub async fn post_access_log(
    State(s): State<Arc<WardState>>,
    Json(req): Json<AccessRequest>,
) -> impl IntoResponse {
    let decision = authz::authorize(&s, &req.device_id, &req.user_card_id, req.command).await;
    Json(AccessResponse {
        status: decision.outcome,
        message: decision.message,
        device_state: decision.device,
        remaining_lockout_seconds: decision.retry_after_secs,
        timestamp: now_iso(),
    })
}

/// `GET /api/security/rate_limiter/stats`
pub async fn limiter_stats(State(s): State<Arc<WardState>>) -> impl IntoResponse {
    let stats = s.limiter.stats().await;
    Json(LimiterStatsResponse { stats, timestamp: now_iso() })
}

/// `GET /api/security/rate_limiter/user_status?device_id&user_id`
pub async fn limiter_user_status(
    State(s): State<Arc<WardState>>,
    Query(q): Query<UserStatusQuery>,
) -> impl IntoResponse {
    Json(s.limiter.user_status(&q.device_id, &q.user_id).await)
}

/// `DELETE /api/security/rate_limiter/clear?user_id=…` — admin-only wipe.
pub async fn limiter_clear(
    State(s): State<Arc<WardState>>,
    Query(q): Query<ClearQuery>,
) -> impl IntoResponse {
    if q.user_id != s.config.admin_user_id {
        return WardError::forbidden("rate limiter clear is admin-only").into_response();
    }
    let cleared = s.limiter.clear_all().await;
    tracing::info!(cleared, "rate limiter records cleared");
    Json(ClearResponse { cleared_attempts: cleared }).into_response()
}

/// `GET /api/health`
pub async fn health(State(s): State<Arc<WardState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_owned(),
        metrics: HealthMetrics {
            device_count: s.store.device_count().await,
            online_controllers: s.registry.controller_count().await,
            observer_count: s.registry.observer_count().await,
            access_log_entries: s.store.event_count().await,
            uptime_seconds: s.uptime_seconds(),
        },
    })
}
