// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket ingress for the coordinator.

pub mod http;
pub mod ws_ctrl;
pub mod ws_dash;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::state::WardState;

/// Build the axum `Router` with all doorward routes.
pub fn build_router(state: Arc<WardState>) -> Router {
    let api = Router::new()
        // Device state
        .route("/devices/status", get(http::devices_status))
        .route("/devices/connections", get(http::devices_connections))
        .route("/devices/{id}/connection", get(http::device_connection))
        // Audit trail
        .route("/access_logs", get(http::access_logs))
        .route("/access_log", post(http::post_access_log))
        // Security
        .route("/security/rate_limiter/stats", get(http::limiter_stats))
        .route("/security/rate_limiter/user_status", get(http::limiter_user_status))
        .route("/security/rate_limiter/clear", delete(http::limiter_clear))
        // Health (no auth)
        .route("/health", get(http::health));

    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .nest(&state.config.api_prefix, api)
        // Dashboard fan-out
        .route(&state.config.ws_endpoint, get(ws_dash::ws_handler))
        // Per-device controller sessions
        .route("/ws/{device_id}", get(ws_ctrl::ws_handler))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(allowed_origins: &str) -> CorsLayer {
    if allowed_origins.trim() == "*" {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
}
