// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Doorward: real-time access-control coordinator for a fleet of physical
//! and virtual smart doors.

pub mod authz;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod limiter;
pub mod model;
pub mod registry;
pub mod state;
pub mod store;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::WardConfig;
use crate::state::WardState;
use crate::transport::build_router;

/// Run the coordinator until shutdown.
pub async fn run(config: WardConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let seeds = config.load_device_seeds()?;
    let state = Arc::new(WardState::new(config, seeds, shutdown.clone()));

    tracing::info!(devices = state.store.device_count().await, "doorward listening on {addr}");
    heartbeat::spawn_heartbeat(Arc::clone(&state));
    heartbeat::spawn_limiter_cleanup(Arc::clone(&state));

    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
