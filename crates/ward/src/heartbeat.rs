// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat sweeper and rate-limiter cleanup tasks.

use std::sync::Arc;

use std::time::Duration;

use crate::events::{ControllerMessage, ServerMessage};
use crate::model::{now_iso, Outcome, SYSTEM_USER_ID};
use crate::state::WardState;

/// Spawn the heartbeat task: every `ping_interval`, ping every controller
/// and observer, and evict controllers silent past `pong_deadline`.
pub fn spawn_heartbeat(state: Arc<WardState>) {
    let interval = state.config.ping_interval();
    let deadline = state.config.pong_deadline();

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            sweep_controllers(&state, deadline).await;

            // Observers are pinged at the same cadence; the broadcast path
            // already drops any that fail.
            state.registry.broadcast(ServerMessage::Ping).await;
        }
    });
}

/// One heartbeat pass over the controller sessions. Any session whose last
/// inbound frame is older than `deadline` is closed and its device flipped
/// offline, with an audit entry for continuity.
pub(crate) async fn sweep_controllers(state: &Arc<WardState>, deadline: Duration) {
    let controllers = state.registry.controllers_snapshot().await;

    for handle in controllers {
        if handle.cancel.is_cancelled() {
            continue;
        }

        let idle = handle.idle().await;
        if idle > deadline {
            tracing::warn!(
                device_id = %handle.device_id,
                idle_secs = idle.as_secs(),
                "controller heartbeat timeout"
            );
            handle.set_close_reason("timeout");
            state.drop_controller(&handle).await;
            state
                .record_access(
                    &handle.device_id,
                    SYSTEM_USER_ID,
                    "heartbeat",
                    Outcome::Denied,
                    "controller timeout",
                )
                .await;
        } else if handle.tx.send(ControllerMessage::Ping { timestamp: now_iso() }).is_err() {
            // Session task already gone; clean up without waiting for the
            // deadline.
            state.drop_controller(&handle).await;
        }
    }
}

/// Spawn the periodic rate-limiter sweep. Pruning also happens
/// opportunistically on every check; this bounds memory for idle keys.
pub fn spawn_limiter_cleanup(state: Arc<WardState>) {
    let interval = state.config.cleanup_interval();

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            let dropped = state.limiter.cleanup().await;
            if dropped > 0 {
                tracing::debug!(dropped, "rate limiter records pruned");
            }
        }
    });
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
