// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller WebSocket endpoint — one session per physical device,
//! authoritative for that device's reported status.

use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};

use crate::authz;
use crate::error::WardError;
use crate::events::{ControllerMessage, ControllerReport};
use crate::model::{DeviceKind, PhysicalStatus, BUTTON_USER_ID};
use crate::registry::ControllerHandle;
use crate::state::WardState;
use crate::store::DevicePatch;

/// `GET /ws/{device_id}` — WebSocket upgrade for a device controller.
pub async fn ws_handler(
    State(state): State<Arc<WardState>>,
    Path(device_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    match state.store.get_device(&device_id).await {
        None => {
            return WardError::not_found("device not found").into_response();
        }
        Some(device) if device.kind == DeviceKind::Virtual => {
            return WardError::bad_request("virtual devices have no controller").into_response();
        }
        Some(_) => {}
    }

    ws.on_upgrade(move |socket| handle_controller(state, socket, device_id)).into_response()
}

/// Per-session loop. Registration displaces any prior controller for the
/// device and queues a handshake so the device re-announces its status.
async fn handle_controller(state: Arc<WardState>, socket: WebSocket, device_id: String) {
    let (handle, mut rx) = match state.accept_controller(&device_id).await {
        Ok(pair) => pair,
        Err(e) => {
            tracing::warn!(device_id, err = %e, "controller registration refused");
            return;
        }
    };
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            // Displaced by a newer session, or evicted by the heartbeat.
            _ = handle.cancel.cancelled() => {
                let frame = CloseFrame {
                    code: close_code::NORMAL,
                    reason: handle.close_reason().into(),
                };
                let _ = ws_tx.send(Message::Close(Some(frame))).await;
                break;
            }

            _ = state.shutdown.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }

            // Server -> device
            msg = rx.recv() => {
                match msg {
                    Some(m) => {
                        let Ok(json) = serde_json::to_string(&m) else { continue };
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // Device -> server
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle.touch().await;
                        handle_report(&state, &handle, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    Some(Ok(_)) => {
                        // Any inbound frame proves liveness.
                        handle.touch().await;
                    }
                }
            }
        }
    }

    state.drop_controller(&handle).await;
}

async fn handle_report(state: &Arc<WardState>, handle: &ControllerHandle, text: &str) {
    let report = match serde_json::from_str::<ControllerReport>(text) {
        Ok(report) => report,
        Err(e) => {
            tracing::debug!(device_id = %handle.device_id, err = %e, "unparseable controller frame");
            return;
        }
    };

    match report {
        ControllerReport::StatusUpdate { data, .. } => {
            apply_status_update(state, &handle.device_id, data.physical_status).await;
            let _ =
                handle.tx.send(ControllerMessage::Ack { message: "status received".to_owned() });
        }
        ControllerReport::ButtonCommandRequest { command, .. } => {
            // The engine pushes a command_denied back to this session on
            // refusal; a grant comes back as a normal command dispatch.
            authz::authorize(state, &handle.device_id, BUTTON_USER_ID, command).await;
        }
        ControllerReport::CommandResponse { command, success, message, .. } => {
            tracing::debug!(
                device_id = %handle.device_id,
                command = command.as_str(),
                success,
                message = message.as_deref().unwrap_or(""),
                "controller command response"
            );
        }
        ControllerReport::Pong { .. } => {}
    }
}

/// The controller is authoritative for its device's physical status. Runs
/// under the gate so the change is ordered with engine mutations; a
/// re-announce of an unchanged status is not re-broadcast.
async fn apply_status_update(state: &Arc<WardState>, device_id: &str, status: PhysicalStatus) {
    let _gate = state.gate.lock().await;
    let current = state.store.get_device(device_id).await;
    if current.as_ref().map(|d| d.physical_status) == Some(status) {
        return;
    }
    if let Some(updated) =
        state.store.update_device(device_id, DevicePatch::physical(status)).await
    {
        tracing::info!(device_id, status = ?status, "physical status confirmed");
        state.broadcast_state_change(&updated).await;
    }
}
