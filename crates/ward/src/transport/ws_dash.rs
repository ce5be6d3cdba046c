// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dashboard WebSocket endpoint — streams device state and access events to
//! observers and routes their commands into the authorization engine.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};

use crate::authz;
use crate::events::{CommandResponse, DashboardRequest, ServerMessage};
use crate::model::Outcome;
use crate::state::WardState;

/// `GET /ws` — WebSocket upgrade for dashboard observers.
pub async fn ws_handler(
    State(state): State<Arc<WardState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_dashboard(state, socket))
}

/// Per-connection event loop. The initial device snapshot is already queued
/// on the channel when `accept_observer` returns, so it is the first frame
/// on the wire.
async fn handle_dashboard(state: Arc<WardState>, socket: WebSocket) {
    let (observer_id, mut rx) = state.accept_observer().await;
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }

            // Fan-out -> observer
            msg = rx.recv() => {
                match msg {
                    Some(m) => {
                        if send_message(&mut ws_tx, &m).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // Observer -> engine
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if handle_frame(&state, &mut ws_tx, &text).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.registry.remove_observer(&observer_id).await;
}

/// Handle one text frame from a dashboard client. The `command_response`
/// goes to the originator only; broadcasts travel through the fan-out.
async fn handle_frame(
    state: &Arc<WardState>,
    ws_tx: &mut SplitSink<WebSocket, Message>,
    text: &str,
) -> Result<(), axum::Error> {
    match serde_json::from_str::<DashboardRequest>(text) {
        Ok(DashboardRequest::Command { device_id, command, user_id }) => {
            let decision = authz::authorize(state, &device_id, &user_id, command).await;
            let response = ServerMessage::CommandResponse {
                data: CommandResponse {
                    device_id,
                    command: command.as_str().to_owned(),
                    status: decision.outcome,
                    message: decision.message,
                },
            };
            send_message(ws_tx, &response).await
        }
        Ok(DashboardRequest::Ping) => send_message(ws_tx, &ServerMessage::Pong).await,
        Ok(DashboardRequest::Pong) => Ok(()),
        Err(e) => {
            // Validation failures are reported to the caller only; they are
            // not access events.
            tracing::debug!(err = %e, "unparseable dashboard frame");
            let response = ServerMessage::CommandResponse {
                data: CommandResponse {
                    device_id: String::new(),
                    command: String::new(),
                    status: Outcome::Denied,
                    message: "invalid_request".to_owned(),
                },
            };
            send_message(ws_tx, &response).await
        }
    }
}

async fn send_message(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => ws_tx.send(Message::Text(json.into())).await,
        Err(_) => Ok(()),
    }
}
