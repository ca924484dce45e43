//! Realtime relay WebSocket handler
//!
//! Upgrades the HTTP connection and hands the socket to the relay session.
//! The only client-controlled input at this stage is the model name from the
//! query string; the upstream credential comes from server configuration and
//! is never accepted from the client.

use std::sync::Arc;

use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use serde::Deserialize;
use tracing::info;

use crate::core::relay::session;
use crate::state::AppState;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Query parameters accepted on the relay endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct RealtimeQuery {
    /// Upstream model to request; falls back to the configured default.
    pub model: Option<String>,
}

/// Relay WebSocket handler
///
/// `GET /realtime/ws?model=<model>` upgrades to a WebSocket that tunnels the
/// upstream realtime protocol. Audio limits match typical realtime payloads:
/// base64 PCM chunks stay well under the 10 MB cap.
pub async fn realtime_ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<RealtimeQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let model = query
        .model
        .unwrap_or_else(|| state.config.realtime_default_model.clone());
    info!(model = %model, "realtime relay upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| session::run(socket, state, model))
}
