//! Realtime relay route configuration
//!
//! # Endpoint
//!
//! `GET /realtime/ws` - WebSocket upgrade for the transparent realtime relay
//!
//! # Protocol
//!
//! After the upgrade the relay dials the upstream realtime API and tunnels
//! frames byte-for-byte in both directions. The relay itself only produces
//! three sidecar frames:
//!
//! - `{"type": "upstream.open"}` once the upstream is connected
//! - `{"type": "upstream.error", "message": "..."}` on upstream failure
//! - `{"type": "upstream.close", "code": ..., "reason": "..."}` when the
//!   upstream closes
//!
//! A session refused before the upstream is dialed (no credential configured)
//! closes with code 1011 and reason `missing api key`.

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::realtime::realtime_ws_handler;
use crate::state::AppState;

/// Create the realtime relay router.
pub fn create_realtime_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/realtime/ws", get(realtime_ws_handler))
        .layer(TraceLayer::new_for_http())
}
