pub mod realtime;

use axum::Json;
use axum::http::StatusCode;
use serde_json::json;

/// Liveness endpoint.
pub async fn health_check() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
