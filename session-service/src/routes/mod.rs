use crate::state::AppState;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn build_router() -> Router<AppState> {
    crate::metrics::init();
    Router::new()
        .route("/ws", get(crate::websocket::handlers::ws_handler))
        .route("/health", get(health))
        .route("/metrics", get(crate::metrics::metrics_handler))
}
