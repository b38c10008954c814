use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// `GET /health` — liveness probe. Ambient operational surface; broader
/// deployment tooling is out of scope, not a basic process-health check,
/// grounded on `skynet_gateway::http::health::health_handler`.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "gateway": {
            "host": state.config.gateway.host,
            "port": state.config.gateway.port,
        },
        "expert_enabled": state.config.expert.enabled,
    }))
}
