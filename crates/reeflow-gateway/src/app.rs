use std::sync::Arc;

use axum::{routing::get, Router};

use reeflow_core::config::ReeflowConfig;
use reeflow_history::HistoryStore;
use reeflow_pipeline::Orchestrator;
use reeflow_sessions::SessionStore;

/// Central shared state — passed as `Arc<AppState>` to every connection
/// task and HTTP handler.
///
/// Holds just the collaborators a turn needs: the two SQLite-backed stores
/// and the orchestrator (which itself owns the LLM/expert clients and the
/// data-lookup/device-actuator/weather hooks). Structurally the same shape
/// as `skynet_gateway::app::AppState`, minus the agent runtime, channel
/// bridges, and terminal subsystem this gateway has no use for.
pub struct AppState {
    pub config: ReeflowConfig,
    pub history: Arc<HistoryStore>,
    pub sessions: Arc<SessionStore>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(
        config: ReeflowConfig,
        history: Arc<HistoryStore>,
        sessions: Arc<SessionStore>,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        Self {
            config,
            history,
            sessions,
            orchestrator,
        }
    }
}

/// Assemble the full Axum router: the bidirectional WS endpoint plus a
/// liveness probe. Deployment tooling and anything beyond a basic health
/// check is out of scope for this gateway.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
