use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::info;

use reeflow_core::config::ReeflowConfig;
use reeflow_expert::{ExpertSettings, HttpExpertClient};
use reeflow_history::HistoryStore;
use reeflow_llm::HttpLlmClient;
use reeflow_pipeline::{NullDataLookup, NullDeviceActuator, NullWeatherLookup, Orchestrator};
use reeflow_sessions::SessionStore;

mod app;
mod http;
mod ws;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reeflow_gateway=info,tower_http=debug".into()),
        )
        .init();

    // explicit path > REEFLOW_CONFIG env > ~/.reeflow/reeflow.toml
    let config_path = std::env::var("REEFLOW_CONFIG").ok();
    let config = ReeflowConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({}), using defaults", e);
        ReeflowConfig::default()
    });

    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(&config.database.path)?;
    reeflow_history::db::init_db(&conn)?;
    reeflow_sessions::db::init_db(&conn)?;
    let db = Arc::new(Mutex::new(conn));

    let history = Arc::new(HistoryStore::new(db.clone()));
    let sessions = Arc::new(SessionStore::new(db, history.clone()));

    let llm = Arc::new(HttpLlmClient::new());
    let expert = Arc::new(HttpExpertClient::new(ExpertSettings::from(&config.expert)));

    let orchestrator = Arc::new(Orchestrator::new(
        history.clone(),
        sessions.clone(),
        llm,
        expert,
        Arc::new(NullDataLookup),
        Arc::new(NullDeviceActuator),
        Arc::new(NullWeatherLookup),
        config.llm.clone(),
    ));

    let host = config.gateway.host.clone();
    let port = config.gateway.port;
    let state = Arc::new(app::AppState::new(config, history, sessions, orchestrator));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!("reeflow gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
