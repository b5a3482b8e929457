use crate::AppState;
use crate::server::ServerStats;
use axum::{Json, extract::State};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(flatten)]
    pub stats: ServerStats,
    /// Live timeouts, so a hot reload is visible here.
    pub heartbeat_timeout_secs: u64,
    pub task_timeout_secs: u64,
    /// Configured provider names in selection order.
    pub providers: Vec<String>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let config = state.config.config();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        stats: state.server.stats(),
        heartbeat_timeout_secs: config.server.heartbeat_timeout_secs,
        task_timeout_secs: config.server.task_timeout_secs,
        providers: config.provider_names(),
    })
}
