use crate::AppState;
use crate::server::{AgentRecord, PeerKind};
use crate::types::{AppError, Result};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct AgentFilter {
    /// `agent` or `gateway`; both when absent
    pub kind: Option<PeerKind>,
}

pub async fn list_agents(
    State(state): State<AppState>,
    Query(filter): Query<AgentFilter>,
) -> Json<Vec<AgentRecord>> {
    let records = state
        .server
        .agents()
        .into_iter()
        .filter(|r| filter.kind.is_none_or(|k| r.kind == k))
        .collect();
    Json(records)
}

pub async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AgentRecord>> {
    state
        .server
        .agent(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("agent '{}'", id)))
}
