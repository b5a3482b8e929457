//! Registry of connected agents and gateways.
//!
//! Records are kept in registration order so that routing can break ties by
//! "first registered wins". Re-registering an id replaces the record in place
//! and rebinds it to the newest connection.

use crate::server::transport::ConnectionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Whether a peer executes tasks or submits them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PeerKind {
    Agent,
    Gateway,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Inactive,
}

/// One registered peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRecord {
    pub id: String,
    pub kind: PeerKind,
    pub agent_type: String,
    pub capabilities: BTreeSet<String>,
    pub status: AgentStatus,
    pub connection_id: ConnectionId,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

impl AgentRecord {
    pub fn new(
        id: impl Into<String>,
        kind: PeerKind,
        agent_type: impl Into<String>,
        capabilities: impl IntoIterator<Item = String>,
        connection_id: ConnectionId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            agent_type: agent_type.into(),
            capabilities: capabilities.into_iter().collect(),
            status: AgentStatus::Active,
            connection_id,
            registered_at: now,
            last_heartbeat: now,
        }
    }

    /// True if this record can take a task of the given type and action.
    pub fn can_handle(&self, agent_type: &str, action: &str) -> bool {
        self.kind == PeerKind::Agent
            && self.status == AgentStatus::Active
            && self.agent_type == agent_type
            && self.capabilities.contains(action)
    }
}

/// Insertion-ordered set of [`AgentRecord`]s keyed by id.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    records: Vec<AgentRecord>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record. Returns the record it replaced, if any.
    pub fn upsert(&mut self, record: AgentRecord) -> Option<AgentRecord> {
        match self.position(&record.id) {
            Some(idx) => Some(std::mem::replace(&mut self.records[idx], record)),
            None => {
                self.records.push(record);
                None
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&AgentRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut AgentRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Remove every record bound to `connection` and return them.
    ///
    /// A record that has since been re-registered from another connection is
    /// left alone.
    pub fn remove_by_connection(&mut self, connection: &ConnectionId) -> Vec<AgentRecord> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|r| &r.connection_id == connection);
        self.records = kept;
        removed
    }

    /// First active agent, in registration order, able to run `action` for `agent_type`.
    pub fn find_capable(&self, agent_type: &str, action: &str) -> Option<&AgentRecord> {
        self.records.iter().find(|r| r.can_handle(agent_type, action))
    }

    /// Refresh liveness. Reactivates an inactive record. Returns false if unknown.
    pub fn touch(&mut self, id: &str, at: DateTime<Utc>) -> bool {
        match self.get_mut(id) {
            Some(record) => {
                record.last_heartbeat = at;
                record.status = AgentStatus::Active;
                true
            }
            None => false,
        }
    }

    /// Mark active records whose last heartbeat is older than `cutoff` inactive.
    /// Returns the ids that changed.
    pub fn deactivate_stale(&mut self, cutoff: DateTime<Utc>) -> Vec<String> {
        self.records
            .iter_mut()
            .filter(|r| r.status == AgentStatus::Active && r.last_heartbeat < cutoff)
            .map(|r| {
                r.status = AgentStatus::Inactive;
                r.id.clone()
            })
            .collect()
    }

    pub fn records(&self) -> &[AgentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }
}
