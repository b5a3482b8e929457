//! Top-level dispatcher for the coordination protocol.
//!
//! [`CoordinationServer`] owns the agent registry, the task router and the
//! set of open connections. Every inbound frame is handled synchronously
//! under one state lock, and replies are enqueued before the lock is
//! released, so registry/task mutations are atomic and results reach a
//! submitter in the order their reports were processed.

use crate::protocol::{self, Decoded, InboundMessage, OutboundMessage, ResearchActionData};
use crate::server::heartbeat::{HeartbeatMonitor, SweepReport};
use crate::server::registry::{AgentRecord, AgentRegistry, PeerKind};
use crate::server::router::{Task, TaskOutcome, TaskRouter, TaskSubmission};
use crate::server::transport::{ConnectionId, ConnectionSet, SendOutcome};
use crate::types::{AppError, TaskStatus};
use crate::utils::toml_config::ServerConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Construction options for [`CoordinationServer`].
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Id reported in `registration_confirmed`. Random when `None`.
    pub server_id: Option<String>,
    pub send_queue_capacity: usize,
    /// Fail in-flight tasks as soon as their assignee disconnects.
    pub fail_tasks_on_disconnect: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            server_id: None,
            send_queue_capacity: 256,
            fail_tasks_on_disconnect: true,
        }
    }
}

impl From<&ServerConfig> for CoordinatorOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            server_id: config.server_id.clone(),
            send_queue_capacity: config.send_queue_capacity,
            fail_tasks_on_disconnect: config.fail_tasks_on_disconnect,
        }
    }
}

/// What tearing down a connection changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeardownReport {
    pub removed_agents: Vec<String>,
    pub failed_tasks: Vec<String>,
}

/// Point-in-time counters for the health endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServerStats {
    pub server_id: String,
    pub connections: usize,
    pub agents: usize,
    pub gateways: usize,
    pub tasks_in_flight: usize,
}

#[derive(Default)]
struct CoordinatorState {
    registry: AgentRegistry,
    router: TaskRouter,
}

pub struct CoordinationServer {
    server_id: String,
    state: Mutex<CoordinatorState>,
    connections: ConnectionSet,
    fail_tasks_on_disconnect: bool,
}

impl CoordinationServer {
    pub fn new(options: CoordinatorOptions) -> Self {
        let server_id = options
            .server_id
            .unwrap_or_else(|| format!("server-{}", Uuid::new_v4()));
        Self {
            server_id,
            state: Mutex::new(CoordinatorState::default()),
            connections: ConnectionSet::new(options.send_queue_capacity),
            fail_tasks_on_disconnect: options.fail_tasks_on_disconnect,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Open a connection. The receiver yields serialized outbound frames.
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let (id, rx) = self.connections.open();
        tracing::info!(conn_id = %id, "connection opened");
        (id, rx)
    }

    /// Decode and handle one text frame from `conn`.
    ///
    /// Never fails: malformed frames are answered with an `error` frame and
    /// frames of unknown type are logged and dropped.
    pub fn handle_message(&self, conn: &ConnectionId, text: &str) {
        match protocol::decode(text) {
            Ok(Decoded::Message(message)) => self.dispatch(conn, message),
            Ok(Decoded::Unrecognized(message_type)) => {
                tracing::warn!(conn_id = %conn, message_type, "ignoring unrecognized message type");
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn, error = %e, "rejecting malformed message");
                self.connections.send(conn, &OutboundMessage::error(e));
            }
        }
    }

    /// Answer a frame that could not even be read as text.
    pub fn reject_frame(&self, conn: &ConnectionId, reason: impl std::fmt::Display) {
        tracing::warn!(conn_id = %conn, reason = %reason, "rejecting unreadable frame");
        self.connections.send(conn, &OutboundMessage::error(reason));
    }

    /// Handle an already-decoded frame.
    pub fn dispatch(&self, conn: &ConnectionId, message: InboundMessage) {
        match message {
            InboundMessage::AgentRegister {
                agent_id,
                agent_type,
                capabilities,
            } => self.register(conn, PeerKind::Agent, agent_id, agent_type, capabilities),
            InboundMessage::GatewayRegister {
                client_id,
                client_type,
                capabilities,
            } => self.register(conn, PeerKind::Gateway, client_id, client_type, capabilities),
            InboundMessage::ResearchAction { data } => self.submit_task(conn, data),
            InboundMessage::TaskResult {
                task_id,
                result,
                status,
                error,
            } => self.report_result(conn, task_id, result, status, error),
            InboundMessage::Heartbeat { agent_id } => self.heartbeat(conn, &agent_id),
        }
    }

    fn register(
        &self,
        conn: &ConnectionId,
        kind: PeerKind,
        id: String,
        peer_type: String,
        capabilities: Vec<String>,
    ) {
        if id.trim().is_empty() {
            self.connections.send(
                conn,
                &OutboundMessage::error(AppError::Validation("peer id must not be empty".into())),
            );
            return;
        }

        let mut state = self.state.lock();
        let record = AgentRecord::new(id.clone(), kind, peer_type, capabilities, conn.clone());
        if let Some(previous) = state.registry.upsert(record) {
            tracing::info!(
                conn_id = %conn,
                agent_id = %id,
                previous_conn = %previous.connection_id,
                "re-registration replaced existing record"
            );
            // A gateway taking over an agent id leaves that agent's tasks without an owner.
            if previous.kind == PeerKind::Agent
                && kind != PeerKind::Agent
                && self.fail_tasks_on_disconnect
            {
                let reason = format!("assigned agent {} re-registered as a gateway", id);
                let failed = self.fail_assigned(&mut state.router, &id, &reason);
                if !failed.is_empty() {
                    tracing::warn!(agent_id = %id, failed_tasks = failed.len(), "agent displaced by gateway");
                }
            }
        } else {
            tracing::info!(conn_id = %conn, agent_id = %id, ?kind, "peer registered");
        }

        let (agent_id, client_id) = match kind {
            PeerKind::Agent => (Some(id), None),
            PeerKind::Gateway => (None, Some(id)),
        };
        self.connections.send(
            conn,
            &OutboundMessage::RegistrationConfirmed {
                agent_id,
                client_id,
                server_id: self.server_id.clone(),
            },
        );
    }

    fn submit_task(&self, conn: &ConnectionId, data: ResearchActionData) {
        let task_id = data
            .task_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let submission = TaskSubmission {
            task_id: Some(task_id.clone()),
            agent_type: data.agent_type,
            action: data.action,
            payload: data.payload,
            context_id: data.context_id,
        };

        let mut guard = self.state.lock();
        let CoordinatorState { registry, router } = &mut *guard;

        let task = match router.assign(registry, conn, submission) {
            Ok(task) => task.clone(),
            Err(e) => {
                tracing::info!(conn_id = %conn, task_id, error = %e, "task rejected");
                self.connections.send(
                    conn,
                    &OutboundMessage::TaskRejected {
                        task_id,
                        error: e.to_string(),
                    },
                );
                return;
            }
        };

        let agent_conn = registry
            .get(&task.assigned_agent)
            .map(|agent| agent.connection_id.clone());
        let request = OutboundMessage::TaskRequest {
            task_id: task.id.clone(),
            context_id: task.context_id.clone(),
            agent_type: task.agent_type.clone(),
            action: task.action.clone(),
            payload: task.payload.clone(),
        };
        let forwarded = agent_conn
            .as_ref()
            .map(|agent_conn| self.connections.send(agent_conn, &request));

        if forwarded != Some(SendOutcome::Delivered) {
            router.complete(&task.id, TaskOutcome::failed("assigned agent unreachable"));
            tracing::warn!(
                task_id = %task.id,
                agent_id = %task.assigned_agent,
                "could not forward task to assigned agent"
            );
            self.connections.send(
                conn,
                &OutboundMessage::TaskRejected {
                    task_id: task.id,
                    error: format!("assigned agent '{}' is unreachable", task.assigned_agent),
                },
            );
            return;
        }

        tracing::info!(
            task_id = %task.id,
            agent_id = %task.assigned_agent,
            action = %task.action,
            "task dispatched"
        );
        self.connections.send(
            conn,
            &OutboundMessage::TaskQueued {
                task_id: task.id,
                assigned_agent: task.assigned_agent,
                agent_type: task.agent_type,
                status: task.status,
            },
        );
    }

    fn report_result(
        &self,
        conn: &ConnectionId,
        task_id: String,
        result: serde_json::Value,
        status: Option<TaskStatus>,
        error: Option<String>,
    ) {
        let status = status.unwrap_or(if error.is_some() {
            TaskStatus::Failed
        } else {
            TaskStatus::Completed
        });
        if !status.is_terminal() {
            self.connections.send(
                conn,
                &OutboundMessage::error(AppError::Validation(format!(
                    "task_result status must be completed or failed, got '{}'",
                    status
                ))),
            );
            return;
        }

        let mut state = self.state.lock();
        let Some(task) = state.router.complete(
            &task_id,
            TaskOutcome {
                status,
                result,
                error,
            },
        ) else {
            tracing::warn!(conn_id = %conn, task_id, "result for unknown task ignored");
            return;
        };

        tracing::info!(task_id, status = %task.status, "task finished");
        self.deliver_result(&task);
    }

    /// Only the connection a record is bound to may refresh it.
    fn heartbeat(&self, conn: &ConnectionId, agent_id: &str) {
        let now = Utc::now();
        let mut state = self.state.lock();
        let owner = state.registry.get(agent_id).map(|r| r.connection_id == *conn);
        let reply = match owner {
            Some(true) => {
                state.registry.touch(agent_id, now);
                tracing::trace!(conn_id = %conn, agent_id, "heartbeat");
                OutboundMessage::HeartbeatAck {
                    agent_id: agent_id.to_string(),
                    timestamp: now,
                }
            }
            Some(false) => {
                tracing::warn!(
                    conn_id = %conn,
                    agent_id,
                    "heartbeat from a connection that does not own the record"
                );
                OutboundMessage::error(format!(
                    "agent '{}' is registered on another connection",
                    agent_id
                ))
            }
            None => OutboundMessage::error(format!("agent '{}' is not registered", agent_id)),
        };
        self.connections.send(conn, &reply);
    }

    /// Tear down a closed connection.
    ///
    /// Removes every record bound to `conn`. Tasks assigned to a removed agent
    /// are failed and reported to their submitters unless the server was
    /// built with `fail_tasks_on_disconnect = false`, in which case they stay
    /// `processing`.
    pub fn disconnect(&self, conn: &ConnectionId) -> TeardownReport {
        self.connections.close(conn);

        let mut state = self.state.lock();
        let removed = state.registry.remove_by_connection(conn);
        let mut report = TeardownReport {
            removed_agents: removed.iter().map(|r| r.id.clone()).collect(),
            failed_tasks: Vec::new(),
        };

        if self.fail_tasks_on_disconnect {
            for agent in removed.iter().filter(|r| r.kind == PeerKind::Agent) {
                let reason = format!("assigned agent {} disconnected", agent.id);
                let failed = self.fail_assigned(&mut state.router, &agent.id, &reason);
                report.failed_tasks.extend(failed);
            }
        }

        tracing::info!(
            conn_id = %conn,
            removed_agents = report.removed_agents.len(),
            failed_tasks = report.failed_tasks.len(),
            "connection closed"
        );
        report
    }

    /// Apply liveness and task timeouts. Expired tasks are failed and reported.
    pub fn sweep(&self, monitor: &HeartbeatMonitor, now: DateTime<Utc>) -> SweepReport {
        let mut guard = self.state.lock();
        let CoordinatorState { registry, router } = &mut *guard;
        let report = monitor.sweep(registry, router, now);

        for agent_id in &report.deactivated {
            tracing::warn!(agent_id, "agent missed heartbeats, marked inactive");
        }
        if let Some(timeout) = monitor.task_timeout {
            for task_id in &report.expired_tasks {
                let reason = format!("task timed out after {}s", timeout.as_secs());
                if let Some(task) = router.complete(task_id, TaskOutcome::failed(reason)) {
                    tracing::warn!(task_id, agent_id = %task.assigned_agent, "task expired");
                    self.deliver_result(&task);
                }
            }
        }
        report
    }

    /// Fail every in-flight task assigned to `agent_id` and report each to its submitter.
    fn fail_assigned(&self, router: &mut TaskRouter, agent_id: &str, reason: &str) -> Vec<String> {
        let mut failed = Vec::new();
        for task_id in router.assigned_to(agent_id) {
            if let Some(task) = router.complete(&task_id, TaskOutcome::failed(reason)) {
                self.deliver_result(&task);
                failed.push(task_id);
            }
        }
        failed
    }

    fn deliver_result(&self, task: &Task) {
        let message = OutboundMessage::TaskResult {
            task_id: task.id.clone(),
            status: task.status,
            result: task.result.clone().unwrap_or(serde_json::Value::Null),
            error: task.error.clone(),
        };
        if self.connections.send(&task.submitter, &message) != SendOutcome::Delivered {
            tracing::warn!(
                task_id = %task.id,
                submitter = %task.submitter,
                "submitter unavailable, result dropped"
            );
        }
    }

    /// Snapshot of every registered peer in registration order.
    pub fn agents(&self) -> Vec<AgentRecord> {
        self.state.lock().registry.records().to_vec()
    }

    pub fn agent(&self, id: &str) -> Option<AgentRecord> {
        self.state.lock().registry.get(id).cloned()
    }

    /// Snapshot of in-flight tasks.
    pub fn tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.state.lock().router.tasks().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.state.lock().router.get(id).cloned()
    }

    pub fn stats(&self) -> ServerStats {
        let state = self.state.lock();
        let gateways = state
            .registry
            .records()
            .iter()
            .filter(|r| r.kind == PeerKind::Gateway)
            .count();
        ServerStats {
            server_id: self.server_id.clone(),
            connections: self.connections.len(),
            agents: state.registry.len() - gateways,
            gateways,
            tasks_in_flight: state.router.len(),
        }
    }
}

impl Default for CoordinationServer {
    fn default() -> Self {
        Self::new(CoordinatorOptions::default())
    }
}
