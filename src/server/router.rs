//! In-flight task tracking.
//!
//! The router owns every task between dispatch and its final result. It only
//! decides *who* gets a task; delivering frames is the coordinator's job.

use crate::server::registry::AgentRegistry;
use crate::server::transport::ConnectionId;
use crate::types::{AppError, Result, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A unit of dispatched work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub context_id: Option<String>,
    pub agent_type: String,
    pub action: String,
    pub payload: serde_json::Value,
    pub assigned_agent: String,
    pub submitter: ConnectionId,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a submitter asked for.
#[derive(Debug, Clone)]
pub struct TaskSubmission {
    pub task_id: Option<String>,
    pub agent_type: String,
    pub action: String,
    pub payload: serde_json::Value,
    pub context_id: Option<String>,
}

/// Final report for a task, as sent by an agent or produced by the server.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub result: serde_json::Value,
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            result: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct TaskRouter {
    tasks: HashMap<String, Task>,
}

impl TaskRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick an agent for `submission` and record the task as `processing`.
    ///
    /// Fails without creating anything when fields are empty, the task id is
    /// already in flight, or no active agent declares the action.
    pub fn assign(
        &mut self,
        registry: &AgentRegistry,
        submitter: &ConnectionId,
        submission: TaskSubmission,
    ) -> Result<&Task> {
        if submission.agent_type.trim().is_empty() {
            return Err(AppError::Validation("agent_type must not be empty".to_string()));
        }
        if submission.action.trim().is_empty() {
            return Err(AppError::Validation("action must not be empty".to_string()));
        }

        let task_id = submission
            .task_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.tasks.contains_key(&task_id) {
            return Err(AppError::DuplicateTask(task_id));
        }

        let agent = registry
            .find_capable(&submission.agent_type, &submission.action)
            .ok_or_else(|| AppError::NoCapableAgent {
                agent_type: submission.agent_type.clone(),
                action: submission.action.clone(),
            })?;

        let now = Utc::now();
        let task = Task {
            id: task_id.clone(),
            context_id: submission.context_id,
            agent_type: submission.agent_type,
            action: submission.action,
            payload: submission.payload,
            assigned_agent: agent.id.clone(),
            submitter: submitter.clone(),
            status: TaskStatus::Processing,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
        };

        Ok(&*self.tasks.entry(task_id).or_insert(task))
    }

    /// Apply a final outcome and take the task out of the in-flight map.
    /// Unknown ids return `None`.
    pub fn complete(&mut self, task_id: &str, outcome: TaskOutcome) -> Option<Task> {
        let mut task = self.tasks.remove(task_id)?;
        task.status = outcome.status;
        task.result = Some(outcome.result);
        task.error = outcome.error;
        task.updated_at = Utc::now();
        Some(task)
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    /// Ids of in-flight tasks assigned to `agent_id`.
    pub fn assigned_to(&self, agent_id: &str) -> Vec<String> {
        self.tasks
            .values()
            .filter(|t| t.assigned_agent == agent_id)
            .map(|t| t.id.clone())
            .collect()
    }

    /// Ids of in-flight tasks created before `cutoff`.
    pub fn older_than(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        self.tasks
            .values()
            .filter(|t| t.created_at < cutoff)
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
