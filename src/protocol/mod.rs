//! Wire protocol spoken over coordination connections.
//!
//! Every frame is a JSON object with a `type` discriminator. Inbound frames
//! decode into the closed [`InboundMessage`] enum; replies are built from
//! [`OutboundMessage`]. Decoding distinguishes between frames whose `type` is
//! simply unknown (logged and ignored) and frames that claim a known type but
//! are malformed (answered with an `error` frame).

use crate::types::{AppError, Result, TaskStatus};
use serde::{Deserialize, Serialize};

/// Message types the server understands.
pub const KNOWN_TYPES: &[&str] = &[
    "agent_register",
    "gateway_register",
    "research_action",
    "task_result",
    "heartbeat",
];

// ============= Inbound =============

/// Body of a `research_action` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchActionData {
    #[serde(default)]
    pub task_id: Option<String>,
    pub agent_type: String,
    pub action: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub context_id: Option<String>,
}

/// Frames a peer may send to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    AgentRegister {
        agent_id: String,
        agent_type: String,
        #[serde(default)]
        capabilities: Vec<String>,
    },
    GatewayRegister {
        client_id: String,
        #[serde(default)]
        client_type: String,
        #[serde(default)]
        capabilities: Vec<String>,
    },
    ResearchAction {
        data: ResearchActionData,
    },
    TaskResult {
        task_id: String,
        #[serde(default)]
        result: serde_json::Value,
        #[serde(default)]
        status: Option<TaskStatus>,
        #[serde(default)]
        error: Option<String>,
    },
    Heartbeat {
        agent_id: String,
    },
}

/// Outcome of decoding one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A well-formed frame of a known type.
    Message(InboundMessage),
    /// A JSON object whose `type` the server does not handle.
    Unrecognized(String),
}

/// Decode a text frame.
///
/// Returns [`AppError::Validation`] when the frame is not a JSON object, has
/// no string `type`, or is missing/mistyping fields for a known type.
pub fn decode(text: &str) -> Result<Decoded> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| AppError::Validation(format!("invalid JSON: {}", e)))?;

    let message_type = value
        .as_object()
        .ok_or_else(|| AppError::Validation("message must be a JSON object".to_string()))?
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| AppError::Validation("missing string field 'type'".to_string()))?
        .to_string();

    if !KNOWN_TYPES.contains(&message_type.as_str()) {
        return Ok(Decoded::Unrecognized(message_type));
    }

    serde_json::from_value(value)
        .map(Decoded::Message)
        .map_err(|e| AppError::Validation(format!("malformed '{}' message: {}", message_type, e)))
}

// ============= Outbound =============

/// Frames the server sends to peers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    RegistrationConfirmed {
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
        server_id: String,
    },
    TaskRequest {
        task_id: String,
        context_id: Option<String>,
        agent_type: String,
        action: String,
        payload: serde_json::Value,
    },
    TaskQueued {
        task_id: String,
        assigned_agent: String,
        agent_type: String,
        status: TaskStatus,
    },
    TaskRejected {
        task_id: String,
        error: String,
    },
    TaskResult {
        task_id: String,
        status: TaskStatus,
        result: serde_json::Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    HeartbeatAck {
        agent_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    Error {
        message: String,
    },
}

impl OutboundMessage {
    /// Build an `error` frame from any displayable error.
    pub fn error(err: impl std::fmt::Display) -> Self {
        OutboundMessage::Error {
            message: err.to_string(),
        }
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
