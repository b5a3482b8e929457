use serde::{Deserialize, Serialize};

// ============= Task Types =============

/// Lifecycle state of a dispatched task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Whether the task has reached a final state.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ============= Error Types =============

/// Substrings that mark a provider failure as a transport problem rather than
/// an API-level rejection.
const NETWORK_MARKERS: &[&str] = &[
    "network",
    "connection",
    "connect",
    "timeout",
    "timed out",
    "dns",
    "unreachable",
    "reset by peer",
];

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid message: {0}")]
    Validation(String),

    #[error("No active agent of type '{agent_type}' can perform '{action}'")]
    NoCapableAgent { agent_type: String, action: String },

    #[error("Task '{0}' is already in flight")]
    DuplicateTask(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Network error from {provider}: {message}")]
    Network { provider: String, message: String },

    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    /// Classify a failed provider call by looking at its error text.
    ///
    /// The check is a coarse substring match: anything that smells like a
    /// transport failure becomes [`AppError::Network`], the rest [`AppError::Api`].
    pub fn classify_provider_failure(provider: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        if NETWORK_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            AppError::Network {
                provider: provider.to_string(),
                message,
            }
        } else {
            AppError::Api {
                provider: provider.to_string(),
                message,
            }
        }
    }

    /// Provider tag carried by provider-level errors.
    pub fn provider(&self) -> Option<&str> {
        match self {
            AppError::Network { provider, .. } | AppError::Api { provider, .. } => Some(provider),
            _ => None,
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            AppError::Validation(_) | AppError::DuplicateTask(_) => StatusCode::BAD_REQUEST,
            AppError::NoCapableAgent { .. } | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Network { .. } | AppError::Api { .. } | AppError::LLM(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Configuration(_) | AppError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("connection refused", true)]
    #[case("Request timed out after 30s", true)]
    #[case("DNS lookup failed", true)]
    #[case("network unreachable", true)]
    #[case("401 Unauthorized: invalid api key", false)]
    #[case("rate limit exceeded", false)]
    fn test_classify_provider_failure(#[case] message: &str, #[case] is_network: bool) {
        let err = AppError::classify_provider_failure("openai", message);
        match err {
            AppError::Network { provider, .. } => {
                assert!(is_network, "'{}' should be an API error", message);
                assert_eq!(provider, "openai");
            }
            AppError::Api { provider, .. } => {
                assert!(!is_network, "'{}' should be a network error", message);
                assert_eq!(provider, "openai");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_provider_tag() {
        let err = AppError::classify_provider_failure("xai", "bad request");
        assert_eq!(err.provider(), Some("xai"));
        assert_eq!(AppError::NotFound("x".into()).provider(), None);
    }

    #[test]
    fn test_task_status_serialization() {
        let json = serde_json::to_string(&TaskStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        let parsed: TaskStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, TaskStatus::Failed);
        assert!(parsed.is_terminal());
        assert!(!TaskStatus::Queued.is_terminal());
    }

    #[tokio::test]
    async fn test_not_found_renders_json_error() {
        use axum::response::IntoResponse;

        let response = AppError::NotFound("task 't9'".into()).into_response();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "Not found: task 't9'");
    }
}
