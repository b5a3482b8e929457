//! Liveness tracking.
//!
//! Agents prove they are alive by sending `heartbeat` frames (registration
//! counts as one). A periodic sweep marks silent agents inactive so routing
//! skips them, and optionally expires tasks that have been in flight too long.

use crate::server::coordinator::CoordinationServer;
use crate::server::registry::AgentRegistry;
use crate::server::router::TaskRouter;
use crate::utils::toml_config::{ConfigManager, ServerConfig};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Timeouts applied by a sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatMonitor {
    pub heartbeat_timeout: Duration,
    /// `None` disables task expiry.
    pub task_timeout: Option<Duration>,
}

/// What a sweep changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub deactivated: Vec<String>,
    pub expired_tasks: Vec<String>,
}

impl HeartbeatMonitor {
    pub fn new(heartbeat_timeout: Duration, task_timeout: Option<Duration>) -> Self {
        Self {
            heartbeat_timeout,
            task_timeout,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        let task_timeout =
            (config.task_timeout_secs > 0).then(|| Duration::from_secs(config.task_timeout_secs));
        Self::new(Duration::from_secs(config.heartbeat_timeout_secs), task_timeout)
    }

    /// Deactivate silent agents and list tasks past their deadline.
    ///
    /// Expired tasks are only reported here; failing them and notifying the
    /// submitter is left to the caller.
    pub fn sweep(
        &self,
        registry: &mut AgentRegistry,
        router: &TaskRouter,
        now: DateTime<Utc>,
    ) -> SweepReport {
        let deactivated = registry.deactivate_stale(cutoff(now, self.heartbeat_timeout));
        let expired_tasks = self
            .task_timeout
            .map(|timeout| router.older_than(cutoff(now, timeout)))
            .unwrap_or_default();

        SweepReport {
            deactivated,
            expired_tasks,
        }
    }
}

fn cutoff(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Run [`CoordinationServer::sweep`] on a fixed interval.
///
/// Timeouts are re-read from the live configuration on every tick so a
/// hot-reloaded config takes effect without a restart.
pub fn spawn_sweeper(
    server: Arc<CoordinationServer>,
    config: Arc<ConfigManager>,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(config.config().server.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            let monitor = HeartbeatMonitor::from_config(&config.config().server);
            let report = server.sweep(&monitor, Utc::now());
            if !report.deactivated.is_empty() || !report.expired_tasks.is_empty() {
                tracing::info!(
                    deactivated = report.deactivated.len(),
                    expired_tasks = report.expired_tasks.len(),
                    "liveness sweep"
                );
            }
        }
    })
}
