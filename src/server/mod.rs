//! Coordination server: agent registry, task routing and liveness.
//!
//! - [`coordinator`] - message dispatch over shared state
//! - [`registry`] - registered agents and gateways
//! - [`router`] - in-flight tasks and assignment
//! - [`heartbeat`] - liveness sweeps and task expiry
//! - [`transport`] - per-connection outbound queues
//! - [`ws`] - WebSocket connection loop

pub mod coordinator;
pub mod heartbeat;
pub mod registry;
pub mod router;
pub mod transport;
pub mod ws;

pub use coordinator::{CoordinationServer, CoordinatorOptions, ServerStats, TeardownReport};
pub use heartbeat::{HeartbeatMonitor, SweepReport, spawn_sweeper};
pub use registry::{AgentRecord, AgentRegistry, AgentStatus, PeerKind};
pub use router::{Task, TaskOutcome, TaskRouter, TaskSubmission};
pub use transport::{ConnectionId, ConnectionSet, SendOutcome};
