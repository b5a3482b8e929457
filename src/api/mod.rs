//! HTTP surface of the coordination server
//!
//! Built on axum. One WebSocket endpoint carries the coordination protocol;
//! the remaining routes are read-only introspection.
//!
//! # Endpoints
//!
//! - `GET /ws` - upgrade to a coordination connection (agents and gateways)
//! - `GET /health` - status, server id, counts, live timeouts and providers
//! - `GET /agents` - registry snapshot in registration order
//! - `GET /agents/{id}` - one registered peer, 404 when unknown
//! - `GET /tasks` - in-flight tasks, oldest first
//! - `GET /tasks/{id}` - one in-flight task, 404 when unknown or finished

/// Request handlers for each endpoint.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;

pub use routes::{app, create_router};
