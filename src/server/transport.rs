//! Per-peer message channels.
//!
//! Each connected peer owns one bounded outbound queue. The socket writer
//! drains the receiving half; everything else in the server only ever sees a
//! [`ConnectionId`] and pushes frames through [`ConnectionSet::send`], which
//! never blocks.

use crate::protocol::OutboundMessage;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Opaque identifier for one connected peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(format!("conn-{}", Uuid::new_v4()))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of pushing a frame to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// The peer's queue is full; the frame was dropped.
    QueueFull,
    /// The peer is gone.
    Closed,
}

/// All open connections, keyed by id.
pub struct ConnectionSet {
    connections: RwLock<HashMap<ConnectionId, mpsc::Sender<String>>>,
    queue_capacity: usize,
}

impl ConnectionSet {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Open a new connection and hand back the receiving half of its queue.
    pub fn open(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.connections.write().insert(id.clone(), tx);
        (id, rx)
    }

    /// Drop a connection. Returns false if it was not open.
    pub fn close(&self, id: &ConnectionId) -> bool {
        self.connections.write().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize and enqueue a frame for one peer without waiting.
    pub fn send(&self, id: &ConnectionId, message: &OutboundMessage) -> SendOutcome {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(conn_id = %id, error = %e, "failed to serialize outbound message");
                return SendOutcome::Closed;
            }
        };

        let connections = self.connections.read();
        let Some(tx) = connections.get(id) else {
            tracing::debug!(conn_id = %id, "dropping message for closed connection");
            return SendOutcome::Closed;
        };

        match tx.try_send(text) {
            Ok(()) => SendOutcome::Delivered,
            Err(mpsc::error::TrySendError::Full(text)) => {
                tracing::warn!(conn_id = %id, msg_len = text.len(), "send queue full, dropping message");
                SendOutcome::QueueFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }
}

impl Default for ConnectionSet {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert!(a.0.starts_with("conn-"));
    }

    #[test]
    fn test_open_and_close() {
        let set = ConnectionSet::new(8);
        assert!(set.is_empty());

        let (a, _rx_a) = set.open();
        let (b, _rx_b) = set.open();
        assert_eq!(set.len(), 2);

        assert!(set.close(&a));
        assert!(!set.close(&a));
        assert_eq!(set.len(), 1);
        assert_eq!(set.send(&a, &OutboundMessage::error("x")), SendOutcome::Closed);
        assert_eq!(set.send(&b, &OutboundMessage::error("x")), SendOutcome::Delivered);
    }

    #[test]
    fn test_send_delivers_json() {
        let set = ConnectionSet::new(8);
        let (id, mut rx) = set.open();

        let outcome = set.send(&id, &OutboundMessage::error("boom"));
        assert_eq!(outcome, SendOutcome::Delivered);

        let text = rx.try_recv().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "boom");
    }

    #[test]
    fn test_send_to_full_queue_drops() {
        let set = ConnectionSet::new(1);
        let (id, _rx) = set.open();

        assert_eq!(set.send(&id, &OutboundMessage::error("1")), SendOutcome::Delivered);
        assert_eq!(set.send(&id, &OutboundMessage::error("2")), SendOutcome::QueueFull);
    }

    #[test]
    fn test_send_to_unknown_or_dropped_receiver() {
        let set = ConnectionSet::new(4);
        assert_eq!(
            set.send(&ConnectionId::new(), &OutboundMessage::error("x")),
            SendOutcome::Closed
        );

        let (id, rx) = set.open();
        drop(rx);
        assert_eq!(set.send(&id, &OutboundMessage::error("x")), SendOutcome::Closed);
    }
}
