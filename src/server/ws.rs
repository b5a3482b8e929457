//! WebSocket transport for the coordination protocol.

use crate::server::coordinator::CoordinationServer;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Drive one peer connection until either side closes it.
///
/// A writer task drains the peer's outbound queue and pings on a fixed
/// interval; the reader feeds frames to the coordinator one at a time. Binary
/// frames carrying UTF-8 are treated like text.
/// When either half finishes the connection is torn down.
pub async fn handle_socket(socket: WebSocket, server: Arc<CoordinationServer>) {
    let (conn_id, mut rx) = server.connect();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_conn = conn_id.clone();
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        ping_interval.tick().await;

        loop {
            tokio::select! {
                frame = rx.recv() => {
                    let Some(text) = frame else { break };
                    if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(Default::default())).await.is_err() {
                        break;
                    }
                    tracing::trace!(conn_id = %writer_conn, "sent ping");
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    let reader_conn = conn_id.clone();
    let reader_server = Arc::clone(&server);
    let mut reader = tokio::spawn(async move {
        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => reader_server.handle_message(&reader_conn, text.as_str()),
                Ok(WsMessage::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(text) => reader_server.handle_message(&reader_conn, text),
                    Err(e) => reader_server
                        .reject_frame(&reader_conn, format!("binary frame is not valid UTF-8: {}", e)),
                },
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(conn_id = %reader_conn, error = %e, "websocket read failed");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    server.disconnect(&conn_id);
}
