//! Coordination protocol over a real WebSocket connection.

use futures::{SinkExt, StreamExt};
use labrelay::server::{CoordinationServer, CoordinatorOptions};
use labrelay::{AppConfig, AppState, ConfigManager, api};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (SocketAddr, Arc<CoordinationServer>) {
    let coordinator = Arc::new(CoordinationServer::new(CoordinatorOptions {
        server_id: Some("srv-ws".to_string()),
        ..Default::default()
    }));
    let config = Arc::new(ConfigManager::from_config(AppConfig::default()));
    let app = api::app(AppState::new(config, coordinator.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, coordinator)
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    client
}

async fn send(client: &mut Client, frame: Value) {
    client.send(Message::text(frame.to_string())).await.unwrap();
}

async fn recv(client: &mut Client) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn wait_for<F: Fn(&CoordinationServer) -> bool>(server: &CoordinationServer, check: F) {
    for _ in 0..100 {
        if check(server) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_research_round_trip_over_websocket() {
    let (addr, coordinator) = spawn_server().await;

    let mut agent = connect(addr).await;
    send(
        &mut agent,
        json!({"type": "agent_register", "agent_id": "A", "agent_type": "literature", "capabilities": ["search"]}),
    )
    .await;
    let confirmed = recv(&mut agent).await;
    assert_eq!(confirmed["type"], "registration_confirmed");
    assert_eq!(confirmed["server_id"], "srv-ws");

    let mut gateway = connect(addr).await;
    send(&mut gateway, json!({"type": "gateway_register", "client_id": "G", "client_type": "cli"})).await;
    assert_eq!(recv(&mut gateway).await["client_id"], "G");

    send(
        &mut gateway,
        json!({"type": "research_action", "data": {"agent_type": "literature", "action": "search", "payload": {"query": "x"}}}),
    )
    .await;

    let request = recv(&mut agent).await;
    assert_eq!(request["type"], "task_request");
    let queued = recv(&mut gateway).await;
    assert_eq!(queued["assigned_agent"], "A");
    assert_eq!(queued["task_id"], request["task_id"]);

    send(
        &mut agent,
        json!({"type": "task_result", "task_id": request["task_id"], "status": "completed", "result": {"hits": 3}}),
    )
    .await;

    let result = recv(&mut gateway).await;
    assert_eq!(result["type"], "task_result");
    assert_eq!(result["result"], json!({"hits": 3}));
    assert!(coordinator.tasks().is_empty());
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let (addr, _) = spawn_server().await;
    let mut client = connect(addr).await;

    client.send(Message::text("{oops")).await.unwrap();
    assert_eq!(recv(&mut client).await["type"], "error");

    send(
        &mut client,
        json!({"type": "agent_register", "agent_id": "A", "agent_type": "analysis", "capabilities": []}),
    )
    .await;
    assert_eq!(recv(&mut client).await["type"], "registration_confirmed");
}

#[tokio::test]
async fn test_binary_frames_are_answered() {
    let (addr, _) = spawn_server().await;
    let mut client = connect(addr).await;

    client
        .send(Message::binary(br#"{"type":"heartbeat","agent_id":"A"}"#.to_vec()))
        .await
        .unwrap();
    let reply = recv(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["message"], "agent 'A' is not registered");

    client.send(Message::binary(vec![0xff, 0xfe, 0x00])).await.unwrap();
    let reply = recv(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert!(reply["message"].as_str().unwrap().contains("UTF-8"));

    let register = json!({"type": "agent_register", "agent_id": "A", "agent_type": "analysis", "capabilities": []});
    client
        .send(Message::binary(register.to_string().into_bytes()))
        .await
        .unwrap();
    assert_eq!(recv(&mut client).await["type"], "registration_confirmed");
}

#[tokio::test]
async fn test_closing_socket_tears_down_registration() {
    let (addr, coordinator) = spawn_server().await;

    let mut agent = connect(addr).await;
    send(
        &mut agent,
        json!({"type": "agent_register", "agent_id": "A", "agent_type": "literature", "capabilities": ["search"]}),
    )
    .await;
    recv(&mut agent).await;
    assert_eq!(coordinator.agents().len(), 1);

    agent.close(None).await.unwrap();

    wait_for(&coordinator, |s| s.agents().is_empty() && s.stats().connections == 0).await;
}
