use crate::AppState;
use crate::server::ws::handle_socket;
use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let server = state.server.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, server))
}
