// ============================
// backend-lib/src/ws_router.rs
// ============================
//! WebSocket router and connection handling.
use crate::metrics as keys;
use crate::websocket::SignalingHandler;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use liveclass_common::{ClientMessage, ServerMessage};
use metrics::{counter, gauge};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the signaling router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Liveness probe, informational only: process is up and this many meetings
/// are active.
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "active_meetings": state.registry.len(),
    }))
}

/// Handler for WebSocket connections
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    counter!(keys::WS_CONNECTION).increment(1);

    // Upgrade the connection to a WebSocket
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    gauge!(keys::WS_ACTIVE).increment(1.0);

    let (mut sink, mut stream) = socket.split();

    // Outbound channel: everything addressed to this connection funnels
    // through here, both its own error events and broadcasts from peers.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let handler = SignalingHandler::new(state);
    handler.register(tx.clone());
    tracing::info!(connection_id = %handler.connection_id(), "connection opened");

    // Writer task: serialize ServerMessages onto the socket.
    let send_task = tokio::spawn(async move {
        while let Some(server_msg) = rx.recv().await {
            let Ok(json) = serde_json::to_string(&server_msg) else {
                continue;
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Main loop: decode and dispatch inbound frames. Exactly one of
    // {success, error event to this connection} results per frame.
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    if let Err(err) = handler.handle_message(client_msg) {
                        let _ = tx.send(ServerMessage::Error {
                            message: err.to_string(),
                        });
                    }
                },
                Err(err) => {
                    tracing::warn!(
                        connection_id = %handler.connection_id(),
                        error = %err,
                        "undecodable frame"
                    );
                    let _ = tx.send(ServerMessage::Error {
                        message: crate::error::AppError::from(err).to_string(),
                    });
                },
            },
            Message::Close(_) => break,
            // Ping/pong are answered by axum itself; binary frames have no
            // meaning in this protocol.
            _ => {},
        }
    }

    // Cleanup: unwind every meeting membership when the connection drops,
    // whether the close was clean or abrupt.
    handler.handle_disconnect();
    tracing::info!(connection_id = %handler.connection_id(), "connection closed");

    counter!(keys::WS_DISCONNECTION).increment(1);
    gauge!(keys::WS_ACTIVE).decrement(1.0);

    send_task.abort();
}
