//! WebSocket connection handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::api::rest::ApiError;
use crate::capture::Capture;
use crate::notify::{BroadcastNotifier, ClientMessage, PongMessage, WelcomeMessage};

/// GET {base}/ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(capture): State<Capture>) -> Response {
    match capture.broadcaster() {
        Some(broadcaster) => {
            let broadcaster = Arc::clone(broadcaster);
            ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiError::not_found("real-time updates are disabled")),
        )
            .into_response(),
    }
}

async fn handle_socket(mut socket: WebSocket, broadcaster: Arc<BroadcastNotifier>) {
    let mut rx = broadcaster.subscribe();

    let welcome = WelcomeMessage::new(broadcaster.current_sequence_id());
    if let Ok(json) = serde_json::to_string(&welcome) {
        if socket.send(Message::Text(json)).await.is_err() {
            return;
        }
    }
    debug!("Dashboard client connected");

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if socket.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        let error_msg = serde_json::json!({
                            "type": "error",
                            "code": "lagged",
                            "message": format!("Missed {} events, please refresh", n)
                        });
                        let _ = socket.send(Message::Text(error_msg.to_string())).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(msg)) => {
                        if !handle_client_message(msg, &mut socket).await {
                            break;
                        }
                    }
                    Some(Err(_)) | None => break,
                }
            }
        }
    }
    debug!("Dashboard client disconnected");
}

/// Returns false if the connection should be closed
async fn handle_client_message(msg: Message, socket: &mut WebSocket) -> bool {
    match msg {
        Message::Text(text) => {
            if let Ok(ClientMessage::Ping) = serde_json::from_str::<ClientMessage>(&text) {
                if let Ok(json) = serde_json::to_string(&PongMessage::default()) {
                    let _ = socket.send(Message::Text(json)).await;
                }
            }
            true
        }
        Message::Ping(data) => {
            let _ = socket.send(Message::Pong(data)).await;
            true
        }
        Message::Binary(_) | Message::Pong(_) => true,
        Message::Close(_) => false,
    }
}
