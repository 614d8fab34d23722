//! WebSocket connection handling

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, info, warn};

use super::messages::{ClientMessage, WsMessage};
use crate::AppState;

/// Handle WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn snapshot(state: &AppState) -> WsMessage {
    match state.dispatch.session().await {
        Ok(session) => WsMessage::Snapshot {
            session,
            map: state.surface.snapshot(),
        },
        Err(e) => WsMessage::Error {
            code: e.error_code(),
            message: e.to_string(),
        },
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("New WebSocket connection established");
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so nothing falls between them
    let mut event_rx = state.dispatch.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::channel::<WsMessage>(16);

    if let Ok(json) = serde_json::to_string(&snapshot(&state).await) {
        if sender.send(Message::Text(json)).await.is_err() {
            return;
        }
    }

    // Forward lifecycle events and direct replies to this client
    let mut send_task = tokio::spawn(async move {
        loop {
            let json = tokio::select! {
                event = event_rx.recv() => match event {
                    Ok(event) => serde_json::to_string(&event),
                    Err(RecvError::Lagged(missed)) => {
                        warn!("WebSocket client lagged by {} events", missed);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(reply) = reply_rx.recv() => serde_json::to_string(&reply),
            };
            if let Ok(json) = json {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Handle incoming messages from client
    let state_clone = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => {
                        let reply = handle_client_message(client_msg, &state_clone).await;
                        if let Some(reply) = reply {
                            if reply_tx.send(reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Failed to parse client message: {} - raw: {}", e, text);
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("WebSocket connection closed");
}

/// Handle a message from a client; some messages get a direct reply
async fn handle_client_message(msg: ClientMessage, state: &AppState) -> Option<WsMessage> {
    match msg {
        ClientMessage::Location { lat, lng } => match state.location.update(lat, lng) {
            Ok(fix) => {
                debug!("Client position: {}", fix);
                None
            }
            Err(e) => Some(WsMessage::Error {
                code: e.error_code(),
                message: e.to_string(),
            }),
        },
        ClientMessage::GetSnapshot => Some(snapshot(state).await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::rest::tests::{test_state, HERE};

    #[tokio::test]
    async fn test_location_message_updates_fix() {
        let state = test_state();

        let reply = handle_client_message(ClientMessage::Location { lat: 13.0, lng: 77.6 }, &state).await;
        assert!(reply.is_none());
        assert_eq!(state.location.latest().map(|c| c.lat), Some(13.0));

        let reply = handle_client_message(ClientMessage::Location { lat: 95.0, lng: 0.0 }, &state).await;
        assert!(matches!(
            reply,
            Some(WsMessage::Error {
                code: "INVALID_COORDINATE",
                ..
            })
        ));
        assert_ne!(state.location.latest(), Some(HERE));
    }

    #[tokio::test]
    async fn test_snapshot_reply() {
        let state = test_state();
        state.dispatch.trigger_sos().await.unwrap();

        let reply = handle_client_message(ClientMessage::GetSnapshot, &state).await;
        let Some(WsMessage::Snapshot { session, map }) = reply else {
            panic!("expected snapshot");
        };
        assert!(session.is_some());
        assert!(!map.layers.is_empty());

        let json = serde_json::to_value(WsMessage::Snapshot { session, map }).unwrap();
        assert_eq!(json["type"], "snapshot");
    }
}
