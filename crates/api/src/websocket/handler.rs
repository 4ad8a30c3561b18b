//! WebSocket handler for Axum
//!
//! Upgrades the connection, optionally authenticates staff via `?token=`, and
//! feeds inbound events to the gateway one at a time.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{auth::StaffClaims, state::AppState};

use super::{
    connection::Connection,
    events::{ClientEvent, ServerEvent},
    gateway,
};

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    #[serde(default)]
    token: Option<String>,
}

/// WebSocket handler - upgrades HTTP connection to WebSocket.
///
/// Without a token the connection starts anonymous and registers by event.
/// A token that fails validation is refused outright.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
) -> Result<Response, StatusCode> {
    let claims = match params.token.as_deref().filter(|t| !t.is_empty()) {
        None => None,
        Some(token) => match app_state.jwt.validate_token(token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket auth failed: invalid token");
                return Err(StatusCode::UNAUTHORIZED);
            }
        },
    };

    tracing::info!(
        staff_id = ?claims.as_ref().map(|c| c.sub.as_str()),
        "WebSocket connection upgrade requested"
    );

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, claims, app_state)))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, claims: Option<StaffClaims>, app_state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for sending events to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let ws_state = app_state.ws_state.clone();
    let conn = ws_state.add_connection(Connection::new(tx)).await;
    let connection_id = conn.connection_id;

    conn.notify(ServerEvent::Connected { connection_id });

    if let Some(claims) = claims {
        if let Err(e) = gateway::register(
            &app_state,
            &conn,
            claims.role,
            Some(claims.sub),
            Some(claims.name),
        )
        .await
        {
            tracing::error!(error = %e, connection_id = %connection_id, "Failed to pre-register staff connection");
        }
    }

    // Spawn task to send messages to client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    // Events from one connection are handled strictly in arrival order
    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(error = ?e, connection_id = %connection_id, "WebSocket receive error");
                break;
            }
        };

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => gateway::dispatch(&app_state, &conn, event).await,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        connection_id = %connection_id,
                        "Failed to parse client event"
                    );
                    conn.notify(ServerEvent::Error {
                        message: "Invalid event format".to_string(),
                    });
                }
            },
            Message::Close(_) => {
                tracing::info!(connection_id = %connection_id, "WebSocket close frame received");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Axum handles ping/pong automatically
            }
            Message::Binary(_) => {}
        }
    }

    // Calls this connection was handling stay as they are
    tracing::info!(connection_id = %connection_id, "WebSocket connection closing");
    ws_state.remove_connection(&connection_id).await;

    send_task.abort();
}
