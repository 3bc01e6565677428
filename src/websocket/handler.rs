use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};

use crate::models::{Envelope, ErrorResponse, SyncError};
use crate::services::auth_service::authenticate;
use crate::ws::{Client, ClientId, DisconnectReason, HubHandle, Identity};
use crate::AppState;
use super::router::handle_text;
use super::session::Session;

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// Runs the standard disconnect path when the connection task ends, however
/// it ends. The hub ignores the second call if one already went through.
struct DeferDisconnect {
    hub: HubHandle,
    client_id: ClientId,
}

impl Drop for DeferDisconnect {
    fn drop(&mut self) {
        self.hub.disconnect(self.client_id, DisconnectReason::TransportError);
    }
}

/// WebSocket handler. The handshake is refused unless the caller carries a valid identity.
pub async fn websocket_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let caller = match authenticate(&headers, params.token.as_deref(), state.auth_jwt_secret.as_deref()) {
        Ok(caller) => caller,
        Err(e) => {
            warn!("WebSocket handshake rejected: {}", e);
            return ErrorResponse::reply(StatusCode::UNAUTHORIZED, "A verified identity is required").into_response();
        }
    };

    info!("New WebSocket connection attempt from user {}", caller.identity.user_id);
    ws.on_upgrade(move |socket| handle_socket(socket, caller.identity, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, identity: Identity, state: AppState) {
    let settings = state.settings.clone();

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope>(settings.outbound_buffer);
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let client = Client::new(identity.clone(), outbound_tx.clone(), shutdown_tx);
    let client_id = client.id;
    state.hub.register(client);

    let _defer_disconnect = DeferDisconnect { hub: state.hub.clone(), client_id };

    info!("WebSocket connection established for user {} with client_id: {}", identity.user_id, client_id);

    // Split the socket into sender and receiver
    let (mut sender, mut receiver) = socket.split();

    // Writer: drains the outbound queue and keeps the connection alive.
    // Ends when the hub drops the client or a write fails or stalls.
    let mut send_task = tokio::spawn(async move {
        let mut ping = interval(settings.ping_interval);
        ping.tick().await;

        let reason = loop {
            let frame = tokio::select! {
                queued = outbound_rx.recv() => match queued {
                    Some(envelope) => Message::Text(envelope.to_text()),
                    None => break DisconnectReason::Closed,
                },
                _ = ping.tick() => Message::Ping(Vec::new()),
                _ = &mut shutdown_rx => break DisconnectReason::Closed,
            };

            match timeout(settings.send_timeout, sender.send(frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("Write to client {} failed: {}", client_id, e);
                    break DisconnectReason::TransportError;
                }
                Err(_) => {
                    warn!("Write to client {} timed out", client_id);
                    break DisconnectReason::DeliveryFailed;
                }
            }
        };

        let _ = timeout(settings.send_timeout, sender.close()).await;
        reason
    });

    let session = Session {
        client_id,
        identity,
        hub: state.hub.clone(),
        store: state.store.clone(),
        outbound: outbound_tx,
    };
    let read_timeout = state.settings.read_timeout;

    // Reader: every inbound frame counts as traffic, text frames go to the router
    let mut recv_task = tokio::spawn(async move {
        loop {
            let frame = match timeout(read_timeout, receiver.next()).await {
                Err(_) => break DisconnectReason::ReadTimeout,
                Ok(None) => break DisconnectReason::Closed,
                Ok(Some(Err(e))) => {
                    debug!("Read from client {} failed: {}", session.client_id, e);
                    break DisconnectReason::TransportError;
                }
                Ok(Some(Ok(frame))) => frame,
            };

            session.hub.touch(session.client_id);

            match frame {
                Message::Text(text) => {
                    if handle_text(&session, &text).await.is_err() {
                        break DisconnectReason::Closed;
                    }
                }
                Message::Binary(_) => {
                    let err = SyncError::MalformedMessage("binary frames are not supported".to_string());
                    if session.reply_error(&err, None).await.is_err() {
                        break DisconnectReason::Closed;
                    }
                }
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(_) => break DisconnectReason::Closed,
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    let reason = tokio::select! {
        reason = (&mut send_task) => {
            recv_task.abort();
            reason.unwrap_or(DisconnectReason::TransportError)
        }
        reason = (&mut recv_task) => {
            send_task.abort();
            reason.unwrap_or(DisconnectReason::TransportError)
        }
    };

    state.hub.disconnect(client_id, reason);
    info!("WebSocket connection terminated for client {}: {}", client_id, reason);
}
