//! WebSocket handler for the update channel.
//!
//! Gates upgrades on the extension's path, registers accepted sockets with
//! the hub and forwards update signals to them.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use crxd_protocol::{ClientMessage, UPDATE_CONTENT};
use tokio::sync::mpsc;

use crate::ChannelState;
use crate::session::{ConnectionId, HubEvent, Signal};

/// Handle every request reaching the server.
///
/// Only an upgrade on the extension's path becomes a connection. Anything
/// else gets an empty response and the transport is closed.
pub(crate) async fn upgrade_handler(
    State(state): State<Arc<ChannelState>>,
    uri: Uri,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if uri.path() != state.upgrade_path {
        tracing::debug!(path = uri.path(), "Rejected request on unknown path");
        return reject();
    }

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, state)),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected non-upgrade request");
            reject()
        }
    }
}

/// Empty response that closes the connection.
fn reject() -> Response {
    (StatusCode::NOT_FOUND, [(header::CONNECTION, "close")]).into_response()
}

/// Handle an established WebSocket connection.
async fn handle_socket(mut socket: WebSocket, state: Arc<ChannelState>) {
    let id = state.next_connection_id();
    let (outbox, mut inbox) = mpsc::unbounded_channel();

    if state.hub.send(HubEvent::Connected { id, outbox }).is_err() {
        return;
    }

    // Set once the hub drops our outbox because a newer client took over.
    let mut abandoned = false;
    let mut closing = state.closing.clone();

    loop {
        tokio::select! {
            signal = inbox.recv(), if !abandoned => {
                match signal {
                    Some(Signal::Update) => {
                        if socket.send(Message::Text(UPDATE_CONTENT.into())).await.is_err() {
                            break;
                        }
                    }
                    None => abandoned = true,
                }
            }
            _ = closing.changed() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Text(text))) => handle_client_text(id, text.as_str()),
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = state.hub.send(HubEvent::Disconnected(id));
}

/// Inspect an inbound text frame. Pings and garbage alike cause no action.
fn handle_client_text(id: ConnectionId, text: &str) {
    match ClientMessage::parse(text) {
        Some(ClientMessage::Ping) => tracing::trace!(connection = id, "Ping"),
        None => tracing::debug!(connection = id, "Ignored malformed client message"),
    }
}
