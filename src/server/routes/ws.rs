//! Push channel over WebSocket.
//!
//! On connect the client receives a welcome message and the current listing,
//! then every notification as a JSON text frame. Inbound text frames are
//! acknowledged and otherwise ignored.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde::Serialize;
use serde_json::json;

use crate::notifier::{Notification, Observer};
use crate::server::AppContext;

const WELCOME: &str = "Connected to Vid2Audio WebSocket";

/// GET <push_path> -- upgrade to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(ctx): State<AppContext>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn handle_socket(mut socket: WebSocket, ctx: AppContext) {
    let mut observer = ctx.notifier.attach();
    tracing::info!(observer_id = %observer.id(), "WebSocket client connected");

    let welcome = json!({ "type": "connection", "message": WELCOME });
    let initial = Notification::QueueUpdate {
        queue: ctx.notifier.snapshot().as_ref().clone(),
    };
    if !send_json(&mut socket, &welcome).await || !send_json(&mut socket, &initial).await {
        return;
    }

    relay(&mut socket, &mut observer).await;
    tracing::info!(observer_id = %observer.id(), "WebSocket client disconnected");
}

async fn relay(socket: &mut WebSocket, observer: &mut Observer) {
    loop {
        tokio::select! {
            next = observer.recv() => {
                let Some(notification) = next else {
                    tracing::debug!(observer_id = %observer.id(), "Observer pruned, closing socket");
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                };
                if !send_json(socket, notification.as_ref()).await {
                    return;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!(observer_id = %observer.id(), "WebSocket message: {}", text.as_str());
                        let ack = json!({ "type": "ack", "received": text.as_str() });
                        if !send_json(socket, &ack).await {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(observer_id = %observer.id(), "WebSocket error: {}", e);
                        return;
                    }
                }
            }
        }
    }
}

/// Returns false once the socket can no longer be written to.
async fn send_json<T: Serialize + ?Sized>(socket: &mut WebSocket, value: &T) -> bool {
    let text = match serde_json::to_string(value) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Failed to encode WebSocket message: {}", e);
            return true;
        }
    };
    socket.send(Message::Text(text.into())).await.is_ok()
}
