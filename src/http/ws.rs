use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::http::AuthUser;
use crate::realtime::ClientEvent;
use crate::AppState;

pub async fn connect(
    auth: AuthUser,
    State(state): State<AppState>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| serve_socket(socket, state, auth.user_id))
}

/// Presence starts at the first `online` event and ends when the socket closes.
async fn serve_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (sink, mut stream) = socket.split();
    let mut sink = Some(sink);
    let mut live: Option<(Uuid, JoinHandle<()>)> = None;

    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                debug!(error = %err, user_id = %user_id, "websocket receive failed");
                break;
            }
        };

        let event = match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => event,
            Err(err) => {
                debug!(error = %err, user_id = %user_id, "ignoring malformed websocket frame");
                continue;
            }
        };

        match event {
            ClientEvent::Online => {
                let Some(mut sink) = sink.take() else {
                    continue;
                };

                let (connection_id, mut events) = state.presence.connect(user_id).await;
                debug!(user_id = %user_id, connection_id = %connection_id, "user online");

                let forward = tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        let payload = match serde_json::to_string(&event) {
                            Ok(payload) => payload,
                            Err(err) => {
                                warn!(error = %err, "failed to encode realtime event");
                                continue;
                            }
                        };
                        if sink.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                });
                live = Some((connection_id, forward));
            }
        }
    }

    if let Some((connection_id, forward)) = live {
        forward.abort();
        let removed = state.presence.disconnect(user_id, connection_id).await;
        debug!(user_id = %user_id, connection_id = %connection_id, removed, "user offline");
    }
}
