//! WebSocket feed of combat events
//!
//! Browsers can't set headers on a websocket handshake, so the caller may
//! also be named with `?user_id=`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::{info, warn};

use super::{caller, combat_error_response, error_response, AppState};
use crate::broadcast::Subscription;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/ws/combat/{id}", get(ws_handler))
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub user_id: Option<String>,
}

/// Handle WebSocket upgrade for one combat session
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let user_id = match (caller(&headers), query.user_id) {
        (Ok(user_id), _) => user_id,
        (Err(_), Some(user_id)) if !user_id.trim().is_empty() => user_id,
        (Err(response), _) => return response,
    };

    let session = match state.combat.get(&id).await {
        Ok(session) => session,
        Err(e) => return combat_error_response(e),
    };
    if !session.is_user_in_combat(&user_id) {
        return error_response(StatusCode::FORBIDDEN, "you are not part of this combat");
    }

    let subscriber_id = uuid::Uuid::new_v4().to_string();
    let subscription = state.hub.subscribe(&id, &subscriber_id, Some(&user_id));

    ws.on_upgrade(move |socket| handle_socket(socket, subscription, id, user_id))
        .into_response()
}

/// Forward hub events until either side goes away
async fn handle_socket(
    mut socket: WebSocket,
    mut subscription: Subscription,
    combat_id: String,
    user_id: String,
) {
    info!(combat = %combat_id, user = %user_id, subscriber = %subscription.id(), "WebSocket connected");

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    // Hub dropped us, usually for falling behind
                    warn!(combat = %combat_id, user = %user_id, "Subscription closed by hub");
                    break;
                };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to encode combat event"),
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
    info!(combat = %combat_id, user = %user_id, "WebSocket disconnected");
}
