//! WebSocket upgrade and chat connection handling.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc::{self, WeakSender};
use tracing::{debug, info, warn};

use crate::logging;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::room::{decode, RoomKey, RoomKeyError};
use crate::session::ConnectionId;
use crate::web::config::{MAX_WS_CONNECTIONS, OUTBOX_CAPACITY};
use crate::web::principal::SessionPrincipal;
use crate::web::state::SharedState;
use crate::web::utils::api_error;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    principal: SessionPrincipal,
) -> Response {
    // Check connection limit before upgrading
    if state.sessions.connection_count().await >= MAX_WS_CONNECTIONS {
        return api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("too many WebSocket connections (max {MAX_WS_CONNECTIONS})"),
        );
    }

    ws.on_upgrade(move |socket| ws_connection(socket, state, principal))
        .into_response()
}

async fn ws_connection(mut socket: WebSocket, state: SharedState, principal: SessionPrincipal) {
    let (tx, mut rx) = mpsc::channel(OUTBOX_CAPACITY);
    // Only the session holds the outbox; once it drops the connection (slow
    // reader) the queue closes and this loop ends.
    let notices = tx.downgrade();
    let conn = state.sessions.connect(tx).await;
    debug!(conn, user = %logging::user_id(&principal.username), "chat connection opened");

    loop {
        tokio::select! {
            // Forward room events to the client
            event = rx.recv() => {
                let Some(event) = event else {
                    debug!(conn, "outbox closed by session");
                    break;
                };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if socket.send(WsMessage::Text(json)).await.is_err() {
                            break; // client disconnected
                        }
                    }
                    Err(e) => warn!(conn, error = %e, "failed to encode server event"),
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_frame(&state, conn, &principal, &notices, &text).await;
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = socket.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    state.sessions.disconnect_all(conn).await;
}

/// Notices go to this connection only.
fn notify(tx: &WeakSender<ServerEvent>, text: impl Into<String>) {
    if let Some(tx) = tx.upgrade() {
        let _ = tx.try_send(ServerEvent::notice(text));
    }
}

/// Decode `raw` and check that `principal` is one of its participants.
fn admitted_room(raw: &str, principal: &SessionPrincipal) -> Result<RoomKey, RoomKeyError> {
    let room = decode(raw)?;
    room.other_participant(&principal.username)?;
    Ok(room)
}

async fn handle_frame(
    state: &SharedState,
    conn: ConnectionId,
    principal: &SessionPrincipal,
    tx: &WeakSender<ServerEvent>,
    text: &str,
) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(conn, error = %e, "unrecognised client frame");
            notify(tx, "unrecognised event");
            return;
        }
    };

    match event {
        ClientEvent::JoinRoom { room } => {
            let room = match admitted_room(&room, principal) {
                Ok(room) => room,
                Err(RoomKeyError::NotAParticipant { .. }) => {
                    warn!(conn, user = %logging::user_id(&principal.username), "join refused");
                    notify(tx, "access denied");
                    return;
                }
                Err(e) => {
                    notify(tx, e.to_string());
                    return;
                }
            };
            match state.sessions.join(conn, &room).await {
                Ok(_) => info!(
                    conn,
                    user = %logging::user_id(&principal.username),
                    room = %logging::room_key(&room),
                    "joined room"
                ),
                Err(e) => notify(tx, e.to_string()),
            }
        }
        ClientEvent::ChatMessage {
            room,
            sender,
            message,
        } => {
            if sender != principal.username {
                warn!(conn, user = %logging::user_id(&principal.username), "sender mismatch");
                notify(tx, "sender does not match session user");
                return;
            }
            let room = match decode(&room) {
                Ok(room) => room,
                Err(e) => {
                    notify(tx, e.to_string());
                    return;
                }
            };
            if let Err(e) = state.sessions.send(conn, &room, &sender, &message).await {
                notify(tx, e.to_string());
            }
        }
    }
}
