//! Chat handshake and room history handlers.
//!
//! Entering a room goes through the same check everywhere: the room key must
//! decode and the session principal must be one of its two participants.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::logging;
use crate::protocol::HistoryMessage;
use crate::room::{decode, RoomKey};
use crate::web::principal::SessionPrincipal;
use crate::web::state::SharedState;
use crate::web::utils::{api_error, escape_html, room_key_error};

const CHAT_PAGE: &str = include_str!("../../../web/chat.html");

#[derive(Deserialize)]
pub struct HandshakeQuery {
    room: String,
    with_user: String,
}

#[derive(Debug, Serialize)]
pub struct Handshake {
    pub room: RoomKey,
    pub viewer: String,
    pub other_participant: String,
    pub listing_id: String,
}

/// Decode `room` and confirm the principal may enter it with `with_user`.
fn admit(principal: &SessionPrincipal, query: &HandshakeQuery) -> Result<Handshake, Response> {
    let room = decode(&query.room).map_err(|e| room_key_error(&e))?;
    let other = room
        .other_participant(&principal.username)
        .map_err(|e| room_key_error(&e))?
        .to_string();
    if other != query.with_user {
        debug!(
            user = %logging::user_id(&principal.username),
            room = %logging::room_key(&room),
            "handshake with non-participant refused"
        );
        return Err(api_error(StatusCode::FORBIDDEN, "access denied"));
    }
    Ok(Handshake {
        listing_id: room.listing_id().to_string(),
        viewer: principal.username.clone(),
        other_participant: other,
        room,
    })
}

fn render_chat_page(handshake: &Handshake) -> String {
    CHAT_PAGE
        .replace("{{ROOM}}", &escape_html(&handshake.room.to_string()))
        .replace("{{VIEWER}}", &escape_html(&handshake.viewer))
        .replace("{{OTHER}}", &escape_html(&handshake.other_participant))
        .replace("{{LISTING}}", &escape_html(&handshake.listing_id))
}

pub async fn chat_page_handler(
    principal: SessionPrincipal,
    Query(query): Query<HandshakeQuery>,
) -> Response {
    match admit(&principal, &query) {
        Ok(handshake) => Html(render_chat_page(&handshake)).into_response(),
        Err(rejection) => rejection,
    }
}

pub async fn handshake_handler(
    principal: SessionPrincipal,
    Query(query): Query<HandshakeQuery>,
) -> Response {
    match admit(&principal, &query) {
        Ok(handshake) => (StatusCode::OK, axum::Json(handshake)).into_response(),
        Err(rejection) => rejection,
    }
}

pub async fn room_messages_handler(
    State(state): State<SharedState>,
    principal: SessionPrincipal,
    Path(room): Path<String>,
) -> Response {
    let room = match decode(&room) {
        Ok(room) => room,
        Err(e) => return room_key_error(&e),
    };
    if let Err(e) = room.other_participant(&principal.username) {
        return room_key_error(&e);
    }

    match state.log.find_by_room(&room).await {
        Ok(messages) => {
            let json: Vec<HistoryMessage> = messages.into_iter().map(HistoryMessage::from).collect();
            (StatusCode::OK, axum::Json(json)).into_response()
        }
        Err(e) => {
            warn!(room = %logging::room_key(&room), error = %e, "history read failed");
            api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(name: &str) -> SessionPrincipal {
        SessionPrincipal {
            username: name.to_string(),
            role: "user".to_string(),
        }
    }

    fn query(room: &str, with_user: &str) -> HandshakeQuery {
        HandshakeQuery {
            room: room.to_string(),
            with_user: with_user.to_string(),
        }
    }

    #[test]
    fn participant_is_admitted() {
        let handshake = admit(&principal("bob"), &query("L17_alice_bob", "alice")).unwrap();
        assert_eq!(handshake.other_participant, "alice");
        assert_eq!(handshake.listing_id, "L17");
        assert_eq!(handshake.viewer, "bob");
    }

    #[test]
    fn outsider_is_forbidden() {
        let rejection = admit(&principal("carol"), &query("L17_alice_bob", "alice")).unwrap_err();
        assert_eq!(rejection.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn wrong_counterpart_is_forbidden() {
        let rejection = admit(&principal("alice"), &query("L17_alice_bob", "carol")).unwrap_err();
        assert_eq!(rejection.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn malformed_key_is_bad_request() {
        let rejection = admit(&principal("alice"), &query("L17_alice", "bob")).unwrap_err();
        assert_eq!(rejection.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn page_escapes_filled_values() {
        let handshake = admit(&principal("alice"), &query("L<1>_alice_bob", "bob")).unwrap();
        let page = render_chat_page(&handshake);
        assert!(page.contains("L&lt;1&gt;_alice_bob"));
        assert!(!page.contains("{{ROOM}}"));
        assert!(!page.contains("{{VIEWER}}"));
    }
}
