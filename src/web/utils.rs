//! Shared utility functions for the web layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::room::RoomKeyError;

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, axum::Json(body)).into_response()
}

/// Map a room key error to its HTTP response: bad input is 400, a viewer who
/// is not in the room is 403.
pub fn room_key_error(e: &RoomKeyError) -> Response {
    match e {
        RoomKeyError::NotAParticipant { .. } => api_error(StatusCode::FORBIDDEN, "access denied"),
        RoomKeyError::InvalidIdentifier(_) | RoomKeyError::MalformedRoomKey(_) => {
            api_error(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

/// Escape text for HTML element content and double-quoted attributes.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<b onclick="x">Tom & 'Jerry'</b>"#),
            "&lt;b onclick=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
        assert_eq!(escape_html("alice"), "alice");
    }

    #[test]
    fn participant_errors_are_forbidden() {
        let denied = RoomKeyError::NotAParticipant {
            room: "L1_alice_bob".to_string(),
            viewer: "carol".to_string(),
        };
        assert_eq!(room_key_error(&denied).status(), StatusCode::FORBIDDEN);
        let malformed = RoomKeyError::MalformedRoomKey("x".to_string());
        assert_eq!(room_key_error(&malformed).status(), StatusCode::BAD_REQUEST);
    }
}
