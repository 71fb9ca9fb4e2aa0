//! Chat connection wire protocol.
//!
//! Frames are JSON objects tagged by `"event"`. Clients send `join_room` and
//! `chat_message`; the server sends `load_history` and `receive_message`.
//! There are no other frame types.

use serde::{Deserialize, Serialize};

use crate::storage::Message;

/// Sender id used for notices addressed to a single connection. Contains the
/// room key delimiter, so it can never collide with a real participant.
pub const SYSTEM_SENDER: &str = "_system";

/// Frames accepted from a connected client.
///
/// `room` stays a raw string here so a malformed key can be reported back to
/// the sender instead of failing the whole frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinRoom {
        room: String,
    },
    ChatMessage {
        room: String,
        sender: String,
        message: String,
    },
}

/// Frames pushed to a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    LoadHistory { messages: Vec<HistoryMessage> },
    ReceiveMessage { sender: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HistoryMessage {
    pub sender: String,
    pub message: String,
    pub created_at: u64,
}

impl From<Message> for HistoryMessage {
    fn from(m: Message) -> Self {
        Self {
            sender: m.sender,
            message: m.body,
            created_at: m.created_at,
        }
    }
}

impl ServerEvent {
    pub fn history(messages: Vec<Message>) -> Self {
        ServerEvent::LoadHistory {
            messages: messages.into_iter().map(HistoryMessage::from).collect(),
        }
    }

    /// A notice delivered only to the connection it concerns.
    pub fn notice(text: impl Into<String>) -> Self {
        ServerEvent::ReceiveMessage {
            sender: SYSTEM_SENDER.to_string(),
            message: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_parse() {
        let join: ClientEvent =
            serde_json::from_str(r#"{"event":"join_room","room":"L1_alice_bob"}"#).unwrap();
        assert_eq!(
            join,
            ClientEvent::JoinRoom {
                room: "L1_alice_bob".to_string()
            }
        );

        let chat: ClientEvent = serde_json::from_str(
            r#"{"event":"chat_message","room":"L1_alice_bob","sender":"alice","message":"hi"}"#,
        )
        .unwrap();
        assert!(matches!(chat, ClientEvent::ChatMessage { ref message, .. } if message == "hi"));
    }

    #[test]
    fn unknown_frames_are_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"leave_room","room":"x"}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>(r#"{"room":"x"}"#).is_err());
    }

    #[test]
    fn server_frames_serialize_with_event_tag() {
        let json = serde_json::to_value(ServerEvent::ReceiveMessage {
            sender: "bob".to_string(),
            message: "hello".to_string(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "receive_message", "sender": "bob", "message": "hello"})
        );

        let json = serde_json::to_value(ServerEvent::LoadHistory { messages: vec![] }).unwrap();
        assert_eq!(json, serde_json::json!({"event": "load_history", "messages": []}));
    }

    #[test]
    fn notices_come_from_system_sender() {
        match ServerEvent::notice("nope") {
            ServerEvent::ReceiveMessage { sender, message } => {
                assert_eq!(sender, SYSTEM_SENDER);
                assert_eq!(message, "nope");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(crate::room::encode("L1", SYSTEM_SENDER, "bob").is_err());
    }
}
