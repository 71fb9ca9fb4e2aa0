//! Shared application state.

use std::sync::Arc;

use crate::events::EventPublisher;
use crate::session::RoomSessions;
use crate::storage::ConversationLog;

pub struct AppState {
    pub log: ConversationLog,
    pub sessions: RoomSessions,
    pub publisher: EventPublisher,
    pub listing_topic: String,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(log: ConversationLog, publisher: EventPublisher, listing_topic: String) -> Self {
        Self {
            sessions: RoomSessions::new(log.clone()),
            log,
            publisher,
            listing_topic,
        }
    }
}
