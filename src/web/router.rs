//! Axum router construction.

use axum::routing::{get, post};
use axum::Router;

use crate::web::handlers;
use crate::web::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // Chat
        .route("/chat", get(handlers::chat::chat_page_handler))
        .route("/api/chat/handshake", get(handlers::chat::handshake_handler))
        .route(
            "/api/rooms/:room/messages",
            get(handlers::chat::room_messages_handler),
        )
        .route("/ws", get(handlers::websocket::ws_handler))
        // Inbox
        .route("/api/inbox", get(handlers::inbox::inbox_handler))
        // Listings
        .route("/api/listings", post(handlers::listings::create_listing_handler))
        // Health
        .route("/api/health", get(handlers::health::health_handler))
        .with_state(state)
}
