//! Health check endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::web::state::SharedState;

pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let sessions = state.sessions.stats().await;
    let events = state.publisher.stats();

    let body = serde_json::json!({
        "status": "ok",
        "live_rooms": sessions.live_rooms,
        "live_connections": sessions.live_connections,
        "events_dropped": events.dropped,
    });
    (StatusCode::OK, axum::Json(body))
}
