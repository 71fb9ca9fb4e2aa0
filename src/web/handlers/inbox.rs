//! Conversation inbox for the session principal.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::inbox::project_inbox;
use crate::logging;
use crate::web::principal::SessionPrincipal;
use crate::web::state::SharedState;
use crate::web::utils::api_error;

pub async fn inbox_handler(State(state): State<SharedState>, principal: SessionPrincipal) -> Response {
    match project_inbox(&state.log, &principal.username).await {
        Ok(entries) => (StatusCode::OK, axum::Json(entries)).into_response(),
        Err(e) => {
            warn!(user = %logging::user_id(&principal.username), error = %e, "inbox unavailable");
            api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}
