//! Session principal extraction.
//!
//! Authentication happens upstream; by the time a request reaches this
//! service the auth layer has resolved the session and forwards the principal
//! in request headers. Requests without one are rejected with 401.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::Response;

use crate::web::config::{SESSION_ROLE_HEADER, SESSION_USER_HEADER};
use crate::web::utils::api_error;

const DEFAULT_ROLE: &str = "user";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPrincipal {
    pub username: String,
    pub role: String,
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SessionPrincipal {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let username = header_value(parts, SESSION_USER_HEADER)
            .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "no session principal"))?;
        let role = header_value(parts, SESSION_ROLE_HEADER).unwrap_or_else(|| DEFAULT_ROLE.to_string());
        Ok(Self { username, role })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(request: Request<()>) -> Result<SessionPrincipal, Response> {
        let (mut parts, _) = request.into_parts();
        SessionPrincipal::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_user_and_role_headers() {
        let request = Request::builder()
            .header(SESSION_USER_HEADER, "alice")
            .header(SESSION_ROLE_HEADER, "admin")
            .body(())
            .unwrap();
        let principal = extract(request).await.unwrap();
        assert_eq!(principal.username, "alice");
        assert_eq!(principal.role, "admin");
    }

    #[tokio::test]
    async fn role_defaults_to_user() {
        let request = Request::builder()
            .header(SESSION_USER_HEADER, "bob")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap().role, "user");
    }

    #[tokio::test]
    async fn missing_user_is_unauthorized() {
        let request = Request::builder()
            .header(SESSION_USER_HEADER, "  ")
            .body(())
            .unwrap();
        let rejection = extract(request).await.unwrap_err();
        assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
    }
}
