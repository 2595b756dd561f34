//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::web::state::AppState;

/// Name of the cookie carrying the auth session id.
pub const SESSION_COOKIE: &str = "session";

/// Pulls the auth session id out of the `Cookie` header, if present.
pub fn session_id_from(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .filter(|id| !id.is_empty())
}

/// Middleware that validates the auth session cookie and resolves the caller's profile.
///
/// If valid, inserts the `Profile` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_session_id = session_id_from(req.headers())
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    let profile = state
        .accounts
        .validate_auth_session(&auth_session_id)
        .await
        .map_err(|e| {
            warn!("Failed to validate auth session: {:?}", e);
            StatusCode::UNAUTHORIZED
        })?;

    req.extensions_mut().insert(profile);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn finds_session_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=abc123; lang=id"),
        );
        assert_eq!(session_id_from(&headers), Some("abc123"));
    }

    #[test]
    fn cookie_name_must_match_exactly() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("sessions=zzz; session=abc123"));
        assert_eq!(session_id_from(&headers), Some("abc123"));
    }

    #[test]
    fn empty_or_missing_session_is_none() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id_from(&headers), None);
        headers.insert(header::COOKIE, HeaderValue::from_static("session="));
        assert_eq!(session_id_from(&headers), None);
    }
}
