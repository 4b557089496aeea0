//! Session authentication middleware
//!
//! Token extraction order:
//! 1. `Authorization: Bearer <token>`
//! 2. a raw `Authorization` header value
//! 3. the `hextok_session` cookie
//!
//! On success the verified `Principal` is inserted as a request extension;
//! handlers behind this layer read it with `Extension<Principal>` and never
//! re-verify. Every rejection is the same 401 body.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;
use hextok_auth::SESSION_COOKIE_NAME;
use tracing::debug;

use crate::app::AppState;
use crate::error::ApiError;
use crate::metrics;

/// Pull the session bearer token from the request, if any.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    let token = match header {
        Some(value) => value.strip_prefix("Bearer ").unwrap_or(value).trim().to_string(),
        None => CookieJar::from_headers(headers)
            .get(SESSION_COOKIE_NAME)?
            .value()
            .to_string(),
    };
    (!token.is_empty()).then_some(token)
}

pub async fn require_session(
    State(app): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = extract_token(request.headers()) else {
        debug!("request rejected: no session token");
        metrics::record_session_check("missing");
        return Err(ApiError::Unauthorized);
    };

    match app.verifier.verify(&token).await {
        Ok(principal) => {
            metrics::record_session_check("authenticated");
            request.extensions_mut().insert(principal);
            Ok(next.run(request).await)
        }
        Err(hextok_auth::Error::InvalidSession) => {
            metrics::record_session_check("rejected");
            Err(ApiError::Unauthorized)
        }
        Err(e) => {
            metrics::record_session_check("error");
            Err(e.into())
        }
    }
}
