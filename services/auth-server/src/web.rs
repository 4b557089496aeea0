//! Browser login, the shared provider callback, and logout

use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::CookieJar;
use hextok_auth::{STATE_COOKIE_NAME, StateCodec};
use serde::Deserialize;
use tracing::{info, warn};

use crate::app::{AppState, found};
use crate::auth::extract_token;
use crate::cookies;
use crate::error::ApiError;
use crate::metrics;
use crate::{login, mobile};

/// GET /oauth/start/github: set a signed state cookie and redirect to the
/// provider with the matching nonce.
pub async fn start(State(app): State<AppState>, jar: CookieJar) -> Response {
    let nonce = StateCodec::generate_nonce();
    let signed = app.states.issue(&nonce);
    let url = app
        .oauth
        .authorization_url(&nonce, &app.config.callback_url());

    let jar = jar.add(cookies::state_cookie(
        signed,
        app.config.server.secure_cookies,
    ));
    (jar, found(&url)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when the user denies access.
    pub error: Option<String>,
}

/// GET /oauth/callback/github: one provider callback for both flows. A state
/// carrying the mobile marker is routed to the mobile completion; anything
/// else is a browser login.
pub async fn callback(
    State(app): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    let state = params.state.as_deref().unwrap_or_default();
    if let Some(client_state) = hextok_auth::mobile::client_state(state) {
        return mobile::complete(&app, params.code.as_deref(), client_state, params.error.as_deref())
            .await;
    }
    complete(&app, jar, params).await
}

async fn complete(app: &AppState, jar: CookieJar, params: CallbackParams) -> Response {
    let secure = app.config.server.secure_cookies;
    let signed = jar.get(STATE_COOKIE_NAME).map(|c| c.value().to_owned());
    // The state cookie is spent whatever happens next.
    let jar = jar.add(cookies::clear_state_cookie(secure));

    let code = params.code.filter(|c| !c.is_empty());
    let state = params.state.filter(|s| !s.is_empty());
    let (Some(code), Some(state)) = (code, state) else {
        metrics::record_login("web", "bad_request");
        return (jar, ApiError::BadRequest("missing code or state".into())).into_response();
    };

    if let Err(e) = app.states.verify(signed.as_deref(), &state) {
        metrics::record_login("web", "invalid_state");
        return (jar, ApiError::from(e)).into_response();
    }

    match login::complete(app, &code).await {
        Ok(session) => {
            metrics::record_login("web", "success");
            let jar = jar.add(cookies::session_cookie(session.bearer_token(), secure));
            (jar, found(&app.config.post_login_url())).into_response()
        }
        Err(failure) => {
            warn!(stage = failure.code(), "web login failed");
            metrics::record_login("web", failure.outcome());
            (jar, ApiError::from(failure)).into_response()
        }
    }
}

/// GET|POST /oauth/logout: revoke the presented session if it verifies and
/// always clear the session cookie. Never fails.
pub async fn logout(State(app): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = extract_token(&headers) {
        match app.verifier.revoke(&token).await {
            Ok(Some(principal)) => info!(
                user_id = principal.user_id,
                session_id = principal.session_id,
                "logged out"
            ),
            Ok(None) => info!("logout with no valid session"),
            Err(e) => warn!(error = %e, "logout could not revoke session"),
        }
    }

    let jar = CookieJar::new().add(cookies::clear_session_cookie(
        app.config.server.secure_cookies,
    ));
    (jar, Json(serde_json::json!({ "status": "logged_out" }))).into_response()
}
