//! Native app login: start, callback completion, and handoff exchange
//!
//! Failures after the provider redirect cannot be shown by the in-app
//! browser, so the callback answers every mobile outcome with a 302 to the
//! app's deep link, carrying either the handoff token or an error code.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;
use hextok_auth::SESSION_COOKIE_MAX_AGE;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::app::{AppState, found};
use crate::cookies;
use crate::error::ApiError;
use crate::login;
use crate::metrics;

#[derive(Debug, Deserialize)]
pub struct StartParams {
    pub redirect_uri: Option<String>,
    pub state: Option<String>,
}

/// GET /oauth/mobile/start/github: validate the app's deep link and redirect
/// to the provider with the app's state marked as mobile. No cookie is set.
pub async fn start(
    State(app): State<AppState>,
    Query(params): Query<StartParams>,
) -> Result<Response, ApiError> {
    let url = app.mobile.start(
        &app.oauth,
        params.redirect_uri.as_deref(),
        params.state.as_deref(),
        &app.config.callback_url(),
    )?;
    Ok(found(&url))
}

/// Mobile branch of the shared callback.
pub async fn complete(
    app: &AppState,
    code: Option<&str>,
    client_state: &str,
    provider_error: Option<&str>,
) -> Response {
    let Some(code) = code.filter(|c| !c.is_empty()) else {
        debug!(provider_error, "mobile callback without code");
        metrics::record_login("mobile", "bad_request");
        let reason = provider_error_code(provider_error);
        return found(
            &app
                .mobile
                .error_link(reason, "Authorization was not completed"),
        );
    };

    let session = match login::complete(app, code).await {
        Ok(session) => session,
        Err(failure) => {
            warn!(stage = failure.code(), "mobile login failed");
            metrics::record_login("mobile", failure.outcome());
            return found(&app.mobile.error_link(failure.code(), failure.description()));
        }
    };

    let handoff = app.mobile.handoff(&session);
    match app.mobile.success_link(&handoff, client_state) {
        Ok(link) => {
            metrics::record_login("mobile", "success");
            found(&link)
        }
        Err(e) => {
            error!(error = %e, session_id = session.session_id, "failed to encode handoff token");
            metrics::record_login("mobile", "storage_error");
            found(
                &app
                    .mobile
                    .error_link("session_creation", "Failed to create session"),
            )
        }
    }
}

/// Deep link code for a callback without `code`. Provider error text is
/// never forwarded as-is.
fn provider_error_code(provider_error: Option<&str>) -> &'static str {
    match provider_error {
        Some("access_denied") => "access_denied",
        Some(_) => "provider_error",
        None => "missing_code",
    }
}

#[derive(Debug, Deserialize)]
pub struct ExchangeRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExchangeResponse {
    /// Session bearer token.
    pub token: String,
    /// Seconds the session cookie is kept by browsers.
    pub expires_in: u64,
    pub user_id: i64,
    pub session_id: i64,
}

/// POST /oauth/mobile/exchange: redeem a handoff token for the session
/// bearer token. The session cookie is set as well for clients with a jar.
pub async fn exchange(
    State(app): State<AppState>,
    jar: CookieJar,
    body: Result<Json<ExchangeRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<ExchangeResponse>), ApiError> {
    let Json(body) = body.map_err(|e| {
        debug!(error = %e, "handoff exchange body rejected");
        ApiError::BadRequest("invalid request body".into())
    })?;
    if body.token.is_empty() {
        return Err(ApiError::BadRequest("token is required".into()));
    }

    let redeemed = app.mobile.exchange(&body.token).await?;

    let jar = jar.add(cookies::session_cookie(
        redeemed.bearer_token.clone(),
        app.config.server.secure_cookies,
    ));
    Ok((
        jar,
        Json(ExchangeResponse {
            token: redeemed.bearer_token,
            expires_in: SESSION_COOKIE_MAX_AGE.as_secs(),
            user_id: redeemed.principal.user_id,
            session_id: redeemed.principal.session_id,
        }),
    ))
}
