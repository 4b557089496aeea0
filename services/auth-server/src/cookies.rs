//! Cookie builders for the state and session cookies

use axum_extra::extract::cookie::{Cookie, SameSite};
use hextok_auth::{SESSION_COOKIE_MAX_AGE, SESSION_COOKIE_NAME, STATE_COOKIE_NAME, STATE_TTL};
use time::Duration;

/// The state cookie is only sent back to the `/oauth` routes.
const STATE_COOKIE_PATH: &str = "/oauth";

fn seconds(d: std::time::Duration) -> Duration {
    Duration::seconds(d.as_secs() as i64)
}

pub fn state_cookie(value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((STATE_COOKIE_NAME, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path(STATE_COOKIE_PATH)
        .max_age(seconds(STATE_TTL))
        .build()
}

/// Removal cookie for the state cookie.
pub fn clear_state_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((STATE_COOKIE_NAME, ""))
        .http_only(true)
        .secure(secure)
        .path(STATE_COOKIE_PATH)
        .max_age(Duration::ZERO)
        .build()
}

pub fn session_cookie(bearer_token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, bearer_token))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(seconds(SESSION_COOKIE_MAX_AGE))
        .build()
}

/// Removal cookie for the session cookie.
pub fn clear_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, ""))
        .http_only(true)
        .secure(secure)
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}
