//! Provider round trips and account resolution shared by both login flows

use std::time::Instant;

use hextok_auth::IssuedSession;
use tracing::info;

use crate::app::AppState;
use crate::error::ApiError;
use crate::metrics;

/// The step at which a login failed. Mobile clients receive `code()` in the
/// error deep link; web clients receive the mapped `ApiError`.
#[derive(Debug)]
pub enum LoginFailure {
    TokenExchange(hextok_auth::Error),
    UserFetch(hextok_auth::Error),
    UserCreation(hextok_auth::Error),
    SessionCreation(hextok_auth::Error),
}

impl LoginFailure {
    pub fn code(&self) -> &'static str {
        match self {
            LoginFailure::TokenExchange(_) => "token_exchange",
            LoginFailure::UserFetch(_) => "user_fetch",
            LoginFailure::UserCreation(_) => "user_creation",
            LoginFailure::SessionCreation(_) => "session_creation",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            LoginFailure::TokenExchange(_) => "Failed to exchange code for token",
            LoginFailure::UserFetch(_) => "Failed to fetch user information",
            LoginFailure::UserCreation(_) => "Failed to create user",
            LoginFailure::SessionCreation(_) => "Failed to create session",
        }
    }

    /// Label for `auth_logins_total`.
    pub fn outcome(&self) -> &'static str {
        match self {
            LoginFailure::TokenExchange(_) | LoginFailure::UserFetch(_) => "provider_error",
            LoginFailure::UserCreation(_) | LoginFailure::SessionCreation(_) => "storage_error",
        }
    }

    pub fn into_inner(self) -> hextok_auth::Error {
        match self {
            LoginFailure::TokenExchange(e)
            | LoginFailure::UserFetch(e)
            | LoginFailure::UserCreation(e)
            | LoginFailure::SessionCreation(e) => e,
        }
    }
}

impl From<LoginFailure> for ApiError {
    fn from(failure: LoginFailure) -> Self {
        failure.into_inner().into()
    }
}

/// Exchange `code`, fetch the profile, find or create the user and mint a
/// session. Dropping the returned future (client disconnect) aborts any
/// in-flight provider request.
pub async fn complete(app: &AppState, code: &str) -> Result<IssuedSession, LoginFailure> {
    let started = Instant::now();
    let token = app.oauth.exchange_code(code).await;
    metrics::record_provider_call(
        "token_exchange",
        started.elapsed().as_secs_f64(),
        token.is_ok(),
    );
    let token = token.map_err(LoginFailure::TokenExchange)?;

    let started = Instant::now();
    let profile = app.oauth.fetch_profile(&token).await;
    metrics::record_provider_call("profile", started.elapsed().as_secs_f64(), profile.is_ok());
    let profile = profile.map_err(LoginFailure::UserFetch)?;

    let account = app
        .accounts
        .resolve(&profile, &token)
        .await
        .map_err(LoginFailure::UserCreation)?;

    let session = app
        .issuer
        .create_session(account.user_id)
        .await
        .map_err(LoginFailure::SessionCreation)?;

    info!(
        user_id = account.user_id,
        session_id = session.session_id,
        provider_user_id = %profile.provider_user_id,
        new_user = account.created,
        "login completed"
    );
    Ok(session)
}
