//! Endpoints for the authenticated caller. All of them sit behind
//! `auth::require_session`.

use axum::Extension;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use hextok_auth::Principal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Me {
    pub id: i64,
    pub username: String,
}

/// GET /oauth/me
pub async fn me(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Me>, ApiError> {
    let user = app
        .users
        .get_user(principal.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(Me {
        id: user.id,
        username: user.username,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionView {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub last_verified_at: DateTime<Utc>,
    /// True for the session that made this request.
    pub current: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionList {
    pub sessions: Vec<SessionView>,
}

/// GET /oauth/sessions: the caller's sessions. Secret digests are never
/// returned.
pub async fn list_sessions(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<SessionList>, ApiError> {
    let sessions = app
        .sessions
        .list_sessions_by_user(principal.user_id)
        .await?
        .into_iter()
        .map(|s| SessionView {
            id: s.id,
            created_at: s.created_at,
            last_verified_at: s.last_verified_at,
            current: s.id == principal.session_id,
        })
        .collect();
    Ok(Json(SessionList { sessions }))
}

/// DELETE /oauth/sessions/{id}: revoke one of the caller's sessions. Another
/// user's session is reported as not found.
pub async fn revoke_session(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let owned = app
        .sessions
        .get_session(id)
        .await?
        .is_some_and(|s| s.user_id == principal.user_id);
    if !owned {
        return Err(ApiError::NotFound);
    }

    app.sessions.delete_session(id).await?;
    info!(
        user_id = principal.user_id,
        session_id = id,
        "session revoked by owner"
    );
    Ok(StatusCode::NO_CONTENT)
}
