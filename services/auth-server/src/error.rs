//! HTTP error responses
//!
//! Every handler failure becomes an `ApiError`, rendered as
//! `{"error": "<message>"}`. Authentication failures use fixed messages so
//! the response never reveals which check failed. Upstream and storage
//! details are logged here and replaced by a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid state")]
    InvalidState,

    #[error("invalid handoff token")]
    InvalidHandoff,

    #[error("not found")]
    NotFound,

    #[error("upstream provider error")]
    Upstream,

    #[error("internal error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized | ApiError::InvalidHandoff => StatusCode::UNAUTHORIZED,
            ApiError::InvalidState => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Upstream => StatusCode::BAD_GATEWAY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<hextok_auth::Error> for ApiError {
    fn from(err: hextok_auth::Error) -> Self {
        use hextok_auth::Error;
        if err.is_upstream() {
            warn!(error = %err, "identity provider request failed");
            return ApiError::Upstream;
        }
        match err {
            Error::InvalidState => ApiError::InvalidState,
            Error::InvalidSession => ApiError::Unauthorized,
            Error::InvalidHandoff => ApiError::InvalidHandoff,
            Error::Malformed(_) => ApiError::BadRequest("malformed token".into()),
            Error::MissingParameter(name) => ApiError::BadRequest(format!("missing {name}")),
            Error::InvalidRedirect(_) => ApiError::BadRequest(
                "invalid redirect_uri - must use the app's custom scheme".into(),
            ),
            Error::Store(e) => {
                error!(error = %e, "storage operation failed");
                ApiError::Internal
            }
            e => {
                error!(error = %e, "unclassified auth error");
                ApiError::Internal
            }
        }
    }
}

impl From<store::Error> for ApiError {
    fn from(err: store::Error) -> Self {
        hextok_auth::Error::Store(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            serde_json::json!({ "error": self.to_string() }).to_string(),
        )
            .into_response()
    }
}
