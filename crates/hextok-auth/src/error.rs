//! Error types for the authentication core

/// Errors from state, session, provider and handoff operations.
///
/// `InvalidState`, `InvalidSession` and `InvalidHandoff` deliberately carry no
/// detail: the failing sub-check is logged at debug level and never returned.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid state")]
    InvalidState,

    #[error("invalid session")]
    InvalidSession,

    #[error("invalid handoff token")]
    InvalidHandoff,

    /// A token could not be decoded before any authentication took place.
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid redirect uri: {0}")]
    InvalidRedirect(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("profile fetch failed: {0}")]
    Profile(String),

    #[error("storage error: {0}")]
    Store(#[from] store::Error),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures caused by the identity provider rather than the caller.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::TokenExchange(_) | Error::Profile(_)
        )
    }
}
