//! Authentication core for hextok
//!
//! Login flow, web:
//! 1. `StateCodec::issue()` signs a fresh nonce; the value goes into a cookie
//!    and the nonce into the provider authorize URL
//! 2. The provider redirects back; `StateCodec::verify()` checks the cookie
//!    against the returned `state`
//! 3. `OAuthClient::exchange_code()` then `OAuthClient::fetch_profile()`
//! 4. `AccountResolver::resolve()` finds or creates the local user
//! 5. `SessionIssuer::create_session()` mints a session; its bearer token is
//!    set as the session cookie
//!
//! Mobile clients replace steps 1-2 with a client-supplied state carrying
//! [`MOBILE_STATE_PREFIX`], and step 5's cookie with a [`HandoffToken`] that
//! `MobileBroker::exchange()` later trades for the same bearer token.
//!
//! Every protected request goes through `SessionVerifier::verify()`.

pub mod accounts;
pub mod constants;
pub mod error;
pub mod mobile;
pub mod oauth;
pub mod session;
pub mod state;

pub use accounts::{AccountResolver, ResolvedAccount};
pub use constants::*;
pub use error::{Error, Result};
pub use mobile::{HandoffToken, MobileBroker, RedeemedHandoff};
pub use oauth::{OAuthClient, ProviderEndpoints, ProviderProfile};
pub use session::{
    IssuedSession, Principal, SessionIssuer, SessionVerifier, decode_bearer_token,
    encode_bearer_token, hash_secret,
};
pub use state::StateCodec;

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
