//! Mobile login handoff
//!
//! Native clients cannot share a cookie jar with the in-app browser that runs
//! the provider redirect. Instead:
//! 1. The client starts login with its own `state` and a custom-scheme
//!    `redirect_uri`; the state goes to the provider prefixed with
//!    [`MOBILE_STATE_PREFIX`] so the shared callback can tell flows apart
//! 2. After login the callback redirects to the app's deep link with a
//!    short-lived [`HandoffToken`] and the client's original state
//! 3. The app POSTs the handoff token back and receives the session bearer
//!    token
//!
//! The handoff token is not signed. Redemption re-verifies the embedded
//! session secret against the session store, so a forged token yields nothing
//! its holder did not already possess.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE};
use base64::engine::DecodePaddingMode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::constants::MOBILE_STATE_PREFIX;
use crate::error::{Error, Result};
use crate::oauth::OAuthClient;
use crate::session::{IssuedSession, Principal, SessionVerifier, encode_bearer_token};
use crate::unix_now;

/// URL-safe alphabet that accepts handoff tokens with or without padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Prefix a client state so the callback routes it to the mobile flow.
pub fn mark_state(client_state: &str) -> String {
    format!("{MOBILE_STATE_PREFIX}{client_state}")
}

/// The client's original state if `state` belongs to a mobile login.
pub fn client_state(state: &str) -> Option<&str> {
    state.strip_prefix(MOBILE_STATE_PREFIX)
}

/// Self-contained session handoff carried through the deep link.
///
/// Wire form: URL-safe base64 (padded) of the JSON object.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffToken {
    pub user_id: i64,
    pub session_id: i64,
    pub raw_token: String,
    /// Unix seconds.
    pub expires_at: i64,
}

impl fmt::Debug for HandoffToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandoffToken")
            .field("user_id", &self.user_id)
            .field("session_id", &self.session_id)
            .field("raw_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl HandoffToken {
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| Error::Malformed(format!("handoff token encode failed: {e}")))?;
        Ok(URL_SAFE.encode(json))
    }

    pub fn decode(token: &str) -> Result<Self> {
        let json = URL_SAFE_LENIENT
            .decode(token.trim())
            .map_err(|e| Error::Malformed(format!("handoff token is not base64url: {e}")))?;
        serde_json::from_slice(&json)
            .map_err(|e| Error::Malformed(format!("handoff token payload is invalid: {e}")))
    }
}

/// Result of redeeming a handoff token.
#[derive(Debug, Clone)]
pub struct RedeemedHandoff {
    pub principal: Principal,
    /// Session bearer token, identical to what the web flow sets as a cookie.
    pub bearer_token: String,
}

pub struct MobileBroker {
    allowed_scheme: String,
    redirect_uri: Url,
    ttl: Duration,
    verifier: Arc<SessionVerifier>,
}

impl MobileBroker {
    /// `redirect_uri` is the deep link every mobile login returns to; it must
    /// itself use `allowed_scheme`.
    pub fn new(
        allowed_scheme: impl Into<String>,
        redirect_uri: &str,
        ttl: Duration,
        verifier: Arc<SessionVerifier>,
    ) -> Result<Self> {
        let allowed_scheme = allowed_scheme.into().trim().to_ascii_lowercase();
        let redirect_uri = parse_redirect(redirect_uri, &allowed_scheme)?;
        Ok(Self {
            allowed_scheme,
            redirect_uri,
            ttl,
            verifier,
        })
    }

    /// Check a client-requested redirect against the allowed scheme.
    pub fn validate_redirect(&self, requested: &str) -> Result<Url> {
        parse_redirect(requested, &self.allowed_scheme)
    }

    /// Build the provider redirect for a mobile login.
    pub fn start(
        &self,
        oauth: &OAuthClient,
        requested_redirect: Option<&str>,
        client_state: Option<&str>,
        callback_url: &str,
    ) -> Result<String> {
        let requested = requested_redirect
            .filter(|r| !r.is_empty())
            .ok_or(Error::MissingParameter("redirect_uri"))?;
        self.validate_redirect(requested)?;

        let client_state = client_state
            .filter(|s| !s.is_empty())
            .ok_or(Error::MissingParameter("state"))?;

        info!(redirect_uri = requested, "mobile login started");
        Ok(oauth.authorization_url(&mark_state(client_state), callback_url))
    }

    pub fn handoff(&self, session: &IssuedSession) -> HandoffToken {
        self.handoff_at(session, unix_now())
    }

    pub fn handoff_at(&self, session: &IssuedSession, now: i64) -> HandoffToken {
        HandoffToken {
            user_id: session.user_id,
            session_id: session.session_id,
            raw_token: session.raw_secret().to_string(),
            expires_at: now + self.ttl.as_secs() as i64,
        }
    }

    /// Deep link carrying the encoded handoff token back to the app.
    pub fn success_link(&self, handoff: &HandoffToken, client_state: &str) -> Result<String> {
        let token = handoff.encode()?;
        let mut url = self.redirect_uri.clone();
        url.query_pairs_mut()
            .append_pair("token", &token)
            .append_pair("user_id", &handoff.user_id.to_string())
            .append_pair("expires_in", &self.ttl.as_secs().to_string())
            .append_pair("state", client_state);
        Ok(url.into())
    }

    /// Deep link reporting a failed login. `code` is a stable machine-readable
    /// value such as `token_exchange`.
    pub fn error_link(&self, code: &str, description: &str) -> String {
        let mut url = self.redirect_uri.clone();
        url.query_pairs_mut()
            .append_pair("error", code)
            .append_pair("error_description", description);
        url.into()
    }

    pub async fn exchange(&self, token: &str) -> Result<RedeemedHandoff> {
        self.exchange_at(token, unix_now()).await
    }

    /// Redeem a handoff token for the session bearer token.
    ///
    /// Malformed tokens fail with `Error::Malformed`. Expired tokens, and
    /// tokens whose embedded session does not verify or belongs to another
    /// user, fail with `Error::InvalidHandoff`.
    pub async fn exchange_at(&self, token: &str, now: i64) -> Result<RedeemedHandoff> {
        let handoff = HandoffToken::decode(token)?;

        if now > handoff.expires_at {
            debug!(
                session_id = handoff.session_id,
                expires_at = handoff.expires_at,
                "handoff token rejected: expired"
            );
            return Err(Error::InvalidHandoff);
        }

        let bearer_token = encode_bearer_token(handoff.session_id, &handoff.raw_token);
        let principal = match self.verifier.verify(&bearer_token).await {
            Ok(principal) => principal,
            Err(Error::InvalidSession) => {
                debug!(
                    session_id = handoff.session_id,
                    "handoff token rejected: session does not verify"
                );
                return Err(Error::InvalidHandoff);
            }
            Err(e) => return Err(e),
        };
        if principal.user_id != handoff.user_id {
            debug!(
                session_id = handoff.session_id,
                "handoff token rejected: user mismatch"
            );
            return Err(Error::InvalidHandoff);
        }

        info!(
            user_id = principal.user_id,
            session_id = principal.session_id,
            "handoff token redeemed"
        );
        Ok(RedeemedHandoff {
            principal,
            bearer_token,
        })
    }
}

fn parse_redirect(uri: &str, allowed_scheme: &str) -> Result<Url> {
    let url = Url::parse(uri).map_err(|e| Error::InvalidRedirect(format!("{uri}: {e}")))?;
    if url.scheme() != allowed_scheme {
        return Err(Error::InvalidRedirect(format!(
            "{uri}: scheme must be {allowed_scheme}"
        )));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{HANDOFF_TTL, MOBILE_REDIRECT_URI, MOBILE_SCHEME};
    use crate::session::SessionIssuer;
    use common::Secret;
    use std::collections::HashMap;
    use store::{JsonStore, SessionRepo, UserRepo};

    const NOW: i64 = 1_750_000_000;

    struct Fixture {
        store: Arc<JsonStore>,
        issuer: SessionIssuer,
        broker: MobileBroker,
        user_id: i64,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(JsonStore::in_memory());
        let user_id = store.create_user("alice").await.unwrap();
        let verifier = Arc::new(SessionVerifier::new(store.clone()));
        let broker =
            MobileBroker::new(MOBILE_SCHEME, MOBILE_REDIRECT_URI, HANDOFF_TTL, verifier).unwrap();
        Fixture {
            issuer: SessionIssuer::new(store.clone()),
            store,
            broker,
            user_id,
        }
    }

    fn query(link: &str) -> HashMap<String, String> {
        Url::parse(link).unwrap().query_pairs().into_owned().collect()
    }

    #[test]
    fn state_marking() {
        assert_eq!(mark_state("abc"), "mobile_abc");
        assert_eq!(client_state("mobile_abc"), Some("abc"));
        assert_eq!(client_state("mobile_"), Some(""));
        assert_eq!(client_state("abc"), None);
        assert_eq!(client_state("Mobile_abc"), None);
    }

    #[test]
    fn handoff_wire_format_is_padded_url_safe_json() {
        let token = HandoffToken {
            user_id: 1,
            session_id: 2,
            raw_token: "r".into(),
            expires_at: 3,
        };
        let encoded = token.encode().unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&URL_SAFE.decode(&encoded).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"user_id": 1, "session_id": 2, "raw_token": "r", "expires_at": 3})
        );
        assert_eq!(encoded.len() % 4, 0);
    }

    #[test]
    fn decode_accepts_unpadded_tokens() {
        let token = HandoffToken {
            user_id: 10,
            session_id: 20,
            raw_token: "abcd".into(),
            expires_at: NOW,
        };
        let unpadded = token.encode().unwrap().trim_end_matches('=').to_string();
        assert_eq!(HandoffToken::decode(&unpadded).unwrap(), token);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            HandoffToken::decode("%%%"),
            Err(Error::Malformed(_))
        ));
        let not_json = URL_SAFE.encode("not json");
        assert!(matches!(
            HandoffToken::decode(&not_json),
            Err(Error::Malformed(_))
        ));
        let missing_field = URL_SAFE.encode(r#"{"user_id":1,"session_id":2}"#);
        assert!(matches!(
            HandoffToken::decode(&missing_field),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn debug_redacts_raw_token() {
        let token = HandoffToken {
            user_id: 1,
            session_id: 2,
            raw_token: "super-secret".into(),
            expires_at: 3,
        };
        assert!(!format!("{token:?}").contains("super-secret"));
    }

    #[tokio::test]
    async fn broker_rejects_misconfigured_redirect() {
        let store = Arc::new(JsonStore::in_memory());
        let verifier = Arc::new(SessionVerifier::new(store));
        assert!(matches!(
            MobileBroker::new("hextok", "https://evil.example/cb", HANDOFF_TTL, verifier),
            Err(Error::InvalidRedirect(_))
        ));
    }

    #[tokio::test]
    async fn broker_normalises_configured_scheme() {
        let store = Arc::new(JsonStore::in_memory());
        let verifier = Arc::new(SessionVerifier::new(store));
        let broker =
            MobileBroker::new(" HexTok ", MOBILE_REDIRECT_URI, HANDOFF_TTL, verifier).unwrap();
        assert!(broker.validate_redirect("hextok://oauth/callback").is_ok());
        assert!(broker.validate_redirect("https://evil.example/cb").is_err());
    }

    #[tokio::test]
    async fn start_validates_inputs_and_prefixes_state() {
        let f = fixture().await;
        let oauth = OAuthClient::github("cid", Secret::new("s".into())).unwrap();
        let callback = "https://api.hextok.app/oauth/callback/github";

        let url = f
            .broker
            .start(&oauth, Some("hextok://oauth/callback"), Some("xyz"), callback)
            .unwrap();
        let q = query(&url);
        assert_eq!(q["state"], "mobile_xyz");
        assert_eq!(q["redirect_uri"], callback);
        assert_eq!(q["client_id"], "cid");

        assert!(matches!(
            f.broker
                .start(&oauth, Some("https://evil.example"), Some("xyz"), callback),
            Err(Error::InvalidRedirect(_))
        ));
        assert!(matches!(
            f.broker.start(&oauth, Some("not a uri"), Some("xyz"), callback),
            Err(Error::InvalidRedirect(_))
        ));
        assert!(matches!(
            f.broker.start(&oauth, None, Some("xyz"), callback),
            Err(Error::MissingParameter("redirect_uri"))
        ));
        assert!(matches!(
            f.broker
                .start(&oauth, Some("hextok://oauth/callback"), Some(""), callback),
            Err(Error::MissingParameter("state"))
        ));
    }

    #[tokio::test]
    async fn success_link_carries_token_and_client_state() {
        let f = fixture().await;
        let session = f.issuer.create_session(f.user_id).await.unwrap();
        let handoff = f.broker.handoff_at(&session, NOW);
        assert_eq!(handoff.expires_at, NOW + 300);

        let link = f.broker.success_link(&handoff, "client-state").unwrap();
        assert!(link.starts_with("hextok://oauth/callback?"));
        let q = query(&link);
        assert_eq!(q["user_id"], f.user_id.to_string());
        assert_eq!(q["expires_in"], "300");
        assert_eq!(q["state"], "client-state");
        assert_eq!(HandoffToken::decode(&q["token"]).unwrap(), handoff);
    }

    #[tokio::test]
    async fn error_link_carries_code() {
        let f = fixture().await;
        let q = query(&f.broker.error_link("token_exchange", "Failed to exchange code"));
        assert_eq!(q["error"], "token_exchange");
        assert_eq!(q["error_description"], "Failed to exchange code");
    }

    #[tokio::test]
    async fn redeem_then_expired_redeem_fails() {
        let f = fixture().await;
        let session = f.issuer.create_session(f.user_id).await.unwrap();
        let token = f.broker.handoff_at(&session, NOW).encode().unwrap();

        let redeemed = f.broker.exchange_at(&token, NOW + 10).await.unwrap();
        assert_eq!(redeemed.bearer_token, session.bearer_token());
        assert_eq!(redeemed.principal.session_id, session.session_id);
        assert_eq!(redeemed.principal.user_id, f.user_id);

        assert!(matches!(
            f.broker.exchange_at(&token, NOW + 301).await,
            Err(Error::InvalidHandoff)
        ));
    }

    #[tokio::test]
    async fn expiry_boundary_is_inclusive() {
        let f = fixture().await;
        let session = f.issuer.create_session(f.user_id).await.unwrap();
        let token = f.broker.handoff_at(&session, NOW).encode().unwrap();
        assert!(f.broker.exchange_at(&token, NOW + 300).await.is_ok());
    }

    #[tokio::test]
    async fn forged_secret_is_rejected() {
        let f = fixture().await;
        let session = f.issuer.create_session(f.user_id).await.unwrap();
        let mut handoff = f.broker.handoff_at(&session, NOW);
        handoff.raw_token = "guessed".into();

        assert!(matches!(
            f.broker.exchange_at(&handoff.encode().unwrap(), NOW).await,
            Err(Error::InvalidHandoff)
        ));
    }

    #[tokio::test]
    async fn mismatched_user_is_rejected() {
        let f = fixture().await;
        let session = f.issuer.create_session(f.user_id).await.unwrap();
        let mut handoff = f.broker.handoff_at(&session, NOW);
        handoff.user_id += 1;

        assert!(matches!(
            f.broker.exchange_at(&handoff.encode().unwrap(), NOW).await,
            Err(Error::InvalidHandoff)
        ));
    }

    #[tokio::test]
    async fn revoked_session_cannot_be_redeemed() {
        let f = fixture().await;
        let session = f.issuer.create_session(f.user_id).await.unwrap();
        let token = f.broker.handoff_at(&session, NOW).encode().unwrap();
        f.store.delete_session(session.session_id).await.unwrap();

        assert!(matches!(
            f.broker.exchange_at(&token, NOW).await,
            Err(Error::InvalidHandoff)
        ));
    }

    #[tokio::test]
    async fn exchange_uses_real_clock() {
        let f = fixture().await;
        let session = f.issuer.create_session(f.user_id).await.unwrap();
        let token = f.broker.handoff(&session).encode().unwrap();
        assert!(f.broker.exchange(&token).await.is_ok());
    }
}
