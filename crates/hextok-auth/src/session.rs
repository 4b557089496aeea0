//! Session issuance and verification
//!
//! A session is a random secret whose SHA-256 digest is stored next to the
//! session id. The client holds `base64url(session_id|raw_secret)` as a bearer
//! token. Verification recomputes the digest and compares in constant time.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::Utc;
use common::Secret;
use rand::RngExt;
use sha2::{Digest, Sha256};
use store::SessionRepo;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::constants::SESSION_SECRET_LEN;
use crate::error::{Error, Result};

/// Fresh session secret: 32 random bytes, URL-safe base64 without padding.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SESSION_SECRET_LEN];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Digest stored for a raw secret: standard base64 of SHA-256.
pub fn hash_secret(raw: &str) -> String {
    STANDARD.encode(Sha256::digest(raw.as_bytes()))
}

pub fn encode_bearer_token(session_id: i64, raw_secret: &str) -> String {
    URL_SAFE_NO_PAD.encode(format!("{session_id}|{raw_secret}"))
}

/// Split a bearer token into `(session_id, raw_secret)`.
pub fn decode_bearer_token(token: &str) -> Result<(i64, String)> {
    let raw = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|e| Error::Malformed(format!("bearer token is not base64url: {e}")))?;
    let raw = String::from_utf8(raw)
        .map_err(|_| Error::Malformed("bearer token is not utf-8".into()))?;

    let mut parts = raw.split('|');
    let (Some(id), Some(secret), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(Error::Malformed("bearer token must have two fields".into()));
    };
    let id: i64 = id
        .parse()
        .map_err(|_| Error::Malformed("session id is not an integer".into()))?;
    if secret.is_empty() {
        return Err(Error::Malformed("session secret is empty".into()));
    }
    Ok((id, secret.to_string()))
}

/// A newly created session. The raw secret exists only here and in the
/// bearer token handed to the client.
#[derive(Debug)]
pub struct IssuedSession {
    pub session_id: i64,
    pub user_id: i64,
    raw_secret: Secret<String>,
}

impl IssuedSession {
    pub fn raw_secret(&self) -> &str {
        self.raw_secret.expose()
    }

    pub fn bearer_token(&self) -> String {
        encode_bearer_token(self.session_id, self.raw_secret.expose())
    }
}

pub struct SessionIssuer {
    sessions: Arc<dyn SessionRepo>,
}

impl SessionIssuer {
    pub fn new(sessions: Arc<dyn SessionRepo>) -> Self {
        Self { sessions }
    }

    pub async fn create_session(&self, user_id: i64) -> Result<IssuedSession> {
        let raw = generate_secret();
        let session_id = self
            .sessions
            .create_session(user_id, hash_secret(&raw))
            .await?;
        info!(user_id, session_id, "session created");
        Ok(IssuedSession {
            session_id,
            user_id,
            raw_secret: Secret::new(raw),
        })
    }
}

/// The authenticated caller attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub session_id: i64,
}

pub struct SessionVerifier {
    sessions: Arc<dyn SessionRepo>,
}

impl SessionVerifier {
    pub fn new(sessions: Arc<dyn SessionRepo>) -> Self {
        Self { sessions }
    }

    /// Authenticate a bearer token.
    ///
    /// Decode failures, unknown ids and digest mismatches all return
    /// `Error::InvalidSession`. Repository failures propagate as `Error::Store`.
    pub async fn verify(&self, token: &str) -> Result<Principal> {
        let (session_id, raw) = decode_bearer_token(token).map_err(|e| {
            debug!(error = %e, "session token rejected");
            Error::InvalidSession
        })?;

        let Some(session) = self.sessions.get_session(session_id).await? else {
            debug!(session_id, "session token rejected: unknown session");
            return Err(Error::InvalidSession);
        };

        let computed = hash_secret(&raw);
        if !bool::from(computed.as_bytes().ct_eq(session.secret_hash.as_bytes())) {
            debug!(session_id, "session token rejected: digest mismatch");
            return Err(Error::InvalidSession);
        }

        if let Err(e) = self
            .sessions
            .update_last_verified(session_id, Utc::now())
            .await
        {
            warn!(session_id, error = %e, "failed to record session verification");
        }

        Ok(Principal {
            user_id: session.user_id,
            session_id,
        })
    }

    /// Delete the session behind `token` if it verifies.
    ///
    /// Returns the revoked principal, or `None` when the token was not valid.
    /// An invalid token never deletes anything.
    pub async fn revoke(&self, token: &str) -> Result<Option<Principal>> {
        let principal = match self.verify(token).await {
            Ok(principal) => principal,
            Err(Error::InvalidSession) => return Ok(None),
            Err(e) => return Err(e),
        };
        self.sessions.delete_session(principal.session_id).await?;
        info!(
            user_id = principal.user_id,
            session_id = principal.session_id,
            "session revoked"
        );
        Ok(Some(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use store::{BoxFuture, JsonStore, Session, UserRepo};

    async fn setup() -> (Arc<JsonStore>, SessionIssuer, SessionVerifier, i64) {
        let store = Arc::new(JsonStore::in_memory());
        let user_id = store.create_user("octocat").await.unwrap();
        let issuer = SessionIssuer::new(store.clone());
        let verifier = SessionVerifier::new(store.clone());
        (store, issuer, verifier, user_id)
    }

    #[test]
    fn hash_is_standard_base64_sha256() {
        // sha256("abc")
        assert_eq!(
            hash_secret("abc"),
            "ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0="
        );
    }

    #[test]
    fn bearer_token_layout() {
        let token = encode_bearer_token(42, "s3cr3t");
        assert_eq!(URL_SAFE_NO_PAD.decode(&token).unwrap(), b"42|s3cr3t");
        assert_eq!(decode_bearer_token(&token).unwrap(), (42, "s3cr3t".into()));
    }

    #[test]
    fn decode_rejects_malformed_tokens() {
        for raw in ["42", "42|a|b", "abc|secret", "42|", ""] {
            let token = URL_SAFE_NO_PAD.encode(raw);
            assert!(
                matches!(decode_bearer_token(&token), Err(Error::Malformed(_))),
                "{raw:?} should be malformed"
            );
        }
        assert!(matches!(
            decode_bearer_token("not base64!"),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn secrets_are_random_and_unpadded() {
        let a = generate_secret();
        assert_ne!(a, generate_secret());
        assert_eq!(a.len(), 43);
        assert!(!a.contains('='));
    }

    #[tokio::test]
    async fn issued_session_verifies() {
        let (store, issuer, verifier, user_id) = setup().await;
        let issued = issuer.create_session(user_id).await.unwrap();

        let stored = store.get_session(issued.session_id).await.unwrap().unwrap();
        assert_eq!(stored.secret_hash, hash_secret(issued.raw_secret()));
        assert_ne!(stored.secret_hash, issued.raw_secret());

        let principal = verifier.verify(&issued.bearer_token()).await.unwrap();
        assert_eq!(
            principal,
            Principal {
                user_id,
                session_id: issued.session_id
            }
        );
    }

    #[tokio::test]
    async fn verify_updates_last_verified() {
        let (store, issuer, verifier, user_id) = setup().await;
        let issued = issuer.create_session(user_id).await.unwrap();
        let before = store.get_session(issued.session_id).await.unwrap().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        verifier.verify(&issued.bearer_token()).await.unwrap();

        let after = store.get_session(issued.session_id).await.unwrap().unwrap();
        assert!(after.last_verified_at > before.last_verified_at);
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let (_store, issuer, verifier, user_id) = setup().await;
        let issued = issuer.create_session(user_id).await.unwrap();

        let forged = encode_bearer_token(issued.session_id, &generate_secret());
        assert!(matches!(
            verifier.verify(&forged).await,
            Err(Error::InvalidSession)
        ));
    }

    #[tokio::test]
    async fn unknown_session_and_garbage_are_rejected() {
        let (_store, _issuer, verifier, _user_id) = setup().await;

        let unknown = encode_bearer_token(999, &generate_secret());
        assert!(matches!(
            verifier.verify(&unknown).await,
            Err(Error::InvalidSession)
        ));
        assert!(matches!(
            verifier.verify("garbage").await,
            Err(Error::InvalidSession)
        ));
        assert!(matches!(
            verifier.verify(&URL_SAFE_NO_PAD.encode("1|2|3")).await,
            Err(Error::InvalidSession)
        ));
    }

    #[tokio::test]
    async fn revoked_session_stops_verifying() {
        let (store, issuer, verifier, user_id) = setup().await;
        let issued = issuer.create_session(user_id).await.unwrap();
        let token = issued.bearer_token();

        let revoked = verifier.revoke(&token).await.unwrap();
        assert_eq!(revoked.map(|p| p.session_id), Some(issued.session_id));
        assert!(store.get_session(issued.session_id).await.unwrap().is_none());
        assert!(matches!(
            verifier.verify(&token).await,
            Err(Error::InvalidSession)
        ));
    }

    #[tokio::test]
    async fn revoke_with_wrong_secret_deletes_nothing() {
        let (store, issuer, verifier, user_id) = setup().await;
        let issued = issuer.create_session(user_id).await.unwrap();

        let forged = encode_bearer_token(issued.session_id, "guess");
        assert!(verifier.revoke(&forged).await.unwrap().is_none());
        assert!(store.get_session(issued.session_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let (_store, issuer, verifier, user_id) = setup().await;
        let a = issuer.create_session(user_id).await.unwrap();
        let b = issuer.create_session(user_id).await.unwrap();
        assert_ne!(a.session_id, b.session_id);

        verifier.revoke(&a.bearer_token()).await.unwrap();
        assert!(verifier.verify(&b.bearer_token()).await.is_ok());
    }

    /// Returns a fixed session on read but fails every write.
    struct ReadOnlySessions(Session);

    impl SessionRepo for ReadOnlySessions {
        fn create_session(&self, _: i64, _: String) -> BoxFuture<'_, i64> {
            Box::pin(async { Err(store::Error::Io("read-only".into())) })
        }
        fn get_session(&self, id: i64) -> BoxFuture<'_, Option<Session>> {
            let found = (id == self.0.id).then(|| self.0.clone());
            Box::pin(async move { Ok(found) })
        }
        fn list_sessions_by_user(&self, _: i64) -> BoxFuture<'_, Vec<Session>> {
            Box::pin(async { Ok(Vec::new()) })
        }
        fn delete_session(&self, _: i64) -> BoxFuture<'_, ()> {
            Box::pin(async { Err(store::Error::Io("read-only".into())) })
        }
        fn update_last_verified(&self, _: i64, _: DateTime<Utc>) -> BoxFuture<'_, ()> {
            Box::pin(async { Err(store::Error::Io("read-only".into())) })
        }
    }

    #[tokio::test]
    async fn last_verified_failure_does_not_fail_verification() {
        let now = Utc::now();
        let repo = ReadOnlySessions(Session {
            id: 7,
            user_id: 3,
            secret_hash: hash_secret("raw"),
            created_at: now,
            last_verified_at: now,
        });
        let verifier = SessionVerifier::new(Arc::new(repo));

        let principal = verifier
            .verify(&encode_bearer_token(7, "raw"))
            .await
            .unwrap();
        assert_eq!(principal.user_id, 3);
    }

    #[tokio::test]
    async fn issuer_propagates_store_errors() {
        let now = Utc::now();
        let repo = ReadOnlySessions(Session {
            id: 1,
            user_id: 1,
            secret_hash: String::new(),
            created_at: now,
            last_verified_at: now,
        });
        let issuer = SessionIssuer::new(Arc::new(repo));
        assert!(matches!(
            issuer.create_session(1).await,
            Err(Error::Store(store::Error::Io(_)))
        ));
    }
}
