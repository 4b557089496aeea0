//! Signed OAuth state tokens
//!
//! The state cookie carries `base64url(nonce|issued_at|hex(hmac))` where the
//! HMAC-SHA256 covers `nonce|issued_at`. The nonce itself is what goes to the
//! provider as `state` and comes back on the callback query string.
//!
//! Verification collapses every failure (missing cookie, bad base64, wrong
//! field count, bad signature, expired, nonce mismatch) into one
//! `Error::InvalidState` so callers cannot tell which check failed.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use common::Secret;
use rand::RngExt;
use ring::hmac;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::{Error, Result};
use crate::unix_now;

/// Signs and verifies state tokens with a server-held key.
pub struct StateCodec {
    key: hmac::Key,
    ttl: Duration,
}

impl StateCodec {
    pub fn new(signing_key: &Secret<String>, ttl: Duration) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, signing_key.expose().as_bytes()),
            ttl,
        }
    }

    /// A fresh 32-byte random nonce, URL-safe base64 without padding.
    pub fn generate_nonce() -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Sign `nonce` stamped with the current time.
    pub fn issue(&self, nonce: &str) -> String {
        self.issue_at(nonce, unix_now())
    }

    /// Sign `nonce` stamped with `issued_at` (unix seconds).
    pub fn issue_at(&self, nonce: &str, issued_at: i64) -> String {
        let payload = format!("{nonce}|{issued_at}");
        let tag = hmac::sign(&self.key, payload.as_bytes());
        let raw = format!("{payload}|{}", hex::encode(tag.as_ref()));
        URL_SAFE_NO_PAD.encode(raw)
    }

    /// Verify the cookie value against the nonce returned by the provider.
    pub fn verify(&self, cookie: Option<&str>, supplied_nonce: &str) -> Result<()> {
        self.verify_at(cookie, supplied_nonce, unix_now())
    }

    pub fn verify_at(&self, cookie: Option<&str>, supplied_nonce: &str, now: i64) -> Result<()> {
        self.check(cookie, supplied_nonce, now).map_err(|reason| {
            debug!(reason, "state verification failed");
            Error::InvalidState
        })
    }

    fn check(
        &self,
        cookie: Option<&str>,
        supplied_nonce: &str,
        now: i64,
    ) -> std::result::Result<(), &'static str> {
        let cookie = cookie.ok_or("state cookie missing")?;
        let raw = URL_SAFE_NO_PAD
            .decode(cookie)
            .map_err(|_| "state cookie is not base64url")?;
        let raw = String::from_utf8(raw).map_err(|_| "state cookie is not utf-8")?;

        // Split from the right so the signature and timestamp are always the
        // last two fields.
        let mut fields = raw.rsplitn(3, '|');
        let (Some(sig_hex), Some(ts), Some(nonce)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err("state cookie has wrong field count");
        };

        let sig = hex::decode(sig_hex).map_err(|_| "state signature is not hex")?;
        let payload = format!("{nonce}|{ts}");
        hmac::verify(&self.key, payload.as_bytes(), &sig).map_err(|_| "state signature mismatch")?;

        let issued_at: i64 = ts.parse().map_err(|_| "state timestamp is not a number")?;
        if now.saturating_sub(issued_at) > self.ttl.as_secs() as i64 {
            return Err("state expired");
        }

        if !bool::from(nonce.as_bytes().ct_eq(supplied_nonce.as_bytes())) {
            return Err("state nonce mismatch");
        }
        Ok(())
    }
}
