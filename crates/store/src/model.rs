//! Rows owned by the repositories

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Durable link between one external provider account and one local user.
///
/// `(provider, provider_user_id)` is unique across the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    pub id: i64,
    pub user_id: i64,
    pub provider: String,
    pub provider_user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for [`ProviderIdentity`].
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub user_id: i64,
    pub provider: String,
    pub provider_user_id: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// A login session.
///
/// `secret_hash` is the digest of the session secret; the raw secret is
/// never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub secret_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_verified_at: DateTime<Utc>,
}
