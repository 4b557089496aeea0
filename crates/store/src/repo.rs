//! Repository traits consumed by the auth core
//!
//! Methods return `Pin<Box<dyn Future>>` so the traits stay dyn-compatible and
//! handlers can hold `Arc<dyn SessionRepo>` without generics leaking into
//! router state. Implementations must be safe for concurrent use.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{NewIdentity, ProviderIdentity, Session, User};

/// Boxed future returned by every repository method.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

pub trait UserRepo: Send + Sync {
    /// Insert a user and return its id.
    fn create_user<'a>(&'a self, username: &'a str) -> BoxFuture<'a, i64>;

    fn get_user(&self, id: i64) -> BoxFuture<'_, Option<User>>;

    /// All users ordered by id.
    fn list_users(&self) -> BoxFuture<'_, Vec<User>>;

    /// Remove a user. Used to compensate a first login whose identity insert
    /// failed, so no user is left without an identity link.
    fn delete_user(&self, id: i64) -> BoxFuture<'_, ()>;
}

pub trait IdentityRepo: Send + Sync {
    /// Insert an identity. Fails with `Error::Conflict` when the
    /// (provider, provider_user_id) pair already exists.
    fn create_identity(&self, identity: NewIdentity) -> BoxFuture<'_, i64>;

    fn get_by_provider_user_id<'a>(
        &'a self,
        provider: &'a str,
        provider_user_id: &'a str,
    ) -> BoxFuture<'a, Option<ProviderIdentity>>;

    fn list_identities_by_user(&self, user_id: i64) -> BoxFuture<'_, Vec<ProviderIdentity>>;
}

pub trait SessionRepo: Send + Sync {
    /// Insert a session holding only the secret digest. Returns the session id.
    fn create_session(&self, user_id: i64, secret_hash: String) -> BoxFuture<'_, i64>;

    fn get_session(&self, id: i64) -> BoxFuture<'_, Option<Session>>;

    fn list_sessions_by_user(&self, user_id: i64) -> BoxFuture<'_, Vec<Session>>;

    /// Delete a session. Deleting a missing id is not an error.
    fn delete_session(&self, id: i64) -> BoxFuture<'_, ()>;

    fn update_last_verified(&self, id: i64, at: DateTime<Utc>) -> BoxFuture<'_, ()>;
}
