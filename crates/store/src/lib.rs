//! Persistence collaborators for the hextok auth service
//!
//! Users, provider identities and sessions are reached only through the three
//! repository traits in [`repo`]. The auth core never sees a connection or a
//! cursor, so any backend that is safe for concurrent use can sit behind them.
//!
//! [`JsonStore`] is the bundled backend: all three tables behind one tokio
//! Mutex, optionally persisted to a JSON file with atomic temp-file + rename.
//! The (provider, provider_user_id) uniqueness constraint is enforced inside
//! the lock, which is what lets concurrent first logins detect each other.

pub mod error;
pub mod json;
pub mod model;
pub mod repo;

pub use error::{Error, Result};
pub use json::JsonStore;
pub use model::{NewIdentity, ProviderIdentity, Session, User};
pub use repo::{BoxFuture, IdentityRepo, SessionRepo, UserRepo};
