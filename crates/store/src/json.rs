//! JSON-file backed implementation of all three repositories
//!
//! Every table lives in one in-memory snapshot guarded by a tokio Mutex. A
//! write clones the snapshot, applies the change, persists the clone and only
//! then swaps it in, so a failed disk write leaves memory unchanged. Without a
//! path the store is purely in-memory (tests, local development).
//!
//! `update_last_verified` is the exception: it runs on every authenticated
//! request, so it stamps memory in place and only persists stale stamps.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{NewIdentity, ProviderIdentity, Session, User};
use crate::repo::{BoxFuture, IdentityRepo, SessionRepo, UserRepo};

/// Minimum age of a persisted `last_verified_at` before a verification
/// rewrites the file.
const LAST_VERIFIED_FLUSH_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    next_user_id: i64,
    next_identity_id: i64,
    next_session_id: i64,
    users: Vec<User>,
    identities: Vec<ProviderIdentity>,
    sessions: Vec<Session>,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

pub struct JsonStore {
    path: Option<PathBuf>,
    state: Mutex<Tables>,
}

impl JsonStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(Tables::default()),
        }
    }

    /// Load the store from `path`.
    ///
    /// A missing file is a cold start: the store begins empty and the file is
    /// created immediately.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let tables = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading store file: {e}")))?;
            let tables: Tables = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing store file: {e}")))?;
            info!(
                path = %path.display(),
                users = tables.users.len(),
                sessions = tables.sessions.len(),
                "loaded auth store"
            );
            tables
        } else {
            info!(path = %path.display(), "store file not found, starting empty");
            let tables = Tables::default();
            write_atomic(&path, &tables).await?;
            tables
        };

        Ok(Self {
            path: Some(path),
            state: Mutex::new(tables),
        })
    }

    /// Apply `change` to a copy of the tables, persist it, then commit.
    async fn write<T>(&self, change: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let out = change(&mut next)?;
        if let Some(path) = &self.path {
            write_atomic(path, &next).await?;
        }
        *state = next;
        Ok(out)
    }

    async fn read<T>(&self, query: impl FnOnce(&Tables) -> T) -> T {
        let state = self.state.lock().await;
        query(&state)
    }
}

impl UserRepo for JsonStore {
    fn create_user<'a>(&'a self, username: &'a str) -> BoxFuture<'a, i64> {
        Box::pin(async move {
            let now = Utc::now();
            let id = self
                .write(|t| {
                    let id = next_id(&mut t.next_user_id);
                    t.users.push(User {
                        id,
                        username: username.to_owned(),
                        created_at: now,
                        updated_at: now,
                    });
                    Ok(id)
                })
                .await?;
            debug!(user_id = id, "created user");
            Ok(id)
        })
    }

    fn get_user(&self, id: i64) -> BoxFuture<'_, Option<User>> {
        Box::pin(async move {
            Ok(self
                .read(|t| t.users.iter().find(|u| u.id == id).cloned())
                .await)
        })
    }

    fn list_users(&self) -> BoxFuture<'_, Vec<User>> {
        Box::pin(async move {
            let mut users = self.read(|t| t.users.clone()).await;
            users.sort_by_key(|u| u.id);
            Ok(users)
        })
    }

    fn delete_user(&self, id: i64) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            // Cascade like the relational schema does.
            self.write(|t| {
                t.users.retain(|u| u.id != id);
                t.identities.retain(|i| i.user_id != id);
                t.sessions.retain(|s| s.user_id != id);
                Ok(())
            })
            .await?;
            debug!(user_id = id, "deleted user");
            Ok(())
        })
    }
}

impl IdentityRepo for JsonStore {
    fn create_identity(&self, identity: NewIdentity) -> BoxFuture<'_, i64> {
        Box::pin(async move {
            self.write(|t| {
                let taken = t.identities.iter().any(|i| {
                    i.provider == identity.provider
                        && i.provider_user_id == identity.provider_user_id
                });
                if taken {
                    return Err(Error::Conflict(format!(
                        "identity {}:{} already linked",
                        identity.provider, identity.provider_user_id
                    )));
                }
                if !t.users.iter().any(|u| u.id == identity.user_id) {
                    return Err(Error::NotFound(format!("user {}", identity.user_id)));
                }
                let id = next_id(&mut t.next_identity_id);
                t.identities.push(ProviderIdentity {
                    id,
                    user_id: identity.user_id,
                    provider: identity.provider,
                    provider_user_id: identity.provider_user_id,
                    access_token: identity.access_token,
                    refresh_token: identity.refresh_token,
                    created_at: Utc::now(),
                });
                Ok(id)
            })
            .await
        })
    }

    fn get_by_provider_user_id<'a>(
        &'a self,
        provider: &'a str,
        provider_user_id: &'a str,
    ) -> BoxFuture<'a, Option<ProviderIdentity>> {
        Box::pin(async move {
            Ok(self
                .read(|t| {
                    t.identities
                        .iter()
                        .find(|i| i.provider == provider && i.provider_user_id == provider_user_id)
                        .cloned()
                })
                .await)
        })
    }

    fn list_identities_by_user(&self, user_id: i64) -> BoxFuture<'_, Vec<ProviderIdentity>> {
        Box::pin(async move {
            Ok(self
                .read(|t| {
                    t.identities
                        .iter()
                        .filter(|i| i.user_id == user_id)
                        .cloned()
                        .collect()
                })
                .await)
        })
    }
}

impl SessionRepo for JsonStore {
    fn create_session(&self, user_id: i64, secret_hash: String) -> BoxFuture<'_, i64> {
        Box::pin(async move {
            let now = Utc::now();
            self.write(|t| {
                if !t.users.iter().any(|u| u.id == user_id) {
                    return Err(Error::NotFound(format!("user {user_id}")));
                }
                let id = next_id(&mut t.next_session_id);
                t.sessions.push(Session {
                    id,
                    user_id,
                    secret_hash,
                    created_at: now,
                    last_verified_at: now,
                });
                Ok(id)
            })
            .await
        })
    }

    fn get_session(&self, id: i64) -> BoxFuture<'_, Option<Session>> {
        Box::pin(async move {
            Ok(self
                .read(|t| t.sessions.iter().find(|s| s.id == id).cloned())
                .await)
        })
    }

    fn list_sessions_by_user(&self, user_id: i64) -> BoxFuture<'_, Vec<Session>> {
        Box::pin(async move {
            Ok(self
                .read(|t| {
                    t.sessions
                        .iter()
                        .filter(|s| s.user_id == user_id)
                        .cloned()
                        .collect()
                })
                .await)
        })
    }

    fn delete_session(&self, id: i64) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.write(|t| {
                t.sessions.retain(|s| s.id != id);
                Ok(())
            })
            .await
        })
    }

    /// Stamps in memory. The file is only rewritten when the persisted stamp
    /// is older than [`LAST_VERIFIED_FLUSH_INTERVAL`]; fresher stamps reach
    /// disk with the next write.
    fn update_last_verified(&self, id: i64, at: DateTime<Utc>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let Some(session) = state.sessions.iter_mut().find(|s| s.id == id) else {
                return Ok(());
            };
            let stale = (at - session.last_verified_at)
                .to_std()
                .is_ok_and(|age| age >= LAST_VERIFIED_FLUSH_INTERVAL);
            session.last_verified_at = at;

            if stale && let Some(path) = &self.path {
                write_atomic(path, &state).await?;
            }
            Ok(())
        })
    }
}

/// Write the tables to `path` atomically.
///
/// Writes a temp file in the same directory and renames it over the target.
/// Permissions are 0600 on unix since the file holds provider access tokens.
async fn write_atomic(path: &Path, tables: &Tables) -> Result<()> {
    let json = serde_json::to_string_pretty(tables)
        .map_err(|e| Error::Parse(format!("serializing store: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("store path has no parent directory".into()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("store.json");
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp store file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting store file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp store file: {e}")))?;

    debug!(path = %path.display(), "persisted auth store");
    Ok(())
}
