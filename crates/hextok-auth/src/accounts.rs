//! Find-or-create the local user behind a provider identity
//!
//! First logins insert a user and then its identity link. The identity insert
//! is guarded by the store's (provider, provider_user_id) uniqueness
//! constraint; when two first logins race, the loser sees `Conflict`, deletes
//! the user it just created and re-reads the winner's link. Any other identity
//! insert failure also deletes the new user so no user is left unlinked.

use std::sync::Arc;

use common::Secret;
use store::{IdentityRepo, NewIdentity, UserRepo};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::oauth::ProviderProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAccount {
    pub user_id: i64,
    /// True when this login created the user.
    pub created: bool,
}

pub struct AccountResolver {
    users: Arc<dyn UserRepo>,
    identities: Arc<dyn IdentityRepo>,
    provider: String,
}

impl AccountResolver {
    pub fn new(
        users: Arc<dyn UserRepo>,
        identities: Arc<dyn IdentityRepo>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            users,
            identities,
            provider: provider.into(),
        }
    }

    pub async fn resolve(
        &self,
        profile: &ProviderProfile,
        access_token: &Secret<String>,
    ) -> Result<ResolvedAccount> {
        if let Some(user_id) = self.lookup(&profile.provider_user_id).await? {
            return Ok(ResolvedAccount {
                user_id,
                created: false,
            });
        }

        let username = if profile.login.is_empty() {
            format!("{}-{}", self.provider, profile.provider_user_id)
        } else {
            profile.login.clone()
        };
        let user_id = self.users.create_user(&username).await?;

        let link = NewIdentity {
            user_id,
            provider: self.provider.clone(),
            provider_user_id: profile.provider_user_id.clone(),
            access_token: access_token.expose().clone(),
            refresh_token: String::new(),
        };
        match self.identities.create_identity(link).await {
            Ok(_) => {
                info!(
                    user_id,
                    provider = %self.provider,
                    provider_user_id = %profile.provider_user_id,
                    "created user for new provider identity"
                );
                Ok(ResolvedAccount {
                    user_id,
                    created: true,
                })
            }
            Err(store::Error::Conflict(detail)) => {
                self.compensate(user_id).await;
                match self.lookup(&profile.provider_user_id).await? {
                    Some(winner) => {
                        info!(
                            user_id = winner,
                            provider_user_id = %profile.provider_user_id,
                            "concurrent first login resolved to existing user"
                        );
                        Ok(ResolvedAccount {
                            user_id: winner,
                            created: false,
                        })
                    }
                    None => Err(Error::Store(store::Error::Conflict(detail))),
                }
            }
            Err(e) => {
                self.compensate(user_id).await;
                Err(e.into())
            }
        }
    }

    async fn lookup(&self, provider_user_id: &str) -> Result<Option<i64>> {
        Ok(self
            .identities
            .get_by_provider_user_id(&self.provider, provider_user_id)
            .await?
            .map(|identity| identity.user_id))
    }

    async fn compensate(&self, user_id: i64) {
        if let Err(e) = self.users.delete_user(user_id).await {
            warn!(user_id, error = %e, "failed to delete user after identity insert failed");
        }
    }
}
