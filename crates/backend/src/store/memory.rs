use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{StoreError, StoreResult, UserStore};
use crate::models::{Identity, NewIdentity};

/// Process-local store. Uniqueness of email is checked under the write lock,
/// so concurrent inserts for one email resolve to exactly one identity.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, Identity>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email_address == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Identity>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_verification_token(&self, token: &str) -> StoreResult<Option<Identity>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.verification_token.as_deref() == Some(token))
            .cloned())
    }

    async fn insert(&self, identity: NewIdentity) -> StoreResult<Identity> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.email_address == identity.email_address)
        {
            return Err(StoreError::Conflict(format!(
                "User {}",
                identity.email_address
            )));
        }

        let identity = identity.into_identity(Utc::now());
        users.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn update_profile_fields(
        &self,
        id: Uuid,
        name: Option<&str>,
        picture_url: Option<Option<&str>>,
    ) -> StoreResult<Identity> {
        let mut users = self.users.write().await;
        let stored = users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("User {}", id)))?;

        if let Some(name) = name {
            stored.name = name.to_string();
        }
        if let Some(picture_url) = picture_url {
            stored.picture_url = picture_url.map(str::to_string);
        }
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn update(&self, identity: &Identity) -> StoreResult<Identity> {
        let mut users = self.users.write().await;
        let stored = users
            .get_mut(&identity.id)
            .ok_or_else(|| StoreError::NotFound(format!("User {}", identity.id)))?;

        // Email is the key and is never rewritten.
        let email_address = stored.email_address.clone();
        *stored = Identity {
            email_address,
            created_at: stored.created_at,
            updated_at: Utc::now(),
            ..identity.clone()
        };
        Ok(stored.clone())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.users
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("User {}", id)))
    }
}
