//! Mapping an external provider's assertion onto a local identity.

use std::sync::Arc;

use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::models::{Identity, NewIdentity};
use crate::store::{StoreError, UserStore};

use super::identity::AuthenticatedIdentity;

/// What the provider told us about the user. Any field may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderProfile {
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Find-or-create by email.
///
/// An existing record keeps its provider and verification status; only the
/// display name and picture are refreshed, and only with values the provider
/// actually supplied.
#[derive(Clone)]
pub struct IdentityReconciler {
    store: Arc<dyn UserStore>,
}

impl IdentityReconciler {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    pub async fn reconcile(&self, profile: ProviderProfile) -> ApiResult<AuthenticatedIdentity> {
        let email = profile
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .ok_or_else(|| {
                ApiError::ReconciliationFailed("provider did not supply an email".to_string())
            })?
            .to_string();

        if let Some(existing) = self.store.find_by_email(&email).await? {
            let identity = self.refresh(existing, &profile).await?;
            return Ok(AuthenticatedIdentity::Provider {
                identity,
                created: false,
            });
        }

        let name = profile
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| email.clone());
        let new_identity = NewIdentity::google(&name, &email, profile.picture.clone());

        match self.store.insert(new_identity).await {
            Ok(identity) => {
                tracing::info!("Created identity {} for {}", identity.id, email);
                Ok(AuthenticatedIdentity::Provider {
                    identity,
                    created: true,
                })
            }
            Err(StoreError::Conflict(_)) => {
                // Another request created it between our read and our insert.
                tracing::debug!("Lost insert race for {}, updating instead", email);
                let existing = self.store.find_by_email(&email).await?.ok_or_else(|| {
                    ApiError::ReconciliationFailed(format!("identity for {} vanished", email))
                })?;
                let identity = self.refresh(existing, &profile).await?;
                Ok(AuthenticatedIdentity::Provider {
                    identity,
                    created: false,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn refresh(&self, identity: Identity, profile: &ProviderProfile) -> ApiResult<Identity> {
        let name = profile
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .filter(|n| *n != identity.name);
        let picture = profile
            .picture
            .as_deref()
            .filter(|p| identity.picture_url.as_deref() != Some(*p));

        if name.is_none() && picture.is_none() {
            return Ok(identity);
        }
        Ok(self
            .store
            .update_profile_fields(identity.id, name, picture.map(Some))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryUserStore, StoreResult};
    use chrono::Duration;
    use uuid::Uuid;
    use shared_types::AuthProvider;

    fn profile(email: &str, name: &str) -> ProviderProfile {
        ProviderProfile {
            email: Some(email.to_string()),
            name: Some(name.to_string()),
            picture: None,
        }
    }

    #[tokio::test]
    async fn test_creates_verified_provider_identity() {
        let store = Arc::new(MemoryUserStore::new());
        let reconciler = IdentityReconciler::new(store.clone());

        let result = reconciler.reconcile(profile("g@x.com", "Gee")).await.unwrap();

        assert!(matches!(result, AuthenticatedIdentity::Provider { created: true, .. }));
        let identity = result.identity();
        assert_eq!(identity.provider, AuthProvider::Google);
        assert!(identity.email_verified);
        assert!(identity.password_hash.is_none());
        assert_eq!(identity.name, "Gee");
    }

    #[tokio::test]
    async fn test_second_call_updates_only_name() {
        let store = Arc::new(MemoryUserStore::new());
        let reconciler = IdentityReconciler::new(store.clone());

        let first = reconciler
            .reconcile(profile("g@x.com", "Old Name"))
            .await
            .unwrap()
            .into_identity();
        let second = reconciler
            .reconcile(profile("g@x.com", "New Name"))
            .await
            .unwrap();

        assert!(matches!(second, AuthenticatedIdentity::Provider { created: false, .. }));
        let second = second.into_identity();
        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "New Name");
        assert_eq!(second.provider, first.provider);
        assert_eq!(second.email_verified, first.email_verified);
        assert_eq!(second.picture_url, first.picture_url);
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_existing_local_account_is_not_converted() {
        let store = Arc::new(MemoryUserStore::new());
        let local = store
            .insert(NewIdentity::local(
                "Loc",
                "l@x.com",
                "hash".to_string(),
                Duration::hours(1),
            ))
            .await
            .unwrap();
        let reconciler = IdentityReconciler::new(store.clone());

        let mut assertion = profile("l@x.com", "Loc From Google");
        assertion.picture = Some("https://img.test/p.png".to_string());
        let identity = reconciler.reconcile(assertion).await.unwrap().into_identity();

        assert_eq!(identity.id, local.id);
        assert_eq!(identity.provider, AuthProvider::Local);
        assert!(!identity.email_verified);
        assert_eq!(identity.password_hash.as_deref(), Some("hash"));
        assert_eq!(identity.picture_url.as_deref(), Some("https://img.test/p.png"));
    }

    #[tokio::test]
    async fn test_missing_name_keeps_existing_name() {
        let store = Arc::new(MemoryUserStore::new());
        let reconciler = IdentityReconciler::new(store.clone());
        reconciler.reconcile(profile("g@x.com", "Kept")).await.unwrap();

        let identity = reconciler
            .reconcile(ProviderProfile {
                email: Some("g@x.com".to_string()),
                name: None,
                picture: None,
            })
            .await
            .unwrap()
            .into_identity();

        assert_eq!(identity.name, "Kept");
    }

    #[tokio::test]
    async fn test_missing_email_fails() {
        let reconciler = IdentityReconciler::new(Arc::new(MemoryUserStore::new()));

        for email in [None, Some("   ".to_string())] {
            let err = reconciler
                .reconcile(ProviderProfile {
                    email,
                    name: Some("No Mail".to_string()),
                    picture: None,
                })
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::ReconciliationFailed(_)));
        }
    }

    #[tokio::test]
    async fn test_concurrent_reconciles_produce_one_identity() {
        let store = Arc::new(MemoryUserStore::new());
        let reconciler = IdentityReconciler::new(store.clone());

        let mut handles = Vec::new();
        for i in 0..8 {
            let reconciler = reconciler.clone();
            handles.push(tokio::spawn(async move {
                reconciler
                    .reconcile(profile("race@x.com", &format!("Name {i}")))
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(store.count().await, 1);
    }

    /// Marks the account verified right after the reconciler has read it,
    /// the way a verify-email request landing mid-login would.
    struct VerifyAfterRead {
        inner: MemoryUserStore,
    }

    #[async_trait::async_trait]
    impl UserStore for VerifyAfterRead {
        async fn find_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
            let found = self.inner.find_by_email(email).await?;
            if let Some(identity) = &found {
                let mut verified = identity.clone();
                verified.email_verified = true;
                verified.verification_token = None;
                verified.verification_token_expires_at = None;
                self.inner.update(&verified).await?;
            }
            Ok(found)
        }
        async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Identity>> {
            self.inner.find_by_id(id).await
        }
        async fn find_by_verification_token(&self, token: &str) -> StoreResult<Option<Identity>> {
            self.inner.find_by_verification_token(token).await
        }
        async fn insert(&self, identity: NewIdentity) -> StoreResult<Identity> {
            self.inner.insert(identity).await
        }
        async fn update_profile_fields(
            &self,
            id: Uuid,
            name: Option<&str>,
            picture_url: Option<Option<&str>>,
        ) -> StoreResult<Identity> {
            self.inner.update_profile_fields(id, name, picture_url).await
        }
        async fn update(&self, identity: &Identity) -> StoreResult<Identity> {
            self.inner.update(identity).await
        }
        async fn delete(&self, id: Uuid) -> StoreResult<()> {
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_refresh_does_not_undo_concurrent_verification() {
        let inner = MemoryUserStore::new();
        let local = inner
            .insert(NewIdentity::local(
                "Loc",
                "l@x.com",
                "hash".to_string(),
                Duration::hours(1),
            ))
            .await
            .unwrap();
        let store = Arc::new(VerifyAfterRead { inner });
        let reconciler = IdentityReconciler::new(store.clone());

        let identity = reconciler
            .reconcile(profile("l@x.com", "New"))
            .await
            .unwrap()
            .into_identity();
        assert_eq!(identity.name, "New");

        let stored = store.inner.find_by_id(local.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "New");
        assert!(stored.email_verified);
        assert!(stored.verification_token.is_none());
        assert_eq!(stored.provider, AuthProvider::Local);
        assert_eq!(stored.password_hash.as_deref(), Some("hash"));
    }
}
