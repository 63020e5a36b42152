// Database models for Diesel
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use shared_types::{AuthProvider, UserProfile};
use uuid::Uuid;

/// A user record as owned by the persistence store.
///
/// `email_address` is the unique, case-sensitive key. LOCAL identities always
/// carry a password hash; GOOGLE identities are created already verified.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
    pub email_address: String,
    pub password_hash: Option<String>,
    pub provider: AuthProvider,
    pub email_verified: bool,
    pub verification_token: Option<String>,
    pub verification_token_expires_at: Option<DateTime<Utc>>,
    pub picture_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            email_address: self.email_address.clone(),
            picture_url: self.picture_url.clone(),
            provider: self.provider,
        }
    }

    /// Whether the verification token has passed its expiry at `now`.
    /// A token without an expiry never expires.
    pub fn verification_expired(&self, now: DateTime<Utc>) -> bool {
        self.verification_token_expires_at
            .is_some_and(|expires_at| expires_at < now)
    }
}

/// Insertable struct for new identities
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewIdentity {
    pub id: Uuid,
    pub name: String,
    pub email_address: String,
    pub password_hash: Option<String>,
    pub provider: AuthProvider,
    pub email_verified: bool,
    pub verification_token: Option<String>,
    pub verification_token_expires_at: Option<DateTime<Utc>>,
    pub picture_url: Option<String>,
}

impl NewIdentity {
    /// A password account awaiting email verification.
    pub fn local(
        name: &str,
        email_address: &str,
        password_hash: String,
        verification_ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email_address: email_address.to_string(),
            password_hash: Some(password_hash),
            provider: AuthProvider::Local,
            email_verified: false,
            verification_token: Some(Uuid::new_v4().to_string()),
            verification_token_expires_at: Some(Utc::now() + verification_ttl),
            picture_url: None,
        }
    }

    /// A provider-backed account. The provider has already verified the email.
    pub fn google(name: &str, email_address: &str, picture_url: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email_address: email_address.to_string(),
            password_hash: None,
            provider: AuthProvider::Google,
            email_verified: true,
            verification_token: None,
            verification_token_expires_at: None,
            picture_url,
        }
    }

    pub fn into_identity(self, now: DateTime<Utc>) -> Identity {
        Identity {
            id: self.id,
            name: self.name,
            email_address: self.email_address,
            password_hash: self.password_hash,
            provider: self.provider,
            email_verified: self.email_verified,
            verification_token: self.verification_token,
            verification_token_expires_at: self.verification_token_expires_at,
            picture_url: self.picture_url,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Mutable columns of an identity. `email_address` and `id` are never rewritten.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::users)]
#[diesel(treat_none_as_null = true)]
pub struct IdentityChanges<'a> {
    pub name: &'a str,
    pub password_hash: Option<&'a str>,
    pub provider: AuthProvider,
    pub email_verified: bool,
    pub verification_token: Option<&'a str>,
    pub verification_token_expires_at: Option<DateTime<Utc>>,
    pub picture_url: Option<&'a str>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> IdentityChanges<'a> {
    pub fn from_identity(identity: &'a Identity, now: DateTime<Utc>) -> Self {
        Self {
            name: &identity.name,
            password_hash: identity.password_hash.as_deref(),
            provider: identity.provider,
            email_verified: identity.email_verified,
            verification_token: identity.verification_token.as_deref(),
            verification_token_expires_at: identity.verification_token_expires_at,
            picture_url: identity.picture_url.as_deref(),
            updated_at: now,
        }
    }
}

/// Display fields only. A `None` column is skipped, so nothing else on the
/// row is written.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::users)]
pub struct ProfileChanges<'a> {
    pub name: Option<&'a str>,
    pub picture_url: Option<Option<&'a str>>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_identity_starts_unverified_with_token() {
        let new = NewIdentity::local("Ada", "ada@example.com", "hash".into(), Duration::hours(24));
        assert_eq!(new.provider, AuthProvider::Local);
        assert!(!new.email_verified);
        assert!(new.verification_token.is_some());
        assert!(new.password_hash.is_some());
    }

    #[test]
    fn test_google_identity_is_verified_without_password() {
        let new = NewIdentity::google("Ada", "ada@example.com", None);
        assert_eq!(new.provider, AuthProvider::Google);
        assert!(new.email_verified);
        assert!(new.password_hash.is_none());
        assert!(new.verification_token.is_none());
    }

    #[test]
    fn test_verification_expiry() {
        let now = Utc::now();
        let mut identity =
            NewIdentity::local("Ada", "ada@example.com", "hash".into(), Duration::hours(1))
                .into_identity(now);
        assert!(!identity.verification_expired(now));

        identity.verification_token_expires_at = Some(now - Duration::seconds(1));
        assert!(identity.verification_expired(now));

        identity.verification_token_expires_at = None;
        assert!(!identity.verification_expired(now));
    }

    #[test]
    fn test_profile_hides_credentials() {
        let identity = NewIdentity::google("Ada", "ada@example.com", Some("p.png".into()))
            .into_identity(Utc::now());
        let profile = identity.profile();
        assert_eq!(profile.id, identity.id);
        assert_eq!(profile.picture_url.as_deref(), Some("p.png"));
        assert_eq!(profile.provider, AuthProvider::Google);
    }
}
