//! Login, refresh and logout, plus the account lifecycle around them.
//!
//! Every successful login, whether by password or through a provider,
//! produces an [`AuthenticatedIdentity`] first and only then a [`Session`].
//! Token issuance never looks at how the identity was established.

use std::sync::Arc;

use anyhow::anyhow;
use axum::response::Response;
use chrono::Utc;
use shared_types::{RegisterRequest, UpdateProfileRequest};
use uuid::Uuid;

use crate::config::VerificationConfig;
use crate::error::{ApiError, ApiResult};
use crate::mailer::{verification_link, VerificationMail, VerificationMailer};
use crate::models::{Identity, NewIdentity};
use crate::store::{StoreError, UserStore};

use super::cookies::CookieAdapter;
use super::identity::{AuthenticatedContext, AuthenticatedIdentity};
use super::jwt::{TokenCodec, TokenKind};
use super::password::CredentialHasher;
use super::reconcile::{IdentityReconciler, ProviderProfile};

pub const EMAIL_IN_USE: &str = "Email is already in use!";
pub const NO_REFRESH_COOKIE: &str = "No authentication found";
pub const UNKNOWN_SUBJECT: &str = "Authentication failed: unknown subject";

/// A freshly issued token pair for one identity.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn CredentialHasher>,
    mailer: Arc<dyn VerificationMailer>,
    codec: TokenCodec,
    cookies: CookieAdapter,
    reconciler: IdentityReconciler,
    verification: VerificationConfig,
    app_base_url: String,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn UserStore>,
        hasher: Arc<dyn CredentialHasher>,
        mailer: Arc<dyn VerificationMailer>,
        codec: TokenCodec,
        cookies: CookieAdapter,
        verification: VerificationConfig,
        app_base_url: String,
    ) -> Self {
        Self {
            reconciler: IdentityReconciler::new(store.clone()),
            store,
            hasher,
            mailer,
            codec,
            cookies,
            verification,
            app_base_url,
        }
    }

    pub fn cookies(&self) -> &CookieAdapter {
        &self.cookies
    }

    /// Check email and password. The password is compared exactly once.
    ///
    /// Unknown email and wrong password both yield
    /// [`ApiError::InvalidCredentials`]. An unverified account is refused
    /// before its password is looked at.
    pub async fn authenticate(&self, email: &str, password: &str) -> ApiResult<AuthenticatedIdentity> {
        let Some(identity) = self.store.find_by_email(email).await? else {
            tracing::info!("Login attempt for unknown email: {}", email);
            return Err(ApiError::InvalidCredentials);
        };

        if !identity.email_verified {
            tracing::info!("Login attempt for unverified email: {}", email);
            return Err(ApiError::EmailNotVerified);
        }

        let Some(hash) = identity.password_hash.clone() else {
            tracing::info!("Password login attempt for provider-only account: {}", email);
            return Err(ApiError::InvalidCredentials);
        };

        let hasher = self.hasher.clone();
        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| anyhow!("password verification task failed: {}", e))??;

        if !matches {
            tracing::warn!("Wrong password for: {}", email);
            return Err(ApiError::InvalidCredentials);
        }

        Ok(AuthenticatedIdentity::Local(identity))
    }

    pub async fn login(&self, email: &str, password: &str) -> ApiResult<Session> {
        let authenticated = self.authenticate(email, password).await?;
        let session = self.establish(authenticated)?;
        tracing::info!("Successful login for: {}", session.identity.email_address);
        Ok(session)
    }

    /// Reconcile a provider assertion, then issue tokens exactly as for a
    /// password login.
    pub async fn complete_provider_login(&self, profile: ProviderProfile) -> ApiResult<Session> {
        let authenticated = self.reconciler.reconcile(profile).await?;
        if let AuthenticatedIdentity::Provider { created: true, identity } = &authenticated {
            tracing::info!("First provider login created account {}", identity.id);
        }
        let session = self.establish(authenticated)?;
        tracing::info!(
            "Successful provider login for: {}",
            session.identity.email_address
        );
        Ok(session)
    }

    /// Issue an access and a refresh token for `authenticated`.
    pub fn establish(&self, authenticated: AuthenticatedIdentity) -> ApiResult<Session> {
        let access_token = self.issue(authenticated.email(), TokenKind::Access)?;
        let refresh_token = self.issue(authenticated.email(), TokenKind::Refresh)?;
        Ok(Session {
            identity: authenticated.into_identity(),
            access_token,
            refresh_token,
        })
    }

    pub fn write_session(&self, response: &mut Response, session: &Session) {
        self.cookies
            .write_pair(response, &session.access_token, &session.refresh_token);
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The refresh token itself is not reissued, so its expiry is never
    /// extended.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> ApiResult<String> {
        let token = refresh_token.ok_or_else(|| ApiError::unauthenticated(NO_REFRESH_COOKIE))?;
        let claims = self.codec.verify(token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(ApiError::WrongTokenType);
        }

        let identity = self
            .store
            .find_by_email(&claims.sub)
            .await?
            .ok_or_else(|| ApiError::unauthenticated(UNKNOWN_SUBJECT))?;

        tracing::debug!("Refreshing access token for: {}", identity.email_address);
        self.issue(&identity.email_address, TokenKind::Access)
    }

    /// Clear both cookies. Always succeeds, with or without a session.
    pub fn logout(&self, response: &mut Response) {
        self.cookies.clear_pair(response);
    }

    /// Create an unverified password account and mail its verification link.
    pub async fn register(&self, request: RegisterRequest) -> ApiResult<Identity> {
        let name = request.username.trim();
        let email = request.email_address.trim();
        if name.is_empty() {
            return Err(ApiError::bad_request("Username is required"));
        }
        if email.is_empty() || !email.contains('@') {
            return Err(ApiError::bad_request("A valid email address is required"));
        }
        if request.password.is_empty() {
            return Err(ApiError::bad_request("Password is required"));
        }
        if request.password != request.verify_password {
            return Err(ApiError::bad_request("Passwords do not match"));
        }
        if self.store.find_by_email(email).await?.is_some() {
            return Err(ApiError::bad_request(EMAIL_IN_USE));
        }

        let hasher = self.hasher.clone();
        let password = request.password;
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| anyhow!("password hashing task failed: {}", e))??;

        let identity = match self
            .store
            .insert(NewIdentity::local(name, email, hash, self.verification.token_ttl))
            .await
        {
            Ok(identity) => identity,
            Err(StoreError::Conflict(_)) => return Err(ApiError::bad_request(EMAIL_IN_USE)),
            Err(e) => return Err(e.into()),
        };

        tracing::info!("Registered new account {} for {}", identity.id, email);
        self.send_verification(&identity).await;
        Ok(identity)
    }

    pub async fn verify_email(&self, token: &str) -> ApiResult<Identity> {
        let mut identity = self
            .store
            .find_by_verification_token(token)
            .await?
            .ok_or_else(|| ApiError::bad_request("Invalid verification token"))?;

        if identity.verification_expired(Utc::now()) {
            return Err(ApiError::bad_request("Verification token has expired"));
        }

        identity.email_verified = true;
        identity.verification_token = None;
        identity.verification_token_expires_at = None;
        let identity = self.store.update(&identity).await?;

        tracing::info!("Email verified for: {}", identity.email_address);
        Ok(identity)
    }

    /// Replace the verification token with a fresh, shorter-lived one.
    pub async fn resend_verification(&self, email: &str) -> ApiResult<()> {
        let mut identity = self
            .store
            .find_by_email(email)
            .await?
            .ok_or_else(|| ApiError::bad_request("No account found for this email"))?;

        if identity.email_verified {
            return Err(ApiError::bad_request("Email is already verified"));
        }

        identity.verification_token = Some(Uuid::new_v4().to_string());
        identity.verification_token_expires_at =
            Some(Utc::now() + self.verification.resend_token_ttl);
        let identity = self.store.update(&identity).await?;

        self.send_verification(&identity).await;
        Ok(())
    }

    pub async fn update_profile(
        &self,
        context: &AuthenticatedContext,
        request: UpdateProfileRequest,
    ) -> ApiResult<Identity> {
        let name = match request.name.as_deref().map(str::trim) {
            Some("") => return Err(ApiError::bad_request("Name cannot be empty")),
            name => name,
        };
        // An empty string removes the picture.
        let picture_url = request
            .picture_url
            .as_deref()
            .map(|url| Some(url).filter(|url| !url.is_empty()));

        match self
            .store
            .update_profile_fields(context.identity_id, name, picture_url)
            .await
        {
            Ok(identity) => Ok(identity),
            Err(StoreError::NotFound(_)) => Err(ApiError::not_found("User")),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete_account(&self, context: &AuthenticatedContext) -> ApiResult<()> {
        match self.store.delete(context.identity_id).await {
            Ok(()) => {
                tracing::info!("Deleted account: {}", context.email);
                Ok(())
            }
            Err(StoreError::NotFound(_)) => Err(ApiError::not_found("User")),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn current_identity(&self, context: &AuthenticatedContext) -> ApiResult<Identity> {
        self.store
            .find_by_id(context.identity_id)
            .await?
            .ok_or_else(|| ApiError::not_found("User"))
    }

    fn issue(&self, subject: &str, kind: TokenKind) -> ApiResult<String> {
        self.codec
            .issue_kind(subject, kind)
            .map_err(|e| ApiError::Internal(anyhow!("failed to issue {} token: {}", kind.as_str(), e)))
    }

    async fn send_verification(&self, identity: &Identity) {
        let Some(token) = identity.verification_token.as_deref() else {
            return;
        };
        let mail = VerificationMail {
            to: identity.email_address.clone(),
            name: identity.name.clone(),
            link: verification_link(&self.app_base_url, token),
        };
        // The account stands even if delivery fails; the user can ask again.
        if let Err(e) = self.mailer.send_verification(mail).await {
            tracing::error!(
                "Failed to send verification mail to {}: {:?}",
                identity.email_address,
                e
            );
        }
    }
}
