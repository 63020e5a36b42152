//! Cookie-carried JWT authentication with password and Google login.
//!
//! This module provides:
//! - token issuance and verification ([`jwt`])
//! - the access/refresh cookie pair ([`cookies`])
//! - the `auth_gate` middleware in front of every route
//! - login, refresh, logout and account lifecycle ([`session`])
//! - reconciliation of provider logins onto local identities

pub mod cookies;
pub mod handlers;
pub mod identity;
pub mod jwt;
pub mod middleware;
pub mod oauth;
pub mod password;
pub mod reconcile;
pub mod session;

pub use cookies::CookieAdapter;
pub use identity::{AuthenticatedContext, AuthenticatedIdentity, Authority};
pub use jwt::{Claims, TokenCodec, TokenError, TokenKind};
pub use middleware::{auth_gate, CurrentUser, PublicRoutes};
pub use oauth::{GoogleOAuthClient, IdentityProvider};
pub use password::{Argon2Hasher, Argon2Params, CredentialHasher};
pub use reconcile::{IdentityReconciler, ProviderProfile};
pub use session::{Session, SessionService};
