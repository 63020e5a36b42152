//! Who a request or a login is acting for.

use serde::{Deserialize, Serialize};
use shared_types::AuthProvider;
use uuid::Uuid;

use crate::models::Identity;

/// The outcome of a successful login, whichever path produced it.
///
/// Both variants converge on [`AuthenticatedIdentity::email`], which is the
/// token subject. Token issuance never inspects which variant it was given.
#[derive(Debug, Clone)]
pub enum AuthenticatedIdentity {
    /// Email and password checked against the stored hash.
    Local(Identity),
    /// Reconciled from an external provider's assertion.
    Provider {
        identity: Identity,
        /// True when reconciliation created the record.
        created: bool,
    },
}

impl AuthenticatedIdentity {
    pub fn email(&self) -> &str {
        &self.identity().email_address
    }

    pub fn identity(&self) -> &Identity {
        match self {
            AuthenticatedIdentity::Local(identity) => identity,
            AuthenticatedIdentity::Provider { identity, .. } => identity,
        }
    }

    pub fn into_identity(self) -> Identity {
        match self {
            AuthenticatedIdentity::Local(identity) => identity,
            AuthenticatedIdentity::Provider { identity, .. } => identity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Authority {
    User,
}

/// Request-scoped result of a successful gate check.
///
/// Lives in the request's extensions and is dropped with the request.
#[derive(Debug, Clone)]
pub struct AuthenticatedContext {
    pub identity_id: Uuid,
    pub email: String,
    pub provider: AuthProvider,
    pub authorities: Vec<Authority>,
}

impl AuthenticatedContext {
    pub fn for_identity(identity: &Identity) -> Self {
        Self {
            identity_id: identity.id,
            email: identity.email_address.clone(),
            provider: identity.provider,
            authorities: vec![Authority::User],
        }
    }
}
