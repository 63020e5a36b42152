//! The auth gate: a request-pipeline stage in front of every route.
//!
//! Per request:
//! - public route: pass through, the cookie is not even read
//! - no access cookie: pass through unauthenticated
//! - valid access token for a known identity: install an
//!   [`AuthenticatedContext`] and continue
//! - anything else: 401 here, the handler never runs
//!
//! Whether an unauthenticated request is acceptable is decided downstream,
//! by handlers that take a [`CurrentUser`].

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

use super::identity::AuthenticatedContext;
use super::jwt::TokenKind;
use super::session::UNKNOWN_SUBJECT;

pub const AUTHENTICATION_REQUIRED: &str = "Authentication required";
/// A verified token whose subject could not be looked up still ends in 401.
pub const LOOKUP_FAILED: &str = "Authentication failed: identity lookup failed";

/// Paths reachable without a token, matched case-sensitively.
#[derive(Debug, Clone)]
pub struct PublicRoutes {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl PublicRoutes {
    pub fn new<E, P>(exact: E, prefixes: P) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            exact: exact.into_iter().map(Into::into).collect(),
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.exact.iter().any(|p| p == path)
            || self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

impl Default for PublicRoutes {
    fn default() -> Self {
        Self::new(
            [
                "/api/auth/refresh",
                "/api/auth/login",
                "/api/auth/register",
                "/api/auth/verify",
                "/api/auth/resend-verification",
                "/api/auth/user",
                "/api/auth/logout",
            ],
            ["/oauth2/", "/login/oauth2/", "/api/public/"],
        )
    }
}

/// Middleware function enforcing token state.
///
/// Use with `axum::middleware::from_fn_with_state`.
pub async fn auth_gate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if state.public_routes.matches(request.uri().path()) {
        return next.run(request).await;
    }

    let Some(token) = state.sessions.cookies().read_access(request.headers()) else {
        return next.run(request).await;
    };

    match resolve_access_token(&state, &token).await {
        Ok(context) => {
            tracing::debug!(
                "Authenticated request for {} ({}, {:?})",
                context.email,
                context.provider,
                context.authorities
            );
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Verify an access token and resolve its subject to a live identity.
pub async fn resolve_access_token(state: &AppState, token: &str) -> ApiResult<AuthenticatedContext> {
    let claims = state.codec.verify(token)?;
    if claims.kind != TokenKind::Access {
        return Err(ApiError::WrongTokenType);
    }

    let identity = state
        .store
        .find_by_email(&claims.sub)
        .await
        .map_err(|e| {
            tracing::error!("Identity lookup failed for {}: {:?}", claims.sub, e);
            ApiError::unauthenticated(LOOKUP_FAILED)
        })?
        .ok_or_else(|| {
            tracing::warn!("Rejected token: subject {} no longer exists", claims.sub);
            ApiError::unauthenticated(UNKNOWN_SUBJECT)
        })?;

    Ok(AuthenticatedContext::for_identity(&identity))
}

/// Extractor for handlers that need an authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthenticatedContext);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedContext>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| ApiError::unauthenticated(AUTHENTICATION_REQUIRED))
    }
}
