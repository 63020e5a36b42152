//! Stateless cookie/JWT authentication service.

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

pub mod auth;
pub mod config;
pub mod error;
pub mod mailer;
pub mod models;
pub mod schema;
pub mod store;

use auth::{
    handlers, CookieAdapter, CredentialHasher, IdentityProvider, PublicRoutes, SessionService,
    TokenCodec,
};
use config::AppConfig;
use mailer::VerificationMailer;
use store::UserStore;

/// Shared application state. Everything in it is immutable after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn UserStore>,
    pub codec: Arc<TokenCodec>,
    pub sessions: Arc<SessionService>,
    pub provider: Option<Arc<dyn IdentityProvider>>,
    pub public_routes: Arc<PublicRoutes>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn UserStore>,
        hasher: Arc<dyn CredentialHasher>,
        mailer: Arc<dyn VerificationMailer>,
        provider: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        let codec = TokenCodec::new(&config.jwt);
        let cookies = CookieAdapter::new(
            config.cookie.clone(),
            config.jwt.access_token_ttl,
            config.jwt.refresh_token_ttl,
        );
        let sessions = SessionService::new(
            store.clone(),
            hasher,
            mailer,
            codec.clone(),
            cookies,
            config.verification.clone(),
            config.app_base_url.clone(),
        );

        Self {
            config: Arc::new(config),
            store,
            codec: Arc::new(codec),
            sessions: Arc::new(sessions),
            provider,
            public_routes: Arc::new(PublicRoutes::default()),
        }
    }
}

/// All routes, behind the auth gate.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/refresh", post(handlers::refresh))
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/auth/user", get(handlers::current_user))
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/verify", get(handlers::verify_email))
        .route(
            "/api/auth/resend-verification",
            post(handlers::resend_verification),
        )
        .route("/api/auth/update-profile", put(handlers::update_profile))
        .route("/api/auth/delete", post(handlers::delete_account))
        // Provider redirect endpoints
        .route(
            "/oauth2/authorization/google",
            get(handlers::oauth_start),
        )
        .route("/login/oauth2/code/google", get(handlers::oauth_callback))
        .route("/api/public/health", get(handlers::health))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_gate))
        .with_state(state)
}
