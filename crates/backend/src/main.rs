use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{header, Method};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vista_auth::{
    auth::{Argon2Hasher, GoogleOAuthClient, IdentityProvider},
    build_router,
    config::AppConfig,
    mailer::LogMailer,
    store::{establish_connection_pool, MemoryUserStore, PgUserStore, UserStore},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vista_auth=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    let store: Arc<dyn UserStore> = match &config.database_url {
        Some(database_url) => {
            let pool = establish_connection_pool(database_url)?;
            tracing::info!("Using Postgres user store");
            Arc::new(PgUserStore::new(pool))
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set, using in-memory user store (accounts are lost on restart)"
            );
            Arc::new(MemoryUserStore::new())
        }
    };

    let provider: Option<Arc<dyn IdentityProvider>> = match &config.oauth.google {
        Some(google) => {
            tracing::info!("Google OAuth enabled with client {}", google.client_id);
            Some(Arc::new(GoogleOAuthClient::new(google.clone())) as Arc<dyn IdentityProvider>)
        }
        None => {
            tracing::warn!("Google OAuth not configured, provider login is disabled");
            None
        }
    };

    let cors = build_cors_layer(config.cors_allowed_origins.as_deref());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let state = AppState::new(
        config,
        store,
        Arc::new(Argon2Hasher::default()),
        Arc::new(LogMailer),
        provider,
    );

    let app = build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build CORS layer from the configured origins.
///
/// Credentialed requests are required for the auth cookies, so an explicit
/// origin list is needed in production. Without one, CORS is permissive.
fn build_cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let origins: Vec<_> = allowed_origins
        .unwrap_or_default()
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!(
            "CORS_ALLOWED_ORIGINS not set, using permissive CORS (not recommended for production)"
        );
        return CorsLayer::permissive();
    }

    tracing::info!("CORS configured for origins: {:?}", origins);
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
