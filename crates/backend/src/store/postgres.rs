use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager, ManagerConfig},
    AsyncPgConnection, RunQueryDsl,
};
use uuid::Uuid;

use super::{StoreResult, UserStore};
use crate::models::{Identity, IdentityChanges, NewIdentity, ProfileChanges};
use crate::schema::users;

pub type DbPool = Pool<AsyncPgConnection>;

async fn establish_tls_connection(config: String) -> diesel::ConnectionResult<AsyncPgConnection> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

    let (client, connection) = tokio_postgres::connect(&config, tls)
        .await
        .map_err(|e| diesel::ConnectionError::BadConnection(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    AsyncPgConnection::try_from(client).await
}

pub fn establish_connection_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let mut manager_config = ManagerConfig::default();
    manager_config.custom_setup =
        Box::new(|url| Box::pin(establish_tls_connection(url.to_string())));

    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new_with_config(
        database_url,
        manager_config,
    );
    let pool = Pool::builder(config).build()?;

    Ok(pool)
}

/// Identities in the `users` table. The unique index on `email_address`
/// turns a racing second insert into `StoreError::Conflict`.
#[derive(Clone)]
pub struct PgUserStore {
    pool: DbPool,
}

impl PgUserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        let mut conn = self.pool.get().await?;

        let identity = users::table
            .filter(users::email_address.eq(email))
            .select(Identity::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        Ok(identity)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Identity>> {
        let mut conn = self.pool.get().await?;

        let identity = users::table
            .find(id)
            .select(Identity::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        Ok(identity)
    }

    async fn find_by_verification_token(&self, token: &str) -> StoreResult<Option<Identity>> {
        let mut conn = self.pool.get().await?;

        let identity = users::table
            .filter(users::verification_token.eq(token))
            .select(Identity::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        Ok(identity)
    }

    async fn insert(&self, identity: NewIdentity) -> StoreResult<Identity> {
        let mut conn = self.pool.get().await?;

        let created = diesel::insert_into(users::table)
            .values(&identity)
            .returning(Identity::as_returning())
            .get_result(&mut conn)
            .await?;

        Ok(created)
    }

    async fn update_profile_fields(
        &self,
        id: Uuid,
        name: Option<&str>,
        picture_url: Option<Option<&str>>,
    ) -> StoreResult<Identity> {
        let mut conn = self.pool.get().await?;

        let updated = diesel::update(users::table.find(id))
            .set(ProfileChanges {
                name,
                picture_url,
                updated_at: Utc::now(),
            })
            .returning(Identity::as_returning())
            .get_result(&mut conn)
            .await?;

        Ok(updated)
    }

    async fn update(&self, identity: &Identity) -> StoreResult<Identity> {
        let mut conn = self.pool.get().await?;

        let updated = diesel::update(users::table.find(identity.id))
            .set(IdentityChanges::from_identity(identity, Utc::now()))
            .returning(Identity::as_returning())
            .get_result(&mut conn)
            .await?;

        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;

        let deleted = diesel::delete(users::table.find(id))
            .execute(&mut conn)
            .await?;

        if deleted == 0 {
            return Err(super::StoreError::NotFound(format!("User {}", id)));
        }
        Ok(())
    }
}
