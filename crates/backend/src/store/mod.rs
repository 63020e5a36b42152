//! User persistence.
//!
//! The auth core only ever talks to [`UserStore`]; it never sees a
//! connection or a query. Two implementations ship with the crate:
//! an in-memory map for development and tests, and a Postgres store
//! built on diesel-async.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Identity, NewIdentity};

mod memory;
mod postgres;

pub use memory::MemoryUserStore;
pub use postgres::{establish_connection_pool, DbPool, PgUserStore};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Uniqueness violation, e.g. a second identity for the same email.
    #[error("{0} already exists")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Database connection error")]
    ConnectionPool(#[source] diesel_async::pooled_connection::deadpool::PoolError),

    #[error("Database error: {0}")]
    Database(#[source] diesel::result::Error),
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for StoreError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        StoreError::ConnectionPool(err)
    }
}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match err {
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(info.message().to_string())
            }
            Error::NotFound => StoreError::NotFound("Record".to_string()),
            other => StoreError::Database(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Lookup-by-email and save operations over identities.
///
/// Implementations are the authority on email uniqueness: `insert` must
/// fail with [`StoreError::Conflict`] rather than create a second identity
/// for an email that already exists, even under concurrent callers.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Exact, case-sensitive match on the email address.
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Identity>>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Identity>>;

    async fn find_by_verification_token(&self, token: &str) -> StoreResult<Option<Identity>>;

    async fn insert(&self, identity: NewIdentity) -> StoreResult<Identity>;

    /// Rewrite only the display fields of a stored identity in one write.
    ///
    /// `None` leaves a field untouched; `picture_url: Some(None)` clears the
    /// picture. Verification state, provider and password hash are never
    /// touched, whatever a concurrent writer did to them.
    async fn update_profile_fields(
        &self,
        id: Uuid,
        name: Option<&str>,
        picture_url: Option<Option<&str>>,
    ) -> StoreResult<Identity>;

    /// Persist every mutable column of `identity`, keyed by its id.
    async fn update(&self, identity: &Identity) -> StoreResult<Identity>;

    async fn delete(&self, id: Uuid) -> StoreResult<()>;
}
