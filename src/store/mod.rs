//! Persistence contracts.
//!
//! Handlers and the request pipeline only see these traits. [`MemoryStore`]
//! implements all of them in-process.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::auth::{Permissions, Scope, Token, TokenHash, User};
use crate::catalog::{FilterError, Metadata, Movie, MovieFields, MovieQuery};

/// Store-level failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record not found")]
    RecordNotFound,

    #[error("A user with this email address already exists")]
    DuplicateEmail,

    #[error("Invalid query: {0}")]
    Query(#[from] FilterError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result of a version-conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The stored version matched; this is the new version
    Updated { version: i32 },
    /// No record with that id and version
    NoMatch,
}

/// A user about to be registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub activated: bool,
}

/// The mutable fields of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFields {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub activated: bool,
}

impl From<&User> for UserFields {
    fn from(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            activated: user.activated,
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> StoreResult<User>;

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_token(&self, token: &Token) -> StoreResult<()>;

    /// Owner of an unexpired token with the given hash and scope.
    async fn lookup_token_owner(
        &self,
        hash: &TokenHash,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<User>>;

    async fn delete_tokens_for_user(&self, user_id: i64, scope: Scope) -> StoreResult<()>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn load_permissions(&self, user_id: i64) -> StoreResult<Permissions>;

    async fn add_permissions(&self, user_id: i64, codes: &[&str]) -> StoreResult<()>;
}

#[async_trait]
pub trait MovieStore: Send + Sync {
    async fn insert_movie(&self, fields: MovieFields) -> StoreResult<Movie>;

    async fn get_movie(&self, id: i64) -> StoreResult<Option<Movie>>;

    /// Returns `false` when no movie had that id.
    async fn delete_movie(&self, id: i64) -> StoreResult<bool>;

    /// One page of matching movies plus pagination metadata.
    ///
    /// Fails with [`StoreError::Query`] if the sort key is not safelisted.
    async fn list_movies(&self, query: &MovieQuery) -> StoreResult<(Vec<Movie>, Metadata)>;
}

/// Single-statement conditional update of a versioned record.
///
/// Applies `fields` and increments the version only if the stored version
/// equals `expected_version`. No lock is held across calls.
#[async_trait]
pub trait ConditionalWrite<F: Send + 'static>: Send + Sync {
    async fn conditional_write(
        &self,
        id: i64,
        expected_version: i32,
        fields: F,
    ) -> StoreResult<WriteOutcome>;

    async fn exists(&self, id: i64) -> StoreResult<bool>;
}

/// Everything the HTTP layer needs from persistence.
pub trait Store:
    UserStore
    + TokenStore
    + PermissionStore
    + MovieStore
    + ConditionalWrite<MovieFields>
    + ConditionalWrite<UserFields>
{
}

impl<T> Store for T where
    T: UserStore
        + TokenStore
        + PermissionStore
        + MovieStore
        + ConditionalWrite<MovieFields>
        + ConditionalWrite<UserFields>
{
}
