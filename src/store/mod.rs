//! Collection contracts and the two backends that implement them.
//!
//! Each collection is its own async trait so services only see the
//! collections they use. [`Stores`] bundles one handle per collection.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PgStore, is_unique_violation};

use async_trait::async_trait;
use rand::{RngCore, rngs::OsRng};
use std::sync::Arc;
use thiserror::Error;

use crate::feedback::Feedback;
use crate::reset_password::ResetCode;
use crate::role::models::Role;
use crate::session::Session;
use crate::stats::UserStats;
use crate::user::models::User;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique index rejected the write; carries the field name.
    #[error("duplicate {0}")]
    Conflict(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("document codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// New document id: 24 lowercase hex chars from 12 random bytes.
#[must_use]
pub fn new_object_id() -> String {
    let mut bytes = [0u8; 12];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn insert(&self, user: &User) -> StoreResult<()>;
    async fn get(&self, id: &str) -> StoreResult<Option<User>>;
    async fn get_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn get_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn list(&self) -> StoreResult<Vec<User>>;
    /// Replaces the stored document. Returns `false` when no row matched.
    async fn update(&self, user: &User) -> StoreResult<bool>;
    async fn delete(&self, id: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait RoleRepo: Send + Sync {
    async fn insert(&self, role: &Role) -> StoreResult<()>;
    async fn get(&self, id: &str) -> StoreResult<Option<Role>>;
    async fn get_by_name(&self, name: &str) -> StoreResult<Option<Role>>;
    async fn list(&self) -> StoreResult<Vec<Role>>;
    async fn update(&self, role: &Role) -> StoreResult<bool>;
    async fn delete(&self, id: &str) -> StoreResult<bool>;
}

/// At most one row per user. `insert` supersedes any existing row for the
/// same user, so two racing logins resolve to the later write.
#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn insert(&self, session: &Session) -> StoreResult<()>;
    async fn get_by_user(&self, user_id: &str) -> StoreResult<Option<Session>>;
    async fn get_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>>;
    async fn delete_by_user(&self, user_id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait ResetCodeRepo: Send + Sync {
    async fn insert(&self, record: &ResetCode) -> StoreResult<()>;
    async fn find_by_code(&self, code: &str) -> StoreResult<Vec<ResetCode>>;
    async fn delete_by_code(&self, email: &str, code: &str) -> StoreResult<u64>;
    /// Deletes every record with `expires_at <= now`.
    async fn delete_expired(&self, now: i64) -> StoreResult<u64>;
}

#[async_trait]
pub trait FeedbackRepo: Send + Sync {
    async fn insert(&self, feedback: &Feedback) -> StoreResult<()>;
    async fn get(&self, id: &str) -> StoreResult<Option<Feedback>>;
    async fn list(&self) -> StoreResult<Vec<Feedback>>;
    async fn list_by_user(&self, user_id: &str) -> StoreResult<Vec<Feedback>>;
    async fn update(&self, feedback: &Feedback) -> StoreResult<bool>;
}

#[async_trait]
pub trait StatsRepo: Send + Sync {
    async fn get(&self, user_id: &str) -> StoreResult<Option<UserStats>>;
    async fn upsert(&self, stats: &UserStats) -> StoreResult<()>;
}

#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserRepo>,
    pub roles: Arc<dyn RoleRepo>,
    pub sessions: Arc<dyn SessionRepo>,
    pub reset_codes: Arc<dyn ResetCodeRepo>,
    pub feedback: Arc<dyn FeedbackRepo>,
    pub stats: Arc<dyn StatsRepo>,
    pub health: Arc<dyn StoreHealth>,
}

impl Stores {
    fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserRepo
            + RoleRepo
            + SessionRepo
            + ResetCodeRepo
            + FeedbackRepo
            + StatsRepo
            + StoreHealth
            + 'static,
    {
        Self {
            users: backend.clone(),
            roles: backend.clone(),
            sessions: backend.clone(),
            reset_codes: backend.clone(),
            feedback: backend.clone(),
            stats: backend.clone(),
            health: backend,
        }
    }

    #[must_use]
    pub fn memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::new()))
    }

    #[must_use]
    pub fn postgres(store: PgStore) -> Self {
        Self::from_backend(Arc::new(store))
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_ids_are_24_hex_chars() {
        let id = new_object_id();
        assert_eq!(id.len(), 24);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(id, new_object_id());
    }
}
