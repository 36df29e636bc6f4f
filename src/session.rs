//! One active session per principal, addressed by user id or refresh token.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::error::ServiceError;
use crate::store::{SessionRepo, new_object_id};
use crate::token::{TokenPair, hash_refresh_token};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub refresh_token_hash: String,
    /// Unix seconds.
    pub expire_at: i64,
}

impl Session {
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expire_at <= now
    }
}

#[derive(Clone)]
pub struct SessionService {
    repo: Arc<dyn SessionRepo>,
    clock: Arc<dyn Clock>,
    refresh_ttl_hours: i64,
}

impl SessionService {
    #[must_use]
    pub fn new(repo: Arc<dyn SessionRepo>, clock: Arc<dyn Clock>, refresh_ttl_hours: i64) -> Self {
        Self {
            repo,
            clock,
            refresh_ttl_hours,
        }
    }

    /// Replace the principal's session with one bound to `pair.refresh_token`.
    ///
    /// # Errors
    /// Returns an internal error if the store fails.
    pub async fn set_session(&self, pair: &TokenPair) -> Result<Session, ServiceError> {
        self.repo.delete_by_user(&pair.principal_id).await?;
        let session = Session {
            id: new_object_id(),
            user_id: pair.principal_id.clone(),
            refresh_token_hash: hash_refresh_token(&pair.refresh_token),
            expire_at: self.clock.now_unix() + self.refresh_ttl_hours * 3600,
        };
        self.repo.insert(&session).await?;
        debug!(user_id = %session.user_id, expire_at = session.expire_at, "session rotated");
        Ok(session)
    }

    /// # Errors
    /// Returns `NotFound` when the principal has no session.
    pub async fn get_by_principal(&self, user_id: &str) -> Result<Session, ServiceError> {
        self.repo
            .get_by_user(user_id)
            .await?
            .ok_or(ServiceError::NotFound("session"))
    }

    /// # Errors
    /// Returns `NotFound` when no session holds this token.
    pub async fn get_by_refresh_token(&self, refresh_token: &str) -> Result<Session, ServiceError> {
        self.repo
            .get_by_token_hash(&hash_refresh_token(refresh_token))
            .await?
            .ok_or(ServiceError::NotFound("session"))
    }

    /// No-op when the principal has no session.
    ///
    /// # Errors
    /// Returns an internal error if the store fails.
    pub async fn delete_by_principal(&self, user_id: &str) -> Result<(), ServiceError> {
        self.repo.delete_by_user(user_id).await?;
        Ok(())
    }

    #[must_use]
    pub fn now_unix(&self) -> i64 {
        self.clock.now_unix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn pair(user: &str, refresh: &str) -> TokenPair {
        TokenPair {
            access_token: "access".into(),
            refresh_token: refresh.into(),
            principal_id: user.into(),
        }
    }

    #[tokio::test]
    async fn new_session_replaces_old() -> anyhow::Result<()> {
        let clock = ManualClock::default();
        let sessions = SessionService::new(Arc::new(MemoryStore::new()), Arc::new(clock.clone()), 2);

        let first = sessions.set_session(&pair("u1", "r1")).await?;
        assert_eq!(first.expire_at, clock.now_unix() + 7200);
        assert_ne!(first.refresh_token_hash, "r1");

        sessions.set_session(&pair("u1", "r2")).await?;
        assert!(sessions.get_by_refresh_token("r1").await.is_err());
        assert_eq!(sessions.get_by_refresh_token("r2").await?.user_id, "u1");
        assert_eq!(
            sessions.get_by_principal("u1").await?.refresh_token_hash,
            hash_refresh_token("r2")
        );
        Ok(())
    }

    #[tokio::test]
    async fn delete_without_session_is_noop() -> anyhow::Result<()> {
        let sessions = SessionService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::default()),
            1,
        );
        sessions.delete_by_principal("nobody").await?;
        assert!(matches!(
            sessions.get_by_principal("nobody").await,
            Err(ServiceError::NotFound(_))
        ));
        Ok(())
    }
}
