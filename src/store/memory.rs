//! In-process backend. Same uniqueness rules as the Postgres schema.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{
    FeedbackRepo, ResetCodeRepo, RoleRepo, SessionRepo, StatsRepo, StoreError, StoreHealth,
    StoreResult, UserRepo,
};
use crate::feedback::Feedback;
use crate::reset_password::ResetCode;
use crate::role::models::Role;
use crate::session::Session;
use crate::stats::UserStats;
use crate::user::models::User;

#[derive(Debug, Default)]
pub struct MemoryStore {
    // BTreeMap keeps list order stable for callers.
    users: RwLock<BTreeMap<String, User>>,
    roles: RwLock<BTreeMap<String, Role>>,
    sessions: RwLock<HashMap<String, Session>>,
    reset_codes: RwLock<Vec<ResetCode>>,
    feedback: RwLock<BTreeMap<String, Feedback>>,
    stats: RwLock<HashMap<String, UserStats>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn user_conflict(existing: &BTreeMap<String, User>, user: &User) -> Option<&'static str> {
    let email = user.contact_info.unique_email();
    for other in existing.values().filter(|other| other.id != user.id) {
        if other.username == user.username {
            return Some("username");
        }
        if email.is_some() && other.contact_info.unique_email() == email {
            return Some("email");
        }
    }
    None
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn insert(&self, user: &User) -> StoreResult<()> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(StoreError::Conflict("id"));
        }
        if let Some(field) = user_conflict(&users, user) {
            return Err(StoreError::Conflict(field));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.username == username).cloned())
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|user| user.contact_info.unique_email() == Some(email))
            .cloned())
    }

    async fn list(&self) -> StoreResult<Vec<User>> {
        Ok(self.users.read().await.values().cloned().collect())
    }

    async fn update(&self, user: &User) -> StoreResult<bool> {
        let mut users = self.users.write().await;
        if !users.contains_key(&user.id) {
            return Ok(false);
        }
        if let Some(field) = user_conflict(&users, user) {
            return Err(StoreError::Conflict(field));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(true)
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        Ok(self.users.write().await.remove(id).is_some())
    }
}

#[async_trait]
impl RoleRepo for MemoryStore {
    async fn insert(&self, role: &Role) -> StoreResult<()> {
        let mut roles = self.roles.write().await;
        if roles.contains_key(&role.id) {
            return Err(StoreError::Conflict("id"));
        }
        if roles.values().any(|other| other.name == role.name) {
            return Err(StoreError::Conflict("name"));
        }
        roles.insert(role.id.clone(), role.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Role>> {
        Ok(self.roles.read().await.get(id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let roles = self.roles.read().await;
        Ok(roles.values().find(|role| role.name == name).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<Role>> {
        Ok(self.roles.read().await.values().cloned().collect())
    }

    async fn update(&self, role: &Role) -> StoreResult<bool> {
        let mut roles = self.roles.write().await;
        if !roles.contains_key(&role.id) {
            return Ok(false);
        }
        if roles
            .values()
            .any(|other| other.id != role.id && other.name == role.name)
        {
            return Err(StoreError::Conflict("name"));
        }
        roles.insert(role.id.clone(), role.clone());
        Ok(true)
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        Ok(self.roles.write().await.remove(id).is_some())
    }
}

#[async_trait]
impl SessionRepo for MemoryStore {
    async fn insert(&self, session: &Session) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.values().any(|other| {
            other.user_id != session.user_id && other.refresh_token_hash == session.refresh_token_hash
        }) {
            return Err(StoreError::Conflict("refresh_token"));
        }
        sessions.insert(session.user_id.clone(), session.clone());
        Ok(())
    }

    async fn get_by_user(&self, user_id: &str) -> StoreResult<Option<Session>> {
        Ok(self.sessions.read().await.get(user_id).cloned())
    }

    async fn get_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .find(|session| session.refresh_token_hash == token_hash)
            .cloned())
    }

    async fn delete_by_user(&self, user_id: &str) -> StoreResult<()> {
        self.sessions.write().await.remove(user_id);
        Ok(())
    }
}

#[async_trait]
impl ResetCodeRepo for MemoryStore {
    async fn insert(&self, record: &ResetCode) -> StoreResult<()> {
        self.reset_codes.write().await.push(record.clone());
        Ok(())
    }

    async fn find_by_code(&self, code: &str) -> StoreResult<Vec<ResetCode>> {
        let records = self.reset_codes.read().await;
        Ok(records
            .iter()
            .filter(|record| record.code == code)
            .cloned()
            .collect())
    }

    async fn delete_by_code(&self, email: &str, code: &str) -> StoreResult<u64> {
        let mut records = self.reset_codes.write().await;
        let before = records.len();
        records.retain(|record| !(record.code == code && record.email == email));
        Ok(u64::try_from(before - records.len()).unwrap_or(u64::MAX))
    }

    async fn delete_expired(&self, now: i64) -> StoreResult<u64> {
        let mut records = self.reset_codes.write().await;
        let before = records.len();
        records.retain(|record| record.expires_at > now);
        Ok(u64::try_from(before - records.len()).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl FeedbackRepo for MemoryStore {
    async fn insert(&self, feedback: &Feedback) -> StoreResult<()> {
        let mut entries = self.feedback.write().await;
        if entries.contains_key(&feedback.id) {
            return Err(StoreError::Conflict("id"));
        }
        entries.insert(feedback.id.clone(), feedback.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Feedback>> {
        Ok(self.feedback.read().await.get(id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<Feedback>> {
        Ok(self.feedback.read().await.values().cloned().collect())
    }

    async fn list_by_user(&self, user_id: &str) -> StoreResult<Vec<Feedback>> {
        let entries = self.feedback.read().await;
        Ok(entries
            .values()
            .filter(|feedback| feedback.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update(&self, feedback: &Feedback) -> StoreResult<bool> {
        let mut entries = self.feedback.write().await;
        match entries.get_mut(&feedback.id) {
            Some(entry) => {
                *entry = feedback.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl StatsRepo for MemoryStore {
    async fn get(&self, user_id: &str) -> StoreResult<Option<UserStats>> {
        Ok(self.stats.read().await.get(user_id).cloned())
    }

    async fn upsert(&self, stats: &UserStats) -> StoreResult<()> {
        self.stats
            .write()
            .await
            .insert(stats.user_id.clone(), stats.clone());
        Ok(())
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
