//! Postgres backend over `sql/schema.sql`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use sqlx::{Connection, PgPool, postgres::PgPoolOptions};
use std::time::Duration;
use tracing::{Instrument, Span, info_span};

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

pub const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

#[must_use]
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn conflict_field(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("users_username_key") => "username",
        Some("users_email_key") => "email",
        Some("roles_name_key") => "name",
        Some("sessions_refresh_token_hash_key") => "refresh_token",
        _ => "id",
    }
}

fn write_error(err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        let constraint = match &err {
            sqlx::Error::Database(db_err) => db_err.constraint().map(str::to_string),
            _ => None,
        };
        return StoreError::Conflict(conflict_field(constraint.as_deref()));
    }
    StoreError::Database(err)
}

fn query_span(operation: &'static str, statement: &'static str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn encode<T: Serialize>(doc: &T) -> StoreResult<serde_json::Value> {
    Ok(serde_json::to_value(doc)?)
}

fn decode<T: DeserializeOwned>(doc: serde_json::Value) -> StoreResult<T> {
    Ok(serde_json::from_value(doc)?)
}

fn decode_all<T: DeserializeOwned>(docs: Vec<serde_json::Value>) -> StoreResult<Vec<T>> {
    docs.into_iter().map(decode).collect()
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `dsn`.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Apply `sql/schema.sql`. Every statement is idempotent.
    ///
    /// # Errors
    /// Returns an error if any statement fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(info_span!("db.migrate", db.system = "postgresql"))
            .await
            .context("Failed to apply database schema")?;
        Ok(())
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_doc<T: DeserializeOwned>(
        &self,
        statement: &'static str,
        key: &str,
    ) -> StoreResult<Option<T>> {
        let doc = sqlx::query_scalar::<_, serde_json::Value>(statement)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", statement))
            .await?;
        doc.map(decode).transpose()
    }

    async fn fetch_docs<T: DeserializeOwned>(
        &self,
        statement: &'static str,
        key: Option<&str>,
    ) -> StoreResult<Vec<T>> {
        let mut query = sqlx::query_scalar::<_, serde_json::Value>(statement);
        if let Some(key) = key {
            query = query.bind(key);
        }
        let docs = query
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", statement))
            .await?;
        decode_all(docs)
    }

    async fn delete_by_id(&self, statement: &'static str, id: &str) -> StoreResult<bool> {
        let result = sqlx::query(statement)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", statement))
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserRepo for PgStore {
    async fn insert(&self, user: &User) -> StoreResult<()> {
        let statement = "INSERT INTO users (id, username, email, doc) VALUES ($1, $2, $3, $4)";
        sqlx::query(statement)
            .bind(&user.id)
            .bind(&user.username)
            .bind(user.contact_info.unique_email())
            .bind(encode(user)?)
            .execute(&self.pool)
            .instrument(query_span("INSERT", statement))
            .await
            .map_err(write_error)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<User>> {
        self.fetch_doc("SELECT doc FROM users WHERE id = $1", id)
            .await
    }

    async fn get_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.fetch_doc("SELECT doc FROM users WHERE username = $1", username)
            .await
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.fetch_doc("SELECT doc FROM users WHERE email = $1", email)
            .await
    }

    async fn list(&self) -> StoreResult<Vec<User>> {
        self.fetch_docs("SELECT doc FROM users ORDER BY id", None)
            .await
    }

    async fn update(&self, user: &User) -> StoreResult<bool> {
        let statement = "UPDATE users SET username = $2, email = $3, doc = $4 WHERE id = $1";
        let result = sqlx::query(statement)
            .bind(&user.id)
            .bind(&user.username)
            .bind(user.contact_info.unique_email())
            .bind(encode(user)?)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", statement))
            .await
            .map_err(write_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        self.delete_by_id("DELETE FROM users WHERE id = $1", id)
            .await
    }
}

#[async_trait]
impl RoleRepo for PgStore {
    async fn insert(&self, role: &Role) -> StoreResult<()> {
        let statement = "INSERT INTO roles (id, name, doc) VALUES ($1, $2, $3)";
        sqlx::query(statement)
            .bind(&role.id)
            .bind(&role.name)
            .bind(encode(role)?)
            .execute(&self.pool)
            .instrument(query_span("INSERT", statement))
            .await
            .map_err(write_error)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Role>> {
        self.fetch_doc("SELECT doc FROM roles WHERE id = $1", id)
            .await
    }

    async fn get_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        self.fetch_doc("SELECT doc FROM roles WHERE name = $1", name)
            .await
    }

    async fn list(&self) -> StoreResult<Vec<Role>> {
        self.fetch_docs("SELECT doc FROM roles ORDER BY id", None)
            .await
    }

    async fn update(&self, role: &Role) -> StoreResult<bool> {
        let statement = "UPDATE roles SET name = $2, doc = $3 WHERE id = $1";
        let result = sqlx::query(statement)
            .bind(&role.id)
            .bind(&role.name)
            .bind(encode(role)?)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", statement))
            .await
            .map_err(write_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        self.delete_by_id("DELETE FROM roles WHERE id = $1", id)
            .await
    }
}

#[async_trait]
impl SessionRepo for PgStore {
    async fn insert(&self, session: &Session) -> StoreResult<()> {
        let statement = r"
            INSERT INTO sessions (id, user_id, refresh_token_hash, expire_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET id = EXCLUDED.id,
                refresh_token_hash = EXCLUDED.refresh_token_hash,
                expire_at = EXCLUDED.expire_at
        ";
        sqlx::query(statement)
            .bind(&session.id)
            .bind(&session.user_id)
            .bind(&session.refresh_token_hash)
            .bind(session.expire_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", statement))
            .await
            .map_err(write_error)?;
        Ok(())
    }

    async fn get_by_user(&self, user_id: &str) -> StoreResult<Option<Session>> {
        let statement = "SELECT id, user_id, refresh_token_hash, expire_at FROM sessions WHERE user_id = $1";
        Ok(sqlx::query_as::<_, Session>(statement)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", statement))
            .await?)
    }

    async fn get_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        let statement = "SELECT id, user_id, refresh_token_hash, expire_at FROM sessions WHERE refresh_token_hash = $1";
        Ok(sqlx::query_as::<_, Session>(statement)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", statement))
            .await?)
    }

    async fn delete_by_user(&self, user_id: &str) -> StoreResult<()> {
        self.delete_by_id("DELETE FROM sessions WHERE user_id = $1", user_id)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ResetCodeRepo for PgStore {
    async fn insert(&self, record: &ResetCode) -> StoreResult<()> {
        let statement =
            "INSERT INTO reset_pw_codes (id, email, code, expires_at) VALUES ($1, $2, $3, $4)";
        sqlx::query(statement)
            .bind(&record.id)
            .bind(&record.email)
            .bind(&record.code)
            .bind(record.expires_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", statement))
            .await
            .map_err(write_error)?;
        Ok(())
    }

    async fn find_by_code(&self, code: &str) -> StoreResult<Vec<ResetCode>> {
        let statement = "SELECT id, email, code, expires_at FROM reset_pw_codes WHERE code = $1";
        Ok(sqlx::query_as::<_, ResetCode>(statement)
            .bind(code)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", statement))
            .await?)
    }

    async fn delete_by_code(&self, email: &str, code: &str) -> StoreResult<u64> {
        let statement = "DELETE FROM reset_pw_codes WHERE code = $1 AND email = $2";
        let result = sqlx::query(statement)
            .bind(code)
            .bind(email)
            .execute(&self.pool)
            .instrument(query_span("DELETE", statement))
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: i64) -> StoreResult<u64> {
        let statement = "DELETE FROM reset_pw_codes WHERE expires_at <= $1";
        let result = sqlx::query(statement)
            .bind(now)
            .execute(&self.pool)
            .instrument(query_span("DELETE", statement))
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl FeedbackRepo for PgStore {
    async fn insert(&self, feedback: &Feedback) -> StoreResult<()> {
        let statement = "INSERT INTO feedbacks (id, user_id, created_at, doc) VALUES ($1, $2, $3, $4)";
        sqlx::query(statement)
            .bind(&feedback.id)
            .bind(&feedback.user_id)
            .bind(feedback.created_at)
            .bind(encode(feedback)?)
            .execute(&self.pool)
            .instrument(query_span("INSERT", statement))
            .await
            .map_err(write_error)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Feedback>> {
        self.fetch_doc("SELECT doc FROM feedbacks WHERE id = $1", id)
            .await
    }

    async fn list(&self) -> StoreResult<Vec<Feedback>> {
        self.fetch_docs("SELECT doc FROM feedbacks ORDER BY created_at, id", None)
            .await
    }

    async fn list_by_user(&self, user_id: &str) -> StoreResult<Vec<Feedback>> {
        self.fetch_docs(
            "SELECT doc FROM feedbacks WHERE user_id = $1 ORDER BY created_at, id",
            Some(user_id),
        )
        .await
    }

    async fn update(&self, feedback: &Feedback) -> StoreResult<bool> {
        let statement = "UPDATE feedbacks SET doc = $2 WHERE id = $1";
        let result = sqlx::query(statement)
            .bind(&feedback.id)
            .bind(encode(feedback)?)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", statement))
            .await
            .map_err(write_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl StatsRepo for PgStore {
    async fn get(&self, user_id: &str) -> StoreResult<Option<UserStats>> {
        self.fetch_doc("SELECT doc FROM user_stats WHERE user_id = $1", user_id)
            .await
    }

    async fn upsert(&self, stats: &UserStats) -> StoreResult<()> {
        let statement = r"
            INSERT INTO user_stats (user_id, doc) VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET doc = EXCLUDED.doc
        ";
        sqlx::query(statement)
            .bind(&stats.user_id)
            .bind(encode(stats)?)
            .execute(&self.pool)
            .instrument(query_span("INSERT", statement))
            .await
            .map_err(write_error)?;
        Ok(())
    }
}

#[async_trait]
impl StoreHealth for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }
}
