//! Password reset through short-lived six digit codes sent by email.
//!
//! Records are never replaced: every `send_code` adds one, and verification
//! looks for a record matching code, email and expiry together. Consumed
//! records are deleted; expired ones are removed by [`ResetPasswordService::spawn_sweeper`].

use rand::{Rng, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::error::ServiceError;
use crate::mailer::{MailKind, MailQueue};
use crate::store::{ResetCodeRepo, new_object_id};
use crate::user::UserService;

pub const CODE_TTL_SECONDS: i64 = 3 * 60;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ResetCode {
    pub id: String,
    pub email: String,
    pub code: String,
    /// Unix seconds.
    pub expires_at: i64,
}

/// Uniform, zero-padded six digit code.
#[must_use]
pub fn generate_code() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000u32))
}

#[derive(Clone)]
pub struct ResetPasswordService {
    codes: Arc<dyn ResetCodeRepo>,
    users: UserService,
    mailer: MailQueue,
    clock: Arc<dyn Clock>,
}

impl ResetPasswordService {
    #[must_use]
    pub fn new(
        codes: Arc<dyn ResetCodeRepo>,
        users: UserService,
        mailer: MailQueue,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            codes,
            users,
            mailer,
            clock,
        }
    }

    /// # Errors
    /// `NotFound` when no user has `email`; internal on store or queue failure.
    pub async fn send_code(&self, email: &str) -> Result<ResetCode, ServiceError> {
        let email = email.trim();
        let user = self
            .users
            .find_by_email_privileged(email)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;
        let record = ResetCode {
            id: new_object_id(),
            email: email.to_string(),
            code: generate_code(),
            expires_at: self.clock.now_unix() + CODE_TTL_SECONDS,
        };
        self.codes.insert(&record).await?;
        self.mailer.enqueue(
            MailKind::ResetPassword,
            email,
            &[("code", record.code.as_str()), ("username", user.username.as_str())],
        )?;
        info!(user_id = %user.id, "reset code issued");
        Ok(record)
    }

    /// # Errors
    /// `ResetNotFound` for an unknown code, `CodeInvalid` when it belongs to
    /// another email, `CodeExpired` when every matching record has expired.
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<ResetCode, ServiceError> {
        let email = email.trim();
        let records = self.codes.find_by_code(code.trim()).await?;
        if records.is_empty() {
            return Err(ServiceError::ResetNotFound);
        }
        let now = self.clock.now_unix();
        let mut matching = records.into_iter().filter(|record| record.email == email).peekable();
        if matching.peek().is_none() {
            return Err(ServiceError::CodeInvalid);
        }
        matching
            .find(|record| record.expires_at > now)
            .ok_or(ServiceError::CodeExpired)
    }

    /// Verify, set the new password, then consume the code.
    ///
    /// # Errors
    /// Everything [`Self::verify_code`] returns, `NotFound` if the user vanished.
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        let record = self.verify_code(email, code).await?;
        let user = self
            .users
            .find_by_email_privileged(&record.email)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;
        self.users.reset_user_password(&user.id, new_password).await?;
        self.codes.delete_by_code(&record.email, &record.code).await?;
        Ok(())
    }

    /// # Errors
    /// Store failures only.
    pub async fn sweep_expired(&self) -> Result<u64, ServiceError> {
        Ok(self.codes.delete_expired(self.clock.now_unix()).await?)
    }

    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match service.sweep_expired().await {
                    Ok(0) => {}
                    Ok(removed) => debug!(removed, "expired reset codes swept"),
                    Err(err) => error!("reset code sweep failed: {err:?}"),
                }
            }
        })
    }
}
