//! User feedback intake with an optional notification mail per submission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::clock::Clock;
use crate::error::ServiceError;
use crate::mailer::{MailKind, MailQueue};
use crate::permission::{PermissionContext, catalog};
use crate::store::{FeedbackRepo, new_object_id};
use crate::user::UserService;

const MAX_SUBJECT: usize = 200;
const MAX_MESSAGE: usize = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: String,
    pub user_id: String,
    pub subject: String,
    pub message: String,
    pub status: FeedbackStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct CreateFeedbackCommand {
    pub subject: String,
    pub message: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct UpdateFeedbackStatusCommand {
    pub status: FeedbackStatus,
}

#[derive(Clone)]
pub struct FeedbackService {
    repo: Arc<dyn FeedbackRepo>,
    users: UserService,
    mailer: MailQueue,
    clock: Arc<dyn Clock>,
    destination: Option<String>,
}

impl FeedbackService {
    #[must_use]
    pub fn new(
        repo: Arc<dyn FeedbackRepo>,
        users: UserService,
        mailer: MailQueue,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            users,
            mailer,
            clock,
            destination: None,
        }
    }

    /// Address that receives a `FEEDBACK` mail for every submission.
    #[must_use]
    pub fn with_destination(mut self, destination: Option<String>) -> Self {
        self.destination = destination.filter(|address| !address.trim().is_empty());
        self
    }

    /// Stores the submission as `OPEN` under the caller's principal.
    ///
    /// # Errors
    /// `PermissionDenied`, `Unauthorized` without a principal, `BadRequest`
    /// for an empty or oversized subject/message.
    pub async fn create(
        &self,
        ctx: &PermissionContext,
        cmd: CreateFeedbackCommand,
    ) -> Result<Feedback, ServiceError> {
        ctx.require(&catalog::FEEDBACK_CREATE)?;
        let user_id = ctx.principal_id.clone().ok_or(ServiceError::Unauthorized)?;
        let subject = cmd.subject.trim();
        let message = cmd.message.trim();
        if subject.is_empty() || message.is_empty() {
            return Err(ServiceError::BadRequest("subject and message are required".into()));
        }
        if subject.chars().count() > MAX_SUBJECT || message.chars().count() > MAX_MESSAGE {
            return Err(ServiceError::BadRequest("feedback too long".into()));
        }

        let now = self.clock.now();
        let feedback = Feedback {
            id: new_object_id(),
            user_id,
            subject: subject.to_string(),
            message: message.to_string(),
            status: FeedbackStatus::Open,
            created_at: now,
            updated_at: now,
        };
        self.repo.insert(&feedback).await?;
        info!(feedback_id = %feedback.id, user_id = %feedback.user_id, "feedback received");
        self.notify(&feedback).await;
        Ok(feedback)
    }

    /// # Errors
    /// `PermissionDenied` without `(feedback, READ)`.
    pub async fn list(&self, ctx: &PermissionContext) -> Result<Vec<Feedback>, ServiceError> {
        ctx.require(&catalog::FEEDBACK_READ)?;
        Ok(self.repo.list().await?)
    }

    /// # Errors
    /// `PermissionDenied` unless reading one's own feedback or holding `(feedback, READ)`.
    pub async fn list_by_user(
        &self,
        ctx: &PermissionContext,
        user_id: &str,
    ) -> Result<Vec<Feedback>, ServiceError> {
        ctx.require_self_or(user_id, &catalog::FEEDBACK_READ)?;
        Ok(self.repo.list_by_user(user_id).await?)
    }

    /// # Errors
    /// `PermissionDenied`, or `NotFound` for an unknown id.
    pub async fn update_status(
        &self,
        ctx: &PermissionContext,
        id: &str,
        status: FeedbackStatus,
    ) -> Result<Feedback, ServiceError> {
        ctx.require(&catalog::FEEDBACK_UPDATE)?;
        let mut feedback = self
            .repo
            .get(id)
            .await?
            .ok_or(ServiceError::NotFound("feedback"))?;
        feedback.status = status;
        feedback.updated_at = self.clock.now();
        if !self.repo.update(&feedback).await? {
            return Err(ServiceError::NotFound("feedback"));
        }
        Ok(feedback)
    }

    // A failed notification never fails the submission.
    async fn notify(&self, feedback: &Feedback) {
        let Some(destination) = self.destination.as_deref() else {
            return;
        };
        let username = match self.users.get_privileged(&feedback.user_id).await {
            Ok(user) => user.username,
            Err(_) => feedback.user_id.clone(),
        };
        let vars = [
            ("username", username.as_str()),
            ("userId", feedback.user_id.as_str()),
            ("subject", feedback.subject.as_str()),
            ("message", feedback.message.as_str()),
            ("feedbackId", feedback.id.as_str()),
        ];
        if let Err(err) = self.mailer.enqueue(MailKind::Feedback, destination, &vars) {
            warn!(feedback_id = %feedback.id, "feedback mail not queued: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::mailer::{EmailMessage, MailAccounts, MailerConfig};
    use crate::store::MemoryStore;
    use crate::user::CreateUserCommand;
    use chrono::Duration;
    use tokio::sync::mpsc::Receiver;

    type Fixture = (FeedbackService, ManualClock, Receiver<EmailMessage>, String);

    async fn service(destination: Option<&str>) -> anyhow::Result<Fixture> {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::default();
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let users = UserService::new(store.clone(), store.clone(), store.clone(), shared.clone());
        let user = users
            .create_privileged(
                CreateUserCommand {
                    username: "alice".into(),
                    password: Some("pw1".into()),
                    ..CreateUserCommand::default()
                },
                None,
            )
            .await?;
        let (mailer, rx) = MailQueue::bounded(MailerConfig::new(), MailAccounts::default());
        let service = FeedbackService::new(store, users, mailer, shared)
            .with_destination(destination.map(str::to_string));
        Ok((service, clock, rx, user.id))
    }

    fn command() -> CreateFeedbackCommand {
        CreateFeedbackCommand {
            subject: "Dark mode".into(),
            message: "Please add a dark theme.".into(),
        }
    }

    #[tokio::test]
    async fn create_requires_permission_and_principal() -> anyhow::Result<()> {
        let (service, _, _, user_id) = service(None).await?;
        let bare = PermissionContext::new(&user_id, Vec::new());
        assert!(matches!(
            service.create(&bare, command()).await,
            Err(ServiceError::PermissionDenied)
        ));
        assert!(matches!(
            service.create(&PermissionContext::admin(), command()).await,
            Err(ServiceError::Unauthorized)
        ));

        let ctx = PermissionContext::new(&user_id, vec![catalog::FEEDBACK_CREATE]);
        let feedback = service.create(&ctx, command()).await?;
        assert_eq!(feedback.status, FeedbackStatus::Open);
        assert_eq!(feedback.user_id, user_id);
        Ok(())
    }

    #[tokio::test]
    async fn create_rejects_blank_subject() -> anyhow::Result<()> {
        let (service, _, _, user_id) = service(None).await?;
        let ctx = PermissionContext::new(&user_id, vec![catalog::FEEDBACK_CREATE]);
        let cmd = CreateFeedbackCommand {
            subject: "  ".into(),
            message: "x".into(),
        };
        assert!(matches!(
            service.create(&ctx, cmd).await,
            Err(ServiceError::BadRequest(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn destination_receives_notification() -> anyhow::Result<()> {
        let (service, _, mut rx, user_id) = service(Some("team@x")).await?;
        let ctx = PermissionContext::new(&user_id, vec![catalog::FEEDBACK_CREATE]);
        let feedback = service.create(&ctx, command()).await?;

        let mail = rx.recv().await.ok_or_else(|| anyhow::anyhow!("no mail queued"))?;
        assert_eq!(mail.kind, MailKind::Feedback);
        assert_eq!(mail.to, "team@x");
        assert_eq!(mail.subject, "New feedback: Dark mode");
        assert!(mail.html.contains("alice"));
        assert!(mail.html.contains(&feedback.id));
        Ok(())
    }

    #[tokio::test]
    async fn status_update_bumps_timestamp() -> anyhow::Result<()> {
        let (service, clock, _, user_id) = service(None).await?;
        let ctx = PermissionContext::new(&user_id, vec![catalog::FEEDBACK_CREATE]);
        let feedback = service.create(&ctx, command()).await?;

        assert!(matches!(
            service
                .update_status(&ctx, &feedback.id, FeedbackStatus::Resolved)
                .await,
            Err(ServiceError::PermissionDenied)
        ));

        clock.advance(Duration::minutes(5));
        let staff = PermissionContext::new("staff", vec![catalog::FEEDBACK_UPDATE]);
        let updated = service
            .update_status(&staff, &feedback.id, FeedbackStatus::InProgress)
            .await?;
        assert_eq!(updated.status, FeedbackStatus::InProgress);
        assert!(updated.updated_at > feedback.updated_at);

        assert!(matches!(
            service
                .update_status(&staff, "missing", FeedbackStatus::Closed)
                .await,
            Err(ServiceError::NotFound("feedback"))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn listing_by_user_allows_self() -> anyhow::Result<()> {
        let (service, _, _, user_id) = service(None).await?;
        let ctx = PermissionContext::new(&user_id, vec![catalog::FEEDBACK_CREATE]);
        service.create(&ctx, command()).await?;

        assert_eq!(service.list_by_user(&ctx, &user_id).await?.len(), 1);
        assert!(matches!(
            service.list(&ctx).await,
            Err(ServiceError::PermissionDenied)
        ));
        let other = PermissionContext::new("u2", Vec::new());
        assert!(matches!(
            service.list_by_user(&other, &user_id).await,
            Err(ServiceError::PermissionDenied)
        ));
        Ok(())
    }

    #[test]
    fn status_serializes_screaming_snake() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&FeedbackStatus::InProgress)?, "\"IN_PROGRESS\"");
        Ok(())
    }
}
