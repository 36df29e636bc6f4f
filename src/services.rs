//! Service graph wiring and boot-time seeding.
//!
//! [`Services`] is built once from a [`ServicesConfig`], a [`Stores`] bundle,
//! a mail queue and a clock, then shared with every handler behind an `Arc`.

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::auth::{AuthService, DEFAULT_ROLE_NAME, OAuthRegistry};
use crate::blocker::IpBlocker;
use crate::clock::Clock;
use crate::error::ServiceError;
use crate::feedback::FeedbackService;
use crate::mailer::MailQueue;
use crate::permission::catalog;
use crate::reset_password::ResetPasswordService;
use crate::role::{CreateRoleCommand, Role, RoleService};
use crate::session::SessionService;
use crate::stats::StatsService;
use crate::store::Stores;
use crate::token::{TokenConfig, TokenService};
use crate::user::{CreateUserCommand, UserService};

pub const ADMIN_ROLE_NAME: &str = "admin";

#[derive(Clone, Debug)]
pub struct ServicesConfig {
    token: TokenConfig,
    default_role_name: String,
    default_role_tag: String,
    default_role_info: String,
    default_username: String,
    default_password: Option<SecretString>,
    feedback_destination: Option<String>,
    oauth: OAuthRegistry,
}

impl ServicesConfig {
    #[must_use]
    pub fn new(token: TokenConfig) -> Self {
        Self {
            token,
            default_role_name: DEFAULT_ROLE_NAME.to_string(),
            default_role_tag: "default".to_string(),
            default_role_info: "Default role".to_string(),
            default_username: "admin".to_string(),
            default_password: None,
            feedback_destination: None,
            oauth: OAuthRegistry::new(),
        }
    }

    #[must_use]
    pub fn with_default_role(
        mut self,
        name: impl Into<String>,
        tag: impl Into<String>,
        info: impl Into<String>,
    ) -> Self {
        self.default_role_name = name.into();
        self.default_role_tag = tag.into();
        self.default_role_info = info.into();
        self
    }

    /// The default user is only seeded when a password is given.
    #[must_use]
    pub fn with_default_user(mut self, username: impl Into<String>, password: Option<SecretString>) -> Self {
        self.default_username = username.into();
        self.default_password = password;
        self
    }

    #[must_use]
    pub fn with_feedback_destination(mut self, destination: Option<String>) -> Self {
        self.feedback_destination = destination;
        self
    }

    #[must_use]
    pub fn with_oauth(mut self, oauth: OAuthRegistry) -> Self {
        self.oauth = oauth;
        self
    }

    #[must_use]
    pub fn token(&self) -> &TokenConfig {
        &self.token
    }

    #[must_use]
    pub fn default_role_name(&self) -> &str {
        &self.default_role_name
    }
}

#[derive(Clone)]
pub struct Services {
    pub tokens: TokenService,
    pub sessions: SessionService,
    pub users: UserService,
    pub roles: RoleService,
    pub auth: AuthService,
    pub reset_password: ResetPasswordService,
    pub feedback: FeedbackService,
    pub stats: StatsService,
    pub blocker: IpBlocker,
    pub mailer: MailQueue,
    pub stores: Stores,
    pub clock: Arc<dyn Clock>,
    config: ServicesConfig,
}

impl Services {
    /// # Errors
    /// Fails when the token configuration is unusable.
    pub fn new(config: ServicesConfig, stores: Stores, mailer: MailQueue, clock: Arc<dyn Clock>) -> Result<Self> {
        config.token.validate().context("invalid JWT configuration")?;

        let tokens = TokenService::new(config.token.clone(), clock.clone());
        let sessions = SessionService::new(
            stores.sessions.clone(),
            clock.clone(),
            config.token.refresh_ttl_hours(),
        );
        let users = UserService::new(
            stores.users.clone(),
            stores.roles.clone(),
            stores.sessions.clone(),
            clock.clone(),
        );
        let roles = RoleService::new(stores.roles.clone(), clock.clone());
        let stats = StatsService::new(stores.stats.clone(), clock.clone());
        let auth = AuthService::new(
            tokens.clone(),
            sessions.clone(),
            users.clone(),
            roles.clone(),
            stats.clone(),
            clock.clone(),
        )
        .with_oauth(config.oauth.clone())
        .with_default_role(config.default_role_name.clone());
        let reset_password = ResetPasswordService::new(
            stores.reset_codes.clone(),
            users.clone(),
            mailer.clone(),
            clock.clone(),
        );
        let feedback = FeedbackService::new(stores.feedback.clone(), users.clone(), mailer.clone(), clock.clone())
            .with_destination(config.feedback_destination.clone());
        let blocker = IpBlocker::new(clock.clone());

        Ok(Self {
            tokens,
            sessions,
            users,
            roles,
            auth,
            reset_password,
            feedback,
            stats,
            blocker,
            mailer,
            stores,
            clock,
            config,
        })
    }

    /// Ensure the admin role, the default role and (when configured) the
    /// default user exist. Safe to run on every boot.
    ///
    /// # Errors
    /// Store failures, or a default user that cannot be created.
    pub async fn seed(&self) -> Result<()> {
        let admin = self
            .ensure_role(
                CreateRoleCommand::new(ADMIN_ROLE_NAME, vec![catalog::ADMIN])
                    .with_tags(vec![ADMIN_ROLE_NAME.to_string()])
                    .with_info("Full access"),
            )
            .await
            .context("failed to seed admin role")?;
        self.ensure_role(
            CreateRoleCommand::new(
                self.config.default_role_name.clone(),
                vec![catalog::USER_SELF_UPDATE, catalog::FEEDBACK_CREATE],
            )
            .with_tags(vec![self.config.default_role_tag.clone()])
            .with_info(self.config.default_role_info.clone()),
        )
        .await
        .context("failed to seed default role")?;

        let Some(password) = self.config.default_password.as_ref() else {
            info!("no default user password configured, skipping default user");
            return Ok(());
        };
        let username = self.config.default_username.as_str();
        match self.users.find_by_username_privileged(username).await? {
            Some(user) => {
                self.users
                    .add_role_privileged(&user.id, &admin.id)
                    .await
                    .context("failed to grant admin role to default user")?;
            }
            None => {
                let user = self
                    .users
                    .create_privileged(
                        CreateUserCommand {
                            username: username.to_string(),
                            password: Some(password.expose_secret().to_string()),
                            role_ids: vec![admin.id.clone()],
                            ..CreateUserCommand::default()
                        },
                        None,
                    )
                    .await
                    .context("failed to seed default user")?;
                info!(user_id = %user.id, username, "default user created");
            }
        }
        Ok(())
    }

    /// Start the blocker and reset-code sweepers.
    #[must_use]
    pub fn spawn_sweepers(&self, blocker_interval: Duration, reset_interval: Duration) -> Vec<JoinHandle<()>> {
        vec![
            self.blocker.spawn_sweeper(blocker_interval),
            self.reset_password.spawn_sweeper(reset_interval),
        ]
    }

    async fn ensure_role(&self, cmd: CreateRoleCommand) -> Result<Role, ServiceError> {
        match self.roles.get_by_name_privileged(&cmd.name).await {
            Ok(role) => Ok(role),
            Err(ServiceError::NotFound(_)) => {
                let role = self.roles.create_privileged(cmd).await?;
                info!(role_id = %role.id, role = %role.name, "role seeded");
                Ok(role)
            }
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("stores", &self.stores)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::mailer::{MailAccounts, MailerConfig};
    use crate::permission::{PermissionContext, has_permission};

    fn services(password: Option<&str>) -> anyhow::Result<Services> {
        let config = ServicesConfig::new(TokenConfig::new(SecretString::from("seed-secret")))
            .with_default_user("root", password.map(|p| SecretString::from(p.to_string())));
        let (mailer, _rx) = MailQueue::bounded(MailerConfig::new(), MailAccounts::default());
        Services::new(config, Stores::memory(), mailer, Arc::new(ManualClock::default()))
    }

    #[tokio::test]
    async fn seed_is_repeatable() -> anyhow::Result<()> {
        let services = services(Some("rootpw"))?;
        services.seed().await?;
        services.seed().await?;

        let roles = services.roles.list(&PermissionContext::admin()).await?;
        assert_eq!(roles.len(), 2);

        let root = services
            .users
            .find_by_username_privileged("root")
            .await?
            .ok_or_else(|| anyhow::anyhow!("default user missing"))?;
        assert_eq!(root.role_ids.len(), 1);
        let permissions = services.users.permission_list(&root.id).await?;
        assert!(has_permission(&permissions, &catalog::ROLE_DELETE));
        Ok(())
    }

    #[tokio::test]
    async fn seed_skips_user_without_password() -> anyhow::Result<()> {
        let services = services(None)?;
        services.seed().await?;
        assert!(services.users.find_by_username_privileged("root").await?.is_none());
        let default = services.roles.get_by_name_privileged(DEFAULT_ROLE_NAME).await?;
        assert_eq!(default.tags, vec!["default".to_string()]);
        Ok(())
    }

    #[test]
    fn rejects_empty_secret() {
        let config = ServicesConfig::new(TokenConfig::new(SecretString::from("")));
        let (mailer, _rx) = MailQueue::bounded(MailerConfig::new(), MailAccounts::default());
        assert!(Services::new(config, Stores::memory(), mailer, Arc::new(ManualClock::default())).is_err());
    }
}
