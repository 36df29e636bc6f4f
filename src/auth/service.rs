use axum::http::{HeaderMap, Uri};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::oauth::{OAuthRegistry, ProviderProfile};
use crate::clock::Clock;
use crate::error::ServiceError;
use crate::role::RoleService;
use crate::session::SessionService;
use crate::stats::StatsService;
use crate::token::{TokenPair, TokenService};
use crate::user::avatar::validate_avatar;
use crate::user::models::{ContactInfo, OAuthRecord, PersonInfo};
use crate::user::password::verify_password;
use crate::user::{CreateUserCommand, User, UserService, UserView};

pub const DEFAULT_ROLE_NAME: &str = "user";

/// Login, signup, refresh and external sign-in over the token, session and
/// user services.
#[derive(Clone)]
pub struct AuthService {
    tokens: TokenService,
    sessions: SessionService,
    users: UserService,
    roles: RoleService,
    stats: StatsService,
    clock: Arc<dyn Clock>,
    oauth: OAuthRegistry,
    default_role_name: String,
}

impl AuthService {
    #[must_use]
    pub fn new(
        tokens: TokenService,
        sessions: SessionService,
        users: UserService,
        roles: RoleService,
        stats: StatsService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tokens,
            sessions,
            users,
            roles,
            stats,
            clock,
            oauth: OAuthRegistry::new(),
            default_role_name: DEFAULT_ROLE_NAME.to_string(),
        }
    }

    #[must_use]
    pub fn with_oauth(mut self, oauth: OAuthRegistry) -> Self {
        self.oauth = oauth;
        self
    }

    /// Role assigned to every account created through signup or external sign-in.
    #[must_use]
    pub fn with_default_role(mut self, name: impl Into<String>) -> Self {
        self.default_role_name = name.into();
        self
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// # Errors
    /// `NotFound` for an unknown username, `OAuthWithPassword` for an account
    /// without a password, `Unauthorized` on a wrong password.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ServiceError> {
        let user = self
            .users
            .find_by_username_privileged(username.trim())
            .await?
            .ok_or(ServiceError::NotFound("user"))?;
        let Some(stored) = user.password_hash.clone() else {
            return Err(ServiceError::OAuthWithPassword);
        };
        let password = password.to_string();
        let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
            .await
            .map_err(ServiceError::internal)?
            .map_err(ServiceError::internal)?;
        if !verified {
            debug!(user_id = %user.id, "password mismatch");
            return Err(ServiceError::Unauthorized);
        }
        self.start_session(&user.id).await
    }

    /// Create an account holding only the default role. Does not log in.
    ///
    /// # Errors
    /// `Conflict` on a taken username or email, `BadRequest` on invalid input.
    pub async fn sign_up(&self, mut cmd: CreateUserCommand) -> Result<UserView, ServiceError> {
        if self
            .users
            .find_by_username_privileged(cmd.username.trim())
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(format!(
                "username {} already exists",
                cmd.username.trim()
            )));
        }
        cmd.role_ids = self.default_role_ids().await?;
        let user = self.users.create_privileged(cmd, None).await?;
        Ok(UserView::from(user))
    }

    /// # Errors
    /// `Unauthorized` without a valid access token, `NotFound` if the user is gone.
    pub async fn current_user(&self, uri: &Uri, headers: &HeaderMap) -> Result<User, ServiceError> {
        let principal = self.tokens.extract_principal(uri, headers)?;
        self.users.get_privileged(&principal).await
    }

    /// Rotate the pair bound to `refresh_token`.
    ///
    /// # Errors
    /// `Unauthorized` when the token is empty, unknown or expired.
    /// An expired session is deleted.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ServiceError> {
        let refresh_token = refresh_token.trim();
        if refresh_token.is_empty() {
            return Err(ServiceError::Unauthorized);
        }
        let session = match self.sessions.get_by_refresh_token(refresh_token).await {
            Ok(session) => session,
            Err(ServiceError::NotFound(_)) => return Err(ServiceError::Unauthorized),
            Err(err) => return Err(err),
        };
        if session.is_expired(self.sessions.now_unix()) {
            self.sessions.delete_by_principal(&session.user_id).await?;
            debug!(user_id = %session.user_id, "expired session removed");
            return Err(ServiceError::Unauthorized);
        }
        let pair = self.tokens.generate_pair(&session.user_id)?;
        self.sessions.set_session(&pair).await?;
        Ok(pair)
    }

    /// Idempotent.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn logout(&self, principal_id: &str) -> Result<(), ServiceError> {
        self.sessions.delete_by_principal(principal_id).await?;
        info!(user_id = %principal_id, "logged out");
        Ok(())
    }

    /// Sign in with a provider token, linking or creating the account by email.
    ///
    /// # Errors
    /// `BadRequest` for an unregistered provider, `Unauthorized` when the
    /// provider rejects the token.
    pub async fn oauth_login(&self, provider: &str, token: &str) -> Result<TokenPair, ServiceError> {
        let adapter = self
            .oauth
            .get(provider)
            .ok_or_else(|| ServiceError::BadRequest(format!("unsupported provider {provider}")))?;
        let profile = adapter.user_info(token).await.map_err(|err| {
            warn!(provider, "provider rejected token: {err:#}");
            ServiceError::Unauthorized
        })?;
        let record = OAuthRecord {
            provider: provider.to_string(),
            provider_id: profile.provider_id.clone(),
            email: profile.email.clone(),
            access_token: token.to_string(),
            expiry: None,
            last_active: self.clock.now(),
        };

        let user = match self.users.find_by_email_privileged(&profile.email).await? {
            Some(user) => self.users.save_privileged(apply_profile(user, &profile, record)).await?,
            None => {
                let cmd = CreateUserCommand {
                    username: profile.email.clone(),
                    password: None,
                    person_info: person_info(&profile),
                    contact_info: ContactInfo {
                        email: Some(profile.email.clone()),
                        phone: None,
                    },
                    role_ids: self.default_role_ids().await?,
                    avatar: usable_picture(&profile),
                };
                self.users.create_privileged(cmd, Some(record)).await?
            }
        };
        self.start_session(&user.id).await
    }

    async fn start_session(&self, user_id: &str) -> Result<TokenPair, ServiceError> {
        let pair = self.tokens.generate_pair(user_id)?;
        self.sessions.set_session(&pair).await?;
        if let Err(err) = self.stats.record_login(user_id).await {
            warn!(user_id, "failed to record login: {err}");
        }
        info!(user_id, "session started");
        Ok(pair)
    }

    async fn default_role_ids(&self) -> Result<Vec<String>, ServiceError> {
        match self.roles.get_by_name_privileged(&self.default_role_name).await {
            Ok(role) => Ok(vec![role.id]),
            Err(ServiceError::NotFound(_)) => {
                warn!(role = %self.default_role_name, "default role missing, account gets no role");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }
}

fn person_info(profile: &ProviderProfile) -> Option<PersonInfo> {
    if profile.first_name.is_none() && profile.last_name.is_none() {
        return None;
    }
    Some(PersonInfo {
        first_name: profile.first_name.clone(),
        last_name: profile.last_name.clone(),
        birthdate: None,
    })
}

fn usable_picture(profile: &ProviderProfile) -> Option<String> {
    profile
        .picture
        .clone()
        .filter(|picture| validate_avatar(picture).is_ok())
}

// Only fields the provider actually returned overwrite stored ones.
fn apply_profile(mut user: User, profile: &ProviderProfile, record: OAuthRecord) -> User {
    if let Some(incoming) = person_info(profile) {
        let current = user.person_info.get_or_insert_with(PersonInfo::default);
        if incoming.first_name.is_some() {
            current.first_name = incoming.first_name;
        }
        if incoming.last_name.is_some() {
            current.last_name = incoming.last_name;
        }
    }
    if let Some(picture) = usable_picture(profile) {
        user.avatar = Some(picture);
    }
    user.oauth = Some(record);
    user
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::oauth::OAuthProvider;
    use crate::clock::ManualClock;
    use crate::permission::catalog;
    use crate::role::models::CreateRoleCommand;
    use crate::store::MemoryStore;
    use crate::token::TokenConfig;
    use async_trait::async_trait;
    use chrono::Duration;
    use secrecy::SecretString;

    struct StaticProvider(ProviderProfile);

    #[async_trait]
    impl OAuthProvider for StaticProvider {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn user_info(&self, token: &str) -> anyhow::Result<ProviderProfile> {
            anyhow::ensure!(token == "good", "bad token");
            Ok(self.0.clone())
        }
    }

    struct Fixture {
        auth: AuthService,
        users: UserService,
        clock: ManualClock,
    }

    async fn fixture() -> anyhow::Result<Fixture> {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::default();
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let tokens = TokenService::new(
            TokenConfig::new(SecretString::from("auth-secret")).with_refresh_ttl_hours(2),
            shared.clone(),
        );
        let sessions = SessionService::new(store.clone(), shared.clone(), 2);
        let users = UserService::new(store.clone(), store.clone(), store.clone(), shared.clone());
        let roles = RoleService::new(store.clone(), shared.clone());
        roles
            .create_privileged(CreateRoleCommand::new(
                DEFAULT_ROLE_NAME,
                vec![catalog::USER_SELF_UPDATE, catalog::FEEDBACK_CREATE],
            ))
            .await?;
        let stats = StatsService::new(store, shared.clone());
        let provider = StaticProvider(ProviderProfile {
            provider_id: "g-1".into(),
            email: "o@x".into(),
            first_name: Some("O".into()),
            last_name: None,
            picture: Some("https://cdn.example/o.png".into()),
        });
        let auth = AuthService::new(tokens, sessions, users.clone(), roles, stats, shared)
            .with_oauth(OAuthRegistry::new().with_provider(Arc::new(provider)));
        Ok(Fixture { auth, users, clock })
    }

    fn alice() -> CreateUserCommand {
        CreateUserCommand {
            username: "alice".into(),
            password: Some("pw1".into()),
            contact_info: ContactInfo {
                email: Some("a@x".into()),
                phone: None,
            },
            ..CreateUserCommand::default()
        }
    }

    #[tokio::test]
    async fn signup_assigns_only_default_role() -> anyhow::Result<()> {
        let f = fixture().await?;
        let mut cmd = alice();
        cmd.role_ids = vec!["someone-elses-admin-role".into()];
        let view = f.auth.sign_up(cmd).await?;
        assert_eq!(view.role_ids.len(), 1);
        let permissions = f.users.permission_list(&view.id).await?;
        assert!(permissions.contains(&catalog::FEEDBACK_CREATE));
        assert!(matches!(
            f.auth.sign_up(alice()).await,
            Err(ServiceError::Conflict(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn login_outcomes() -> anyhow::Result<()> {
        let f = fixture().await?;
        f.auth.sign_up(alice()).await?;
        assert!(matches!(
            f.auth.login("bob", "pw1").await,
            Err(ServiceError::NotFound("user"))
        ));
        assert!(matches!(
            f.auth.login("alice", "nope").await,
            Err(ServiceError::Unauthorized)
        ));
        let pair = f.auth.login("alice", "pw1").await?;
        let claims = f.auth.tokens().validate_access_token(&pair.access_token)?;
        assert_eq!(claims.sub, pair.principal_id);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_rotates_and_rejects_old_token() -> anyhow::Result<()> {
        let f = fixture().await?;
        f.auth.sign_up(alice()).await?;
        let first = f.auth.login("alice", "pw1").await?;
        let second = f.auth.refresh(&first.refresh_token).await?;
        assert_ne!(first.refresh_token, second.refresh_token);
        assert!(matches!(
            f.auth.refresh(&first.refresh_token).await,
            Err(ServiceError::Unauthorized)
        ));
        assert!(matches!(f.auth.refresh("  ").await, Err(ServiceError::Unauthorized)));
        Ok(())
    }

    #[tokio::test]
    async fn expired_session_is_removed_on_refresh() -> anyhow::Result<()> {
        let f = fixture().await?;
        f.auth.sign_up(alice()).await?;
        let pair = f.auth.login("alice", "pw1").await?;
        f.clock.advance(Duration::hours(3));
        assert!(matches!(
            f.auth.refresh(&pair.refresh_token).await,
            Err(ServiceError::Unauthorized)
        ));
        f.clock.advance(Duration::hours(-3));
        assert!(matches!(
            f.auth.refresh(&pair.refresh_token).await,
            Err(ServiceError::Unauthorized)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn logout_is_idempotent() -> anyhow::Result<()> {
        let f = fixture().await?;
        f.auth.sign_up(alice()).await?;
        let pair = f.auth.login("alice", "pw1").await?;
        f.auth.logout(&pair.principal_id).await?;
        f.auth.logout(&pair.principal_id).await?;
        assert!(matches!(
            f.auth.refresh(&pair.refresh_token).await,
            Err(ServiceError::Unauthorized)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn deleted_user_cannot_refresh() -> anyhow::Result<()> {
        let f = fixture().await?;
        let view = f.auth.sign_up(alice()).await?;
        let pair = f.auth.login("alice", "pw1").await?;
        f.users
            .delete(&crate::permission::PermissionContext::admin(), &view.id)
            .await?;
        assert!(matches!(
            f.auth.refresh(&pair.refresh_token).await,
            Err(ServiceError::Unauthorized)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn current_user_reads_bearer_token() -> anyhow::Result<()> {
        let f = fixture().await?;
        f.auth.sign_up(alice()).await?;
        let pair = f.auth.login("alice", "pw1").await?;
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {}", pair.access_token).parse()?,
        );
        let uri: Uri = "/auth/currentUser".parse()?;
        let user = f.auth.current_user(&uri, &headers).await?;
        assert_eq!(user.id, pair.principal_id);
        assert!(matches!(
            f.auth.current_user(&uri, &HeaderMap::new()).await,
            Err(ServiceError::Unauthorized)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn oauth_creates_then_links_by_email() -> anyhow::Result<()> {
        let f = fixture().await?;
        assert!(matches!(
            f.auth.oauth_login("apple", "good").await,
            Err(ServiceError::BadRequest(_))
        ));
        assert!(matches!(
            f.auth.oauth_login("static", "bad").await,
            Err(ServiceError::Unauthorized)
        ));

        let pair = f.auth.oauth_login("static", "good").await?;
        let created = f.users.get_privileged(&pair.principal_id).await?;
        assert_eq!(created.username, "o@x");
        assert!(created.password_hash.is_none());
        assert_eq!(created.avatar.as_deref(), Some("https://cdn.example/o.png"));

        assert!(matches!(
            f.auth.login("o@x", "anything").await,
            Err(ServiceError::OAuthWithPassword)
        ));

        let again = f.auth.oauth_login("static", "good").await?;
        assert_eq!(again.principal_id, pair.principal_id);
        let linked = f.users.get_privileged(&again.principal_id).await?;
        assert_eq!(linked.version, created.version + 1);
        Ok(())
    }
}
