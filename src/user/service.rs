use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::avatar::validate_avatar;
use super::models::{CreateUserCommand, OAuthRecord, UpdateUserCommand, User};
use super::password::hash_password;
use crate::clock::Clock;
use crate::error::ServiceError;
use crate::permission::{Permission, PermissionContext, catalog, has_permission};
use crate::role::models::Role;
use crate::store::{RoleRepo, SessionRepo, UserRepo, new_object_id};

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserRepo>,
    roles: Arc<dyn RoleRepo>,
    sessions: Arc<dyn SessionRepo>,
    clock: Arc<dyn Clock>,
}

impl UserService {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserRepo>,
        roles: Arc<dyn RoleRepo>,
        sessions: Arc<dyn SessionRepo>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            roles,
            sessions,
            clock,
        }
    }

    /// # Errors
    /// `PermissionDenied` without `(user, CREATE)`, plus everything [`Self::create_privileged`] returns.
    pub async fn create(
        &self,
        ctx: &PermissionContext,
        cmd: CreateUserCommand,
    ) -> Result<User, ServiceError> {
        ctx.require(&catalog::USER_CREATE)?;
        self.create_privileged(cmd, None).await
    }

    /// Server-originated creation (signup, seeding, external sign-in).
    ///
    /// # Errors
    /// `BadRequest` on missing username/password or a bad avatar,
    /// `Conflict` on a taken username or email, `NotFound` for an unknown role id.
    pub async fn create_privileged(
        &self,
        cmd: CreateUserCommand,
        oauth: Option<OAuthRecord>,
    ) -> Result<User, ServiceError> {
        let username = cmd.username.trim().to_string();
        if username.is_empty() {
            return Err(ServiceError::BadRequest("username is required".to_string()));
        }
        let password = cmd.password.filter(|password| !password.is_empty());
        if password.is_none() && oauth.is_none() {
            return Err(ServiceError::BadRequest("password is required".to_string()));
        }
        if let Some(avatar) = cmd.avatar.as_deref() {
            validate_avatar(avatar)?;
        }
        if self.users.get_by_username(&username).await?.is_some() {
            return Err(ServiceError::Conflict(format!("username {username} already exists")));
        }
        if let Some(email) = cmd.contact_info.unique_email() {
            if self.users.get_by_email(email).await?.is_some() {
                return Err(ServiceError::Conflict(format!("email {email} already exists")));
            }
        }
        let mut role_ids = Vec::with_capacity(cmd.role_ids.len());
        for role_id in cmd.role_ids {
            self.require_role(&role_id).await?;
            if !role_ids.contains(&role_id) {
                role_ids.push(role_id);
            }
        }
        let password_hash = match password {
            Some(password) => Some(hash_off_thread(password).await?),
            None => None,
        };

        let user = User {
            id: new_object_id(),
            username,
            password_hash,
            person_info: cmd.person_info,
            contact_info: cmd.contact_info,
            created_at: self.clock.now(),
            version: 1,
            role_ids,
            oauth,
            avatar: cmd.avatar,
        };
        self.users.insert(&user).await?;
        info!(user_id = %user.id, username = %user.username, "user created");
        Ok(user)
    }

    /// Self-reads pass without `(user, READ)`.
    ///
    /// # Errors
    /// `PermissionDenied` or `NotFound`.
    pub async fn get(&self, ctx: &PermissionContext, id: &str) -> Result<User, ServiceError> {
        ctx.require_self_or(id, &catalog::USER_READ)?;
        self.get_privileged(id).await
    }

    /// # Errors
    /// `NotFound` for an unknown id.
    pub async fn get_privileged(&self, id: &str) -> Result<User, ServiceError> {
        self.users.get(id).await?.ok_or(ServiceError::NotFound("user"))
    }

    /// # Errors
    /// Store failures only.
    pub async fn find_by_username_privileged(&self, username: &str) -> Result<Option<User>, ServiceError> {
        Ok(self.users.get_by_username(username).await?)
    }

    /// # Errors
    /// Store failures only.
    pub async fn find_by_email_privileged(&self, email: &str) -> Result<Option<User>, ServiceError> {
        Ok(self.users.get_by_email(email).await?)
    }

    /// # Errors
    /// `PermissionDenied` without `(user, READ)`.
    pub async fn list(&self, ctx: &PermissionContext) -> Result<Vec<User>, ServiceError> {
        ctx.require(&catalog::USER_READ)?;
        Ok(self.users.list().await?)
    }

    /// # Errors
    /// `PermissionDenied` without `(user, READ)`.
    pub async fn exists_by_username(
        &self,
        ctx: &PermissionContext,
        username: &str,
    ) -> Result<bool, ServiceError> {
        ctx.require(&catalog::USER_READ)?;
        Ok(self.users.get_by_username(username).await?.is_some())
    }

    /// # Errors
    /// `PermissionDenied` without `(user, READ)`.
    pub async fn exists_by_email(&self, ctx: &PermissionContext, email: &str) -> Result<bool, ServiceError> {
        ctx.require(&catalog::USER_READ)?;
        Ok(self.users.get_by_email(email).await?.is_some())
    }

    /// Needs `(user, UPDATE)`, or `(user, SELF_UPDATE)` when editing one's own record.
    ///
    /// # Errors
    /// `PermissionDenied`, `NotFound`, `BadRequest` or `Conflict`.
    pub async fn update(
        &self,
        ctx: &PermissionContext,
        id: &str,
        cmd: UpdateUserCommand,
    ) -> Result<User, ServiceError> {
        let allowed = has_permission(&ctx.permissions, &catalog::USER_UPDATE)
            || (ctx.is_principal(id) && has_permission(&ctx.permissions, &catalog::USER_SELF_UPDATE));
        if !allowed {
            return Err(ServiceError::PermissionDenied);
        }

        let mut user = self.get_privileged(id).await?;
        if let Some(password) = cmd.password {
            if password.is_empty() {
                return Err(ServiceError::BadRequest("password must not be empty".to_string()));
            }
            user.password_hash = Some(hash_off_thread(password).await?);
        }
        if let Some(avatar) = cmd.avatar {
            validate_avatar(&avatar)?;
            user.avatar = Some(avatar);
        }
        if let Some(person_info) = cmd.person_info {
            user.person_info = Some(person_info);
        }
        if let Some(contact_info) = cmd.contact_info {
            if let Some(email) = contact_info.unique_email() {
                let taken = self
                    .users
                    .get_by_email(email)
                    .await?
                    .is_some_and(|other| other.id != user.id);
                if taken {
                    return Err(ServiceError::Conflict(format!("email {email} already exists")));
                }
            }
            user.contact_info = contact_info;
        }
        self.save_privileged(user).await
    }

    /// Persist `user` with its version bumped.
    ///
    /// # Errors
    /// `NotFound` if the user vanished, `Conflict` on a unique clash.
    pub async fn save_privileged(&self, mut user: User) -> Result<User, ServiceError> {
        user.version += 1;
        if self.users.update(&user).await? {
            Ok(user)
        } else {
            Err(ServiceError::NotFound("user"))
        }
    }

    /// # Errors
    /// `PermissionDenied` without `(user, DELETE)`, `NotFound` for an unknown id.
    /// The user's session goes with it.
    pub async fn delete(&self, ctx: &PermissionContext, id: &str) -> Result<(), ServiceError> {
        ctx.require(&catalog::USER_DELETE)?;
        if self.users.delete(id).await? {
            self.sessions.delete_by_user(id).await?;
            info!(user_id = %id, "user deleted");
            Ok(())
        } else {
            Err(ServiceError::NotFound("user"))
        }
    }

    /// # Errors
    /// `PermissionDenied` without `(user, UPDATE)`, `NotFound` for an unknown user or role.
    pub async fn add_role(
        &self,
        ctx: &PermissionContext,
        user_id: &str,
        role_id: &str,
    ) -> Result<User, ServiceError> {
        ctx.require(&catalog::USER_UPDATE)?;
        self.add_role_privileged(user_id, role_id).await
    }

    /// # Errors
    /// `NotFound` for an unknown user or role.
    pub async fn add_role_privileged(&self, user_id: &str, role_id: &str) -> Result<User, ServiceError> {
        self.require_role(role_id).await?;
        let mut user = self.get_privileged(user_id).await?;
        if user.role_ids.iter().any(|id| id == role_id) {
            return Ok(user);
        }
        user.role_ids.push(role_id.to_string());
        let user = self.save_privileged(user).await?;
        debug!(user_id = %user_id, role_id = %role_id, "role assigned");
        Ok(user)
    }

    /// # Errors
    /// `PermissionDenied` without `(user, UPDATE)`, `NotFound` for an unknown user.
    pub async fn remove_role(
        &self,
        ctx: &PermissionContext,
        user_id: &str,
        role_id: &str,
    ) -> Result<User, ServiceError> {
        ctx.require(&catalog::USER_UPDATE)?;
        let mut user = self.get_privileged(user_id).await?;
        let before = user.role_ids.len();
        user.role_ids.retain(|id| id != role_id);
        if user.role_ids.len() == before {
            return Ok(user);
        }
        self.save_privileged(user).await
    }

    /// Roles still present in the store; dangling ids are skipped.
    ///
    /// # Errors
    /// `PermissionDenied` or `NotFound`.
    pub async fn get_roles(&self, ctx: &PermissionContext, user_id: &str) -> Result<Vec<Role>, ServiceError> {
        ctx.require_self_or(user_id, &catalog::USER_READ)?;
        let user = self.get_privileged(user_id).await?;
        self.resolve_roles(&user).await
    }

    /// # Errors
    /// `PermissionDenied` or `NotFound`.
    pub async fn get_permission_list(
        &self,
        ctx: &PermissionContext,
        user_id: &str,
    ) -> Result<Vec<Permission>, ServiceError> {
        ctx.require_self_or(user_id, &catalog::USER_READ)?;
        self.permission_list(user_id).await
    }

    /// Union of permissions over all assigned roles, de-duplicated.
    ///
    /// # Errors
    /// `NotFound` for an unknown user.
    pub async fn permission_list(&self, user_id: &str) -> Result<Vec<Permission>, ServiceError> {
        let user = self.get_privileged(user_id).await?;
        let permissions: BTreeSet<Permission> = self
            .resolve_roles(&user)
            .await?
            .into_iter()
            .flat_map(|role| role.permissions)
            .collect();
        Ok(permissions.into_iter().collect())
    }

    /// Context for an authenticated principal.
    ///
    /// # Errors
    /// `NotFound` for an unknown user.
    pub async fn permission_context(&self, principal_id: &str) -> Result<PermissionContext, ServiceError> {
        let permissions = self.permission_list(principal_id).await?;
        Ok(PermissionContext::new(principal_id, permissions))
    }

    /// Only reachable after a reset code has been verified.
    ///
    /// # Errors
    /// `BadRequest` on an empty password, `NotFound` for an unknown user.
    pub async fn reset_user_password(&self, user_id: &str, new_password: &str) -> Result<(), ServiceError> {
        if new_password.is_empty() {
            return Err(ServiceError::BadRequest("password must not be empty".to_string()));
        }
        let mut user = self.get_privileged(user_id).await?;
        user.password_hash = Some(hash_off_thread(new_password.to_string()).await?);
        self.save_privileged(user).await?;
        info!(user_id = %user_id, "password reset");
        Ok(())
    }

    async fn require_role(&self, role_id: &str) -> Result<Role, ServiceError> {
        self.roles.get(role_id).await?.ok_or(ServiceError::NotFound("role"))
    }

    async fn resolve_roles(&self, user: &User) -> Result<Vec<Role>, ServiceError> {
        let mut roles = Vec::with_capacity(user.role_ids.len());
        for role_id in &user.role_ids {
            if let Some(role) = self.roles.get(role_id).await? {
                roles.push(role);
            }
        }
        Ok(roles)
    }
}

// Argon2 is CPU bound; keep it off the async workers.
async fn hash_off_thread(password: String) -> Result<String, ServiceError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(ServiceError::internal)?
        .map_err(ServiceError::internal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::role::{CreateRoleCommand, RoleService};
    use crate::store::MemoryStore;
    use crate::user::models::ContactInfo;
    use crate::user::password::verify_password;

    struct Fixture {
        users: UserService,
        roles: RoleService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        Fixture {
            users: UserService::new(store.clone(), store.clone(), store.clone(), clock.clone()),
            roles: RoleService::new(store, clock),
        }
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
    async fn create_hashes_password_and_rejects_duplicates() -> anyhow::Result<()> {
        let f = fixture();
        let admin = PermissionContext::admin();
        let user = f.users.create(&admin, alice()).await?;
        let hash = user.password_hash.clone().unwrap_or_default();
        assert!(verify_password("pw1", &hash)?);

        let dup = f.users.create(&admin, alice()).await;
        assert!(matches!(dup, Err(ServiceError::Conflict(_))));

        let mut same_email = alice();
        same_email.username = "alice2".into();
        let dup = f.users.create(&admin, same_email).await;
        assert!(matches!(dup, Err(ServiceError::Conflict(_))));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_role_id_is_rejected() {
        let f = fixture();
        let mut cmd = alice();
        cmd.role_ids = vec!["ffffffffffffffffffffffff".into()];
        let result = f.users.create_privileged(cmd, None).await;
        assert!(matches!(result, Err(ServiceError::NotFound("role"))));
    }

    #[tokio::test]
    async fn permissions_aggregate_over_roles() -> anyhow::Result<()> {
        let f = fixture();
        let readers = f
            .roles
            .create_privileged(CreateRoleCommand::new(
                "readers",
                vec![catalog::USER_READ, catalog::ROLE_READ],
            ))
            .await?;
        let writers = f
            .roles
            .create_privileged(CreateRoleCommand::new(
                "writers",
                vec![catalog::USER_READ, catalog::USER_UPDATE],
            ))
            .await?;
        let user = f.users.create_privileged(alice(), None).await?;
        f.users.add_role_privileged(&user.id, &readers.id).await?;
        f.users.add_role_privileged(&user.id, &writers.id).await?;
        f.users.add_role_privileged(&user.id, &writers.id).await?;

        let permissions = f.users.permission_list(&user.id).await?;
        assert_eq!(permissions.len(), 3);
        assert!(permissions.contains(&catalog::USER_UPDATE));

        let stored = f.users.get_privileged(&user.id).await?;
        assert_eq!(stored.role_ids.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn self_read_needs_no_permission() -> anyhow::Result<()> {
        let f = fixture();
        let user = f.users.create_privileged(alice(), None).await?;
        let own = PermissionContext::new(user.id.clone(), Vec::new());
        assert_eq!(f.users.get(&own, &user.id).await?.username, "alice");

        let stranger = PermissionContext::new("someone-else", Vec::new());
        assert!(matches!(
            f.users.get(&stranger, &user.id).await,
            Err(ServiceError::PermissionDenied)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn self_update_requires_self_update_permission() -> anyhow::Result<()> {
        let f = fixture();
        let user = f.users.create_privileged(alice(), None).await?;
        let cmd = UpdateUserCommand {
            avatar: Some("https://cdn.example.com/a.png".into()),
            ..UpdateUserCommand::default()
        };

        let bare = PermissionContext::new(user.id.clone(), Vec::new());
        assert!(matches!(
            f.users.update(&bare, &user.id, cmd.clone()).await,
            Err(ServiceError::PermissionDenied)
        ));

        let own = PermissionContext::new(user.id.clone(), vec![catalog::USER_SELF_UPDATE]);
        let updated = f.users.update(&own, &user.id, cmd.clone()).await?;
        assert_eq!(updated.version, 2);

        let other = f
            .users
            .create_privileged(
                CreateUserCommand {
                    username: "bob".into(),
                    password: Some("pw".into()),
                    ..CreateUserCommand::default()
                },
                None,
            )
            .await?;
        assert!(matches!(
            f.users.update(&own, &other.id, cmd).await,
            Err(ServiceError::PermissionDenied)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn reset_password_replaces_hash() -> anyhow::Result<()> {
        let f = fixture();
        let user = f.users.create_privileged(alice(), None).await?;
        f.users.reset_user_password(&user.id, "pw2").await?;
        let stored = f.users.get_privileged(&user.id).await?;
        let hash = stored.password_hash.unwrap_or_default();
        assert!(verify_password("pw2", &hash)?);
        assert!(!verify_password("pw1", &hash)?);
        Ok(())
    }
}
