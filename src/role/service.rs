use std::sync::Arc;
use tracing::info;

use super::models::{CreateRoleCommand, Role, UpdateRoleCommand};
use crate::clock::Clock;
use crate::error::ServiceError;
use crate::permission::{PermissionContext, catalog};
use crate::store::{RoleRepo, new_object_id};

#[derive(Clone)]
pub struct RoleService {
    repo: Arc<dyn RoleRepo>,
    clock: Arc<dyn Clock>,
}

impl RoleService {
    #[must_use]
    pub fn new(repo: Arc<dyn RoleRepo>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// # Errors
    /// `PermissionDenied` without `(role, CREATE)`, `Conflict` on a taken name.
    pub async fn create(
        &self,
        ctx: &PermissionContext,
        cmd: CreateRoleCommand,
    ) -> Result<Role, ServiceError> {
        ctx.require(&catalog::ROLE_CREATE)?;
        self.create_privileged(cmd).await
    }

    /// Bootstrap path: no permission check.
    ///
    /// # Errors
    /// `BadRequest` on an empty name, `Conflict` on a taken name.
    pub async fn create_privileged(&self, cmd: CreateRoleCommand) -> Result<Role, ServiceError> {
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(ServiceError::BadRequest("role name is required".to_string()));
        }
        if self.repo.get_by_name(name).await?.is_some() {
            return Err(ServiceError::Conflict(format!("role {name} already exists")));
        }
        let role = Role {
            id: new_object_id(),
            name: name.to_string(),
            tags: cmd.tags,
            info: cmd.info,
            permissions: cmd.permissions,
            created_at: self.clock.now(),
            version: 1,
        };
        self.repo.insert(&role).await?;
        info!(role_id = %role.id, name = %role.name, "role created");
        Ok(role)
    }

    /// # Errors
    /// `PermissionDenied` without `(role, READ)`, `NotFound` for an unknown id.
    pub async fn get(&self, ctx: &PermissionContext, id: &str) -> Result<Role, ServiceError> {
        ctx.require(&catalog::ROLE_READ)?;
        self.get_privileged(id).await
    }

    /// # Errors
    /// `NotFound` for an unknown id.
    pub async fn get_privileged(&self, id: &str) -> Result<Role, ServiceError> {
        self.repo.get(id).await?.ok_or(ServiceError::NotFound("role"))
    }

    /// # Errors
    /// `PermissionDenied` without `(role, READ)`, `NotFound` for an unknown name.
    pub async fn get_by_name(&self, ctx: &PermissionContext, name: &str) -> Result<Role, ServiceError> {
        ctx.require(&catalog::ROLE_READ)?;
        self.get_by_name_privileged(name).await
    }

    /// # Errors
    /// `NotFound` for an unknown name.
    pub async fn get_by_name_privileged(&self, name: &str) -> Result<Role, ServiceError> {
        self.repo
            .get_by_name(name)
            .await?
            .ok_or(ServiceError::NotFound("role"))
    }

    /// # Errors
    /// `PermissionDenied` without `(role, READ)`.
    pub async fn list(&self, ctx: &PermissionContext) -> Result<Vec<Role>, ServiceError> {
        ctx.require(&catalog::ROLE_READ)?;
        Ok(self.repo.list().await?)
    }

    /// # Errors
    /// `PermissionDenied` without `(role, READ)`.
    pub async fn exists_by_name(&self, ctx: &PermissionContext, name: &str) -> Result<bool, ServiceError> {
        ctx.require(&catalog::ROLE_READ)?;
        Ok(self.repo.get_by_name(name).await?.is_some())
    }

    /// # Errors
    /// `PermissionDenied` without `(role, UPDATE)`, `NotFound`, or `Conflict` on rename clash.
    pub async fn update(
        &self,
        ctx: &PermissionContext,
        id: &str,
        cmd: UpdateRoleCommand,
    ) -> Result<Role, ServiceError> {
        ctx.require(&catalog::ROLE_UPDATE)?;
        let mut role = self.get_privileged(id).await?;
        if let Some(name) = cmd.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ServiceError::BadRequest("role name is required".to_string()));
            }
            role.name = name;
        }
        if let Some(permissions) = cmd.permissions {
            role.permissions = permissions;
        }
        if let Some(tags) = cmd.tags {
            role.tags = tags;
        }
        if cmd.info.is_some() {
            role.info = cmd.info;
        }
        role.version += 1;
        if !self.repo.update(&role).await? {
            return Err(ServiceError::NotFound("role"));
        }
        Ok(role)
    }

    /// # Errors
    /// `PermissionDenied` without `(role, DELETE)`, `NotFound` for an unknown id.
    pub async fn delete(&self, ctx: &PermissionContext, id: &str) -> Result<(), ServiceError> {
        ctx.require(&catalog::ROLE_DELETE)?;
        if self.repo.delete(id).await? {
            info!(role_id = %id, "role deleted");
            Ok(())
        } else {
            Err(ServiceError::NotFound("role"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::permission::Permission;
    use crate::store::MemoryStore;

    fn service() -> RoleService {
        RoleService::new(Arc::new(MemoryStore::new()), Arc::new(ManualClock::default()))
    }

    #[tokio::test]
    async fn duplicate_name_conflicts() -> anyhow::Result<()> {
        let roles = service();
        let admin = PermissionContext::admin();
        let cmd = CreateRoleCommand::new("admin-ops", vec![catalog::ADMIN]);

        let role = roles.create(&admin, cmd.clone()).await?;
        assert_eq!(role.version, 1);
        assert_eq!(role.id.len(), 24);

        let again = roles.create(&admin, cmd).await;
        assert!(matches!(again, Err(ServiceError::Conflict(_))));
        Ok(())
    }

    #[tokio::test]
    async fn names_are_case_sensitive() -> anyhow::Result<()> {
        let roles = service();
        let admin = PermissionContext::admin();
        roles.create(&admin, CreateRoleCommand::new("Ops", Vec::new())).await?;
        roles.create(&admin, CreateRoleCommand::new("ops", Vec::new())).await?;
        assert!(roles.exists_by_name(&admin, "ops").await?);
        assert!(!roles.exists_by_name(&admin, "OPS").await?);
        Ok(())
    }

    #[tokio::test]
    async fn update_bumps_version() -> anyhow::Result<()> {
        let roles = service();
        let admin = PermissionContext::admin();
        let role = roles.create(&admin, CreateRoleCommand::new("ops", Vec::new())).await?;

        let updated = roles
            .update(
                &admin,
                &role.id,
                UpdateRoleCommand {
                    permissions: Some(vec![Permission::new("user", "READ")]),
                    ..UpdateRoleCommand::default()
                },
            )
            .await?;
        assert_eq!(updated.version, 2);
        assert_eq!(updated.permissions, vec![catalog::USER_READ]);
        assert_eq!(updated.name, "ops");
        Ok(())
    }

    #[tokio::test]
    async fn gate_checks_each_operation() -> anyhow::Result<()> {
        let roles = service();
        let role = roles
            .create_privileged(CreateRoleCommand::new("ops", Vec::new()))
            .await?;
        let reader = PermissionContext::new("u1", vec![catalog::ROLE_READ]);

        assert_eq!(roles.get(&reader, &role.id).await?.name, "ops");
        assert!(matches!(
            roles.delete(&reader, &role.id).await,
            Err(ServiceError::PermissionDenied)
        ));
        assert!(matches!(
            roles.create(&reader, CreateRoleCommand::new("x", Vec::new())).await,
            Err(ServiceError::PermissionDenied)
        ));
        Ok(())
    }
}
