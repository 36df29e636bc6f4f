use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use super::{ExistsResponse, Payload, Principal};
use crate::error::{ErrorBody, ServiceError};
use crate::role::{CreateRoleCommand, Role, UpdateRoleCommand};
use crate::services::Services;

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct RoleExistsQuery {
    pub name: String,
}

#[utoipa::path(
    get,
    path = "/roles",
    responses(
        (status = 200, description = "All roles", body = [Role]),
        (status = 403, description = "Missing (role, READ)", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "roles"
)]
pub async fn list_roles(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Role>>, ServiceError> {
    Ok(Json(services.roles.list(&principal.context).await?))
}

#[utoipa::path(
    post,
    path = "/roles",
    request_body = CreateRoleCommand,
    responses(
        (status = 200, description = "Role created", body = Role),
        (status = 403, description = "Missing (role, CREATE)", body = ErrorBody),
        (status = 409, description = "Name taken", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "roles"
)]
pub async fn create_role(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Payload(command): Payload<CreateRoleCommand>,
) -> Result<Json<Role>, ServiceError> {
    Ok(Json(services.roles.create(&principal.context, command).await?))
}

#[utoipa::path(
    get,
    path = "/roles/exists",
    params(RoleExistsQuery),
    responses(
        (status = 200, description = "Whether the name is taken", body = ExistsResponse)
    ),
    security(("bearer" = [])),
    tag = "roles"
)]
pub async fn role_exists(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<RoleExistsQuery>,
) -> Result<Json<ExistsResponse>, ServiceError> {
    let exists = services
        .roles
        .exists_by_name(&principal.context, &query.name)
        .await?;
    Ok(Json(ExistsResponse { exists }))
}

#[utoipa::path(
    get,
    path = "/roles/name/{name}",
    params(("name" = String, Path, description = "Role name")),
    responses(
        (status = 200, description = "Role", body = Role),
        (status = 404, description = "Unknown role", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "roles"
)]
pub async fn get_role_by_name(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Path(name): Path<String>,
) -> Result<Json<Role>, ServiceError> {
    Ok(Json(services.roles.get_by_name(&principal.context, &name).await?))
}

#[utoipa::path(
    get,
    path = "/roles/{id}",
    params(("id" = String, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role", body = Role),
        (status = 404, description = "Unknown role", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "roles"
)]
pub async fn get_role(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<Role>, ServiceError> {
    Ok(Json(services.roles.get(&principal.context, &id).await?))
}

#[utoipa::path(
    put,
    path = "/roles/{id}",
    params(("id" = String, Path, description = "Role id")),
    request_body = UpdateRoleCommand,
    responses(
        (status = 200, description = "Updated role", body = Role),
        (status = 403, description = "Missing (role, UPDATE)", body = ErrorBody),
        (status = 404, description = "Unknown role", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "roles"
)]
pub async fn update_role(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Payload(command): Payload<UpdateRoleCommand>,
) -> Result<Json<Role>, ServiceError> {
    Ok(Json(
        services.roles.update(&principal.context, &id, command).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/roles/{id}",
    params(("id" = String, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 403, description = "Missing (role, DELETE)", body = ErrorBody),
        (status = 404, description = "Unknown role", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "roles"
)]
pub async fn delete_role(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    services.roles.delete(&principal.context, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
