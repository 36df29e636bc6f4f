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
use crate::permission::Permission;
use crate::role::Role;
use crate::services::Services;
use crate::user::{CreateUserCommand, UpdateUserCommand, UserRoleCommand, UserView};

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct UserExistsQuery {
    pub username: Option<String>,
    pub email: Option<String>,
}

#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "All users", body = [UserView]),
        (status = 403, description = "Missing (user, READ)", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn list_users(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<UserView>>, ServiceError> {
    let users = services.users.list(&principal.context).await?;
    Ok(Json(users.into_iter().map(UserView::from).collect()))
}

#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserCommand,
    responses(
        (status = 200, description = "User created", body = UserView),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 403, description = "Missing (user, CREATE)", body = ErrorBody),
        (status = 409, description = "Username or email taken", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn create_user(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Payload(command): Payload<CreateUserCommand>,
) -> Result<Json<UserView>, ServiceError> {
    let user = services.users.create(&principal.context, command).await?;
    Ok(Json(UserView::from(user)))
}

/// Exactly one of `username` or `email` is checked; `username` wins when both are given.
#[utoipa::path(
    get,
    path = "/users/exists",
    params(UserExistsQuery),
    responses(
        (status = 200, description = "Whether a matching user exists", body = ExistsResponse),
        (status = 400, description = "Neither username nor email given", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn user_exists(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<UserExistsQuery>,
) -> Result<Json<ExistsResponse>, ServiceError> {
    let exists = match (query.username, query.email) {
        (Some(username), _) => services.users.exists_by_username(&principal.context, &username).await?,
        (None, Some(email)) => services.users.exists_by_email(&principal.context, &email).await?,
        (None, None) => {
            return Err(ServiceError::BadRequest("username or email is required".to_string()));
        }
    };
    Ok(Json(ExistsResponse { exists }))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserView),
        (status = 403, description = "Not self and missing (user, READ)", body = ErrorBody),
        (status = 404, description = "Unknown user", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn get_user(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<UserView>, ServiceError> {
    let user = services.users.get(&principal.context, &id).await?;
    Ok(Json(UserView::from(user)))
}

#[utoipa::path(
    put,
    path = "/users/{id}",
    params(("id" = String, Path, description = "User id")),
    request_body = UpdateUserCommand,
    responses(
        (status = 200, description = "Updated user", body = UserView),
        (status = 403, description = "Missing (user, UPDATE) or (user, SELF_UPDATE)", body = ErrorBody),
        (status = 404, description = "Unknown user", body = ErrorBody),
        (status = 409, description = "Email taken", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn update_user(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Payload(command): Payload<UpdateUserCommand>,
) -> Result<Json<UserView>, ServiceError> {
    let user = services.users.update(&principal.context, &id, command).await?;
    Ok(Json(UserView::from(user)))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 403, description = "Missing (user, DELETE)", body = ErrorBody),
        (status = 404, description = "Unknown user", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn delete_user(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    services.users.delete(&principal.context, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/users/roles",
    request_body = UserRoleCommand,
    responses(
        (status = 200, description = "Role assigned", body = UserView),
        (status = 403, description = "Missing (user, UPDATE)", body = ErrorBody),
        (status = 404, description = "Unknown user or role", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn add_role(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Payload(command): Payload<UserRoleCommand>,
) -> Result<Json<UserView>, ServiceError> {
    let user = services
        .users
        .add_role(&principal.context, &command.user_id, &command.role_id)
        .await?;
    Ok(Json(UserView::from(user)))
}

#[utoipa::path(
    delete,
    path = "/users/roles",
    request_body = UserRoleCommand,
    responses(
        (status = 200, description = "Role removed", body = UserView),
        (status = 403, description = "Missing (user, UPDATE)", body = ErrorBody),
        (status = 404, description = "Unknown user", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn remove_role(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Payload(command): Payload<UserRoleCommand>,
) -> Result<Json<UserView>, ServiceError> {
    let user = services
        .users
        .remove_role(&principal.context, &command.user_id, &command.role_id)
        .await?;
    Ok(Json(UserView::from(user)))
}

#[utoipa::path(
    get,
    path = "/users/{id}/roles",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Assigned roles", body = [Role]),
        (status = 404, description = "Unknown user", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn get_roles(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Role>>, ServiceError> {
    Ok(Json(services.users.get_roles(&principal.context, &id).await?))
}

#[utoipa::path(
    get,
    path = "/users/{id}/permissions",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Effective permissions", body = [Permission]),
        (status = 404, description = "Unknown user", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn get_permissions(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Permission>>, ServiceError> {
    Ok(Json(
        services
            .users
            .get_permission_list(&principal.context, &id)
            .await?,
    ))
}
