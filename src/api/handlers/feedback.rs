use axum::{
    Json,
    extract::{Extension, Path},
};
use std::sync::Arc;

use super::{Payload, Principal};
use crate::error::{ErrorBody, ServiceError};
use crate::feedback::{CreateFeedbackCommand, Feedback, UpdateFeedbackStatusCommand};
use crate::services::Services;

#[utoipa::path(
    post,
    path = "/feedback",
    request_body = CreateFeedbackCommand,
    responses(
        (status = 200, description = "Feedback stored", body = Feedback),
        (status = 400, description = "Empty or oversized subject or message", body = ErrorBody),
        (status = 403, description = "Missing (feedback, CREATE)", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "feedback"
)]
pub async fn create_feedback(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Payload(command): Payload<CreateFeedbackCommand>,
) -> Result<Json<Feedback>, ServiceError> {
    Ok(Json(
        services.feedback.create(&principal.context, command).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/feedback",
    responses(
        (status = 200, description = "All feedback", body = [Feedback]),
        (status = 403, description = "Missing (feedback, READ)", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "feedback"
)]
pub async fn list_feedback(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Feedback>>, ServiceError> {
    Ok(Json(services.feedback.list(&principal.context).await?))
}

#[utoipa::path(
    get,
    path = "/feedback/user/{id}",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Feedback submitted by the user", body = [Feedback]),
        (status = 403, description = "Not self and missing (feedback, READ)", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "feedback"
)]
pub async fn list_user_feedback(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Feedback>>, ServiceError> {
    Ok(Json(
        services
            .feedback
            .list_by_user(&principal.context, &id)
            .await?,
    ))
}

#[utoipa::path(
    put,
    path = "/feedback/{id}/status",
    params(("id" = String, Path, description = "Feedback id")),
    request_body = UpdateFeedbackStatusCommand,
    responses(
        (status = 200, description = "Status updated", body = Feedback),
        (status = 403, description = "Missing (feedback, UPDATE)", body = ErrorBody),
        (status = 404, description = "Unknown feedback", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "feedback"
)]
pub async fn update_feedback_status(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Payload(command): Payload<UpdateFeedbackStatusCommand>,
) -> Result<Json<Feedback>, ServiceError> {
    Ok(Json(
        services
            .feedback
            .update_status(&principal.context, &id, command.status)
            .await?,
    ))
}
