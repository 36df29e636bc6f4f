//! Emailed one-time code flow. The code itself is never returned over HTTP.

use axum::{Json, extract::Extension};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::{MessageResponse, Payload};
use crate::error::{ErrorBody, ServiceError};
use crate::services::Services;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendCodeRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyCodeRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

#[utoipa::path(
    post,
    path = "/reset-password/send-email",
    request_body = SendCodeRequest,
    responses(
        (status = 200, description = "Code queued for delivery", body = MessageResponse),
        (status = 404, description = "No user with this email", body = ErrorBody)
    ),
    tag = "reset-password"
)]
pub async fn send_email(
    services: Extension<Arc<Services>>,
    Payload(request): Payload<SendCodeRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    services.reset_password.send_code(&request.email).await?;
    Ok(Json(MessageResponse::new("reset code sent")))
}

#[utoipa::path(
    post,
    path = "/reset-password/verify-code",
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, description = "Code is valid", body = MessageResponse),
        (status = 400, description = "Code expired or issued for another email", body = ErrorBody),
        (status = 404, description = "Unknown code", body = ErrorBody)
    ),
    tag = "reset-password"
)]
pub async fn verify_code(
    services: Extension<Arc<Services>>,
    Payload(request): Payload<VerifyCodeRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    services
        .reset_password
        .verify_code(&request.email, &request.code)
        .await?;
    Ok(Json(MessageResponse::new("code is valid")))
}

#[utoipa::path(
    post,
    path = "/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password replaced, code consumed", body = MessageResponse),
        (status = 400, description = "Code expired or issued for another email", body = ErrorBody),
        (status = 404, description = "Unknown code", body = ErrorBody)
    ),
    tag = "reset-password"
)]
pub async fn reset(
    services: Extension<Arc<Services>>,
    Payload(request): Payload<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ServiceError> {
    services
        .reset_password
        .reset_password(&request.email, &request.code, &request.new_password)
        .await?;
    Ok(Json(MessageResponse::new("password updated")))
}
