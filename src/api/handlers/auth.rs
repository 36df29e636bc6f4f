//! Login, signup, token refresh, logout and external sign-in.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode, Uri},
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, info_span};
use utoipa::ToSchema;

use super::{ClientIp, Payload, Principal};
use crate::error::{ErrorBody, ServiceError};
use crate::services::Services;
use crate::token::TokenPair;
use crate::user::{CreateUserCommand, UserView};

pub const SIGNUP_PATH: &str = "/auth/signUp";
pub const SIGNUP_BLOCK: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OAuthLoginRequest {
    /// Provider access token.
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session opened", body = TokenPair),
        (status = 400, description = "Account uses external sign-in", body = ErrorBody),
        (status = 401, description = "Wrong password", body = ErrorBody),
        (status = 404, description = "Unknown username", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    services: Extension<Arc<Services>>,
    Payload(request): Payload<LoginRequest>,
) -> Result<Json<TokenPair>, ServiceError> {
    let span = info_span!("auth.login", username = %request.username);
    let pair = services
        .auth
        .login(&request.username, &request.password)
        .instrument(span)
        .await?;
    Ok(Json(pair))
}

/// A successful signup blocks further signups from the same address for five seconds.
#[utoipa::path(
    post,
    path = "/auth/signUp",
    request_body = CreateUserCommand,
    responses(
        (status = 200, description = "Account created", body = UserView),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 403, description = "Address temporarily blocked", body = ErrorBody),
        (status = 409, description = "Username or email taken", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn sign_up(
    services: Extension<Arc<Services>>,
    Extension(client_ip): Extension<ClientIp>,
    Payload(command): Payload<CreateUserCommand>,
) -> Result<Json<UserView>, ServiceError> {
    let view = services.auth.sign_up(command).await?;
    services
        .blocker
        .add(&client_ip.0, "POST", SIGNUP_PATH, SIGNUP_BLOCK)
        .await;
    Ok(Json(view))
}

#[utoipa::path(
    get,
    path = "/auth/currentUser",
    responses(
        (status = 200, description = "Caller's profile", body = UserView),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn current_user(
    services: Extension<Arc<Services>>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Json<UserView>, ServiceError> {
    let user = services.auth.current_user(&uri, &headers).await?;
    Ok(Json(UserView::from(user)))
}

#[utoipa::path(
    post,
    path = "/auth/refreshToken",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Rotated token pair", body = TokenPair),
        (status = 401, description = "Unknown or expired refresh token", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn refresh_token(
    services: Extension<Arc<Services>>,
    Payload(request): Payload<RefreshTokenRequest>,
) -> Result<Json<TokenPair>, ServiceError> {
    Ok(Json(services.auth.refresh(&request.refresh_token).await?))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Session closed"),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
) -> Result<StatusCode, ServiceError> {
    services.auth.logout(&principal.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/auth/oauth/{provider}",
    params(("provider" = String, Path, description = "Registered provider name, e.g. google")),
    request_body = OAuthLoginRequest,
    responses(
        (status = 200, description = "Session opened", body = TokenPair),
        (status = 400, description = "Unknown provider", body = ErrorBody),
        (status = 401, description = "Provider rejected the token", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn oauth_login(
    services: Extension<Arc<Services>>,
    Path(provider): Path<String>,
    Payload(request): Payload<OAuthLoginRequest>,
) -> Result<Json<TokenPair>, ServiceError> {
    Ok(Json(services.auth.oauth_login(&provider, &request.token).await?))
}
