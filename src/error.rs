//! Canonical failure kinds and their single translation to HTTP.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

use crate::store::StoreError;
use crate::token::TokenError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("permission denied")]
    PermissionDenied,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    /// Detail is logged, never rendered.
    #[error("internal server error")]
    Internal(String),
    #[error("code expired")]
    CodeExpired,
    #[error("code invalid")]
    CodeInvalid,
    #[error("reset code not found")]
    ResetNotFound,
    #[error("account uses external sign-in")]
    OAuthWithPassword,
}

impl ServiceError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::BadRequest(_) | Self::CodeExpired | Self::CodeInvalid | Self::OAuthWithPassword => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) | Self::ResetNotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn internal(detail: impl std::fmt::Display) -> Self {
        Self::Internal(detail.to_string())
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(field) => Self::Conflict(format!("{field} already exists")),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid(_) => Self::Unauthorized,
            other => Self::Internal(other.to_string()),
        }
    }
}

/// JSON failure body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            error!("internal error: {detail}");
        }
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn kinds_map_to_status_codes() {
        let cases = [
            (ServiceError::Unauthorized, StatusCode::UNAUTHORIZED),
            (ServiceError::PermissionDenied, StatusCode::FORBIDDEN),
            (ServiceError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::NotFound("user"), StatusCode::NOT_FOUND),
            (ServiceError::Conflict("x".into()), StatusCode::CONFLICT),
            (ServiceError::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
            (ServiceError::CodeExpired, StatusCode::BAD_REQUEST),
            (ServiceError::CodeInvalid, StatusCode::BAD_REQUEST),
            (ServiceError::ResetNotFound, StatusCode::NOT_FOUND),
            (ServiceError::OAuthWithPassword, StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }

    #[test]
    fn store_conflict_becomes_conflict() {
        let err = ServiceError::from(StoreError::Conflict("username"));
        assert!(matches!(err, ServiceError::Conflict(ref msg) if msg == "username already exists"));
    }

    #[tokio::test]
    async fn internal_detail_is_not_rendered() -> anyhow::Result<()> {
        let response = ServiceError::internal("connection refused on 10.0.0.7").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let body: ErrorBody = serde_json::from_slice(&body)?;
        assert_eq!(body.error, "internal server error");
        Ok(())
    }
}
