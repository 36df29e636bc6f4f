//! Request gates that run before the handlers.

use axum::{
    extract::{ConnectInfo, Extension, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use super::handlers::{ClientIp, Principal, extract_client_ip};
use crate::error::ServiceError;
use crate::services::Services;

const UNKNOWN_CLIENT: &str = "unknown";

/// Proxy headers first, then the socket peer.
#[must_use]
pub fn client_ip(request: &Request) -> String {
    extract_client_ip(request.headers())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Reject requests whose `(ip, method, path)` is currently blocked.
pub async fn ip_block(
    Extension(services): Extension<Arc<Services>>,
    mut request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request);
    let blocked = services
        .blocker
        .is_blocked(&ip, request.method().as_str(), request.uri().path())
        .await;
    if blocked {
        warn!(ip, method = %request.method(), path = request.uri().path(), "blocked request");
        return ServiceError::PermissionDenied.into_response();
    }
    request.extensions_mut().insert(ClientIp(ip));
    next.run(request).await
}

/// Resolve the bearer (or `?token=`) principal and attach its permission context.
pub async fn require_access_token(
    Extension(services): Extension<Arc<Services>>,
    mut request: Request,
    next: Next,
) -> Response {
    let user_id = match services
        .tokens
        .extract_principal(request.uri(), request.headers())
    {
        Ok(user_id) => user_id,
        Err(err) => {
            debug!("access token rejected: {err}");
            return ServiceError::Unauthorized.into_response();
        }
    };
    let context = match services.users.permission_context(&user_id).await {
        Ok(context) => context,
        Err(ServiceError::NotFound(_)) => return ServiceError::Unauthorized.into_response(),
        Err(err) => return err.into_response(),
    };
    request.extensions_mut().insert(Principal { user_id, context });
    next.run(request).await
}
