use axum::{
    Json,
    extract::{Extension, Path},
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::{Payload, Principal};
use crate::error::{ErrorBody, ServiceError};
use crate::services::Services;
use crate::stats::StatsView;

#[derive(Debug, Deserialize, ToSchema)]
pub struct IncrementRequest {
    #[serde(default = "one")]
    pub by: i64,
}

const fn one() -> i64 {
    1
}

#[utoipa::path(
    get,
    path = "/users/{id}/stats",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Activity statistics", body = StatsView),
        (status = 403, description = "Not self and missing (stats, READ)", body = ErrorBody),
        (status = 404, description = "Nothing recorded yet", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "stats"
)]
pub async fn get_stats(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<StatsView>, ServiceError> {
    Ok(Json(services.stats.get(&principal.context, &id).await?))
}

#[utoipa::path(
    post,
    path = "/users/{id}/stats/{counter}",
    params(
        ("id" = String, Path, description = "User id"),
        ("counter" = String, Path, description = "Counter name")
    ),
    request_body = IncrementRequest,
    responses(
        (status = 200, description = "Counter incremented", body = StatsView),
        (status = 400, description = "Unusable counter name", body = ErrorBody),
        (status = 403, description = "Not self and missing (stats, UPDATE)", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "stats"
)]
pub async fn increment_counter(
    services: Extension<Arc<Services>>,
    Extension(principal): Extension<Principal>,
    Path((id, counter)): Path<(String, String)>,
    Payload(request): Payload<IncrementRequest>,
) -> Result<Json<StatsView>, ServiceError> {
    Ok(Json(
        services
            .stats
            .increment(&principal.context, &id, &counter, request.by)
            .await?,
    ))
}
