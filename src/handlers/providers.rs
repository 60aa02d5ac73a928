//! # Provider Administration Handlers
//!
//! Operator-only endpoints for inspecting providers, triggering catalog syncs
//! and running explicit health checks.

use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::aggregator::HealthCheckReport;
use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::providers::config::{ApiFamily, ProviderStatus};
use crate::scheduler::SyncResult;
use crate::server::AppState;

/// Registered provider with its live health and rate-limit state
#[derive(Debug, Serialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    pub id: Uuid,
    #[schema(example = "amadeus")]
    pub code: String,
    pub api_name: String,
    pub family: ApiFamily,
    pub status: ProviderStatus,
    pub consecutive_failures: u32,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub rate_limit_per_minute: u32,
    /// Requests still admissible in the current one-minute window
    pub remaining_capacity: u32,
}

/// Response containing the registered providers
#[derive(Debug, Serialize, ToSchema)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderSummary>,
}

/// List registered providers ordered by code
#[utoipa::path(
    get,
    path = "/providers",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Registered providers", body = ProvidersResponse),
        (status = 401, description = "Missing or invalid operator token", body = ApiError)
    ),
    tag = "providers"
)]
pub async fn list_providers(
    _auth: OperatorAuth,
    State(state): State<AppState>,
) -> Json<ProvidersResponse> {
    let limiter = state.aggregator.limiter();
    let providers = state
        .aggregator
        .registry()
        .list_all()
        .into_iter()
        .map(|provider| {
            let config = provider.config();
            ProviderSummary {
                id: provider.id(),
                code: provider.code().to_string(),
                api_name: config.api_name.clone(),
                family: config.api_family,
                status: provider.status(),
                consecutive_failures: provider.consecutive_failures(),
                last_sync_at: provider.last_sync_at(),
                rate_limit_per_minute: config.rate_limit_per_minute,
                remaining_capacity: limiter.remaining(config),
            }
        })
        .collect();

    Json(ProvidersResponse { providers })
}

/// Sync every active provider into the catalog
#[utoipa::path(
    post,
    path = "/providers/sync",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Per-provider sync results", body = [SyncResult]),
        (status = 401, description = "Missing or invalid operator token", body = ApiError)
    ),
    tag = "providers"
)]
pub async fn sync_all_providers(
    _auth: OperatorAuth,
    State(state): State<AppState>,
) -> Json<Vec<SyncResult>> {
    Json(state.scheduler.sync_all().await)
}

/// Sync one provider into the catalog
#[utoipa::path(
    post,
    path = "/providers/{id}/sync",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Provider id")),
    responses(
        (status = 200, description = "Sync result", body = SyncResult),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "Unknown provider", body = ApiError)
    ),
    tag = "providers"
)]
pub async fn sync_provider(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SyncResult>, ApiError> {
    Ok(Json(state.scheduler.sync_provider(id).await?))
}

/// Probe a provider's status endpoint; success restores an errored provider
#[utoipa::path(
    post,
    path = "/providers/{id}/health-check",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Provider id")),
    responses(
        (status = 200, description = "Health check outcome", body = HealthCheckReport),
        (status = 401, description = "Missing or invalid operator token", body = ApiError),
        (status = 404, description = "Unknown provider", body = ApiError)
    ),
    tag = "providers"
)]
pub async fn health_check_provider(
    _auth: OperatorAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<HealthCheckReport>, ApiError> {
    Ok(Json(state.aggregator.health_check(id).await?))
}
