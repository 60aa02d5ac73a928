//! # Flight Search Handlers

use std::time::Duration;

use axum::{extract::State, extract::rejection::JsonRejection, response::Json};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::aggregator::{SearchOptions, SearchOutcome};
use crate::error::{ApiError, all_providers_failed, validation_error};
use crate::models::criteria::SearchCriteria;
use crate::providers::config::ApiFamily;
use crate::server::AppState;

const MAX_DEADLINE_MS: u64 = 60_000;

/// Flight search request body
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub criteria: SearchCriteria,
    /// Restrict the search to these provider codes
    #[serde(default)]
    pub provider_codes: Vec<String>,
    /// Restrict the search to these provider families
    #[serde(default)]
    pub families: Vec<ApiFamily>,
    /// Drop results in other cabins
    #[serde(default)]
    pub cabin_only: bool,
    /// Keep only these marketing carriers
    #[serde(default)]
    pub airlines: Vec<String>,
    /// Overall deadline in milliseconds
    #[serde(default)]
    #[schema(example = 8000, maximum = 60000)]
    pub deadline_ms: Option<u64>,
}

impl SearchRequest {
    fn options(&self) -> Result<SearchOptions, ApiError> {
        let deadline = match self.deadline_ms {
            Some(ms) if ms == 0 || ms > MAX_DEADLINE_MS => {
                return Err(validation_error(
                    "Invalid search deadline",
                    serde_json::json!({ "deadlineMs": format!("must be between 1 and {MAX_DEADLINE_MS}") }),
                ));
            }
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        };

        Ok(SearchOptions {
            provider_codes: self.provider_codes.clone(),
            families: self.families.clone(),
            cabin_only: self.cabin_only,
            airlines: self.airlines.clone(),
            deadline,
        })
    }
}

/// Search every eligible provider and merge the results with the catalog
#[utoipa::path(
    post,
    path = "/flights/search",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Merged results with per-provider errors", body = SearchOutcome),
        (status = 400, description = "Invalid search criteria", body = ApiError),
        (status = 502, description = "Every queried provider failed", body = ApiError)
    ),
    tag = "flights"
)]
pub async fn search_flights(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchOutcome>, ApiError> {
    let Json(request) = payload?;
    let options = request.options()?;

    let outcome = state.aggregator.search(&request.criteria, &options).await?;

    if outcome.all_providers_failed() && outcome.results.is_empty() {
        return Err(all_providers_failed(&outcome.provider_errors));
    }
    Ok(Json(outcome))
}
