//! # Search aggregation
//!
//! Fans a validated search out to every eligible provider, one task per
//! provider, and fans the outcomes back in. Each provider call runs the
//! pipeline rate limiter → auth header → translator → HTTP → normalizer.
//! A provider failing never fails the search: its error is reported next to
//! whatever the other providers returned. Live results are then merged with
//! catalog records for the same route and date, and post-filters applied.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{Instrument, info, info_span, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth_manager::AuthManager;
use crate::catalog::FlightCatalog;
use crate::config::SearchConfig;
use crate::dispatch::{Dispatcher, ProviderRequest};
use crate::models::criteria::{SearchCriteria, ValidationError};
use crate::models::flight_record::CanonicalFlightRecord;
use crate::normalization::NormalizationOutcome;
use crate::providers::config::{ApiFamily, ProviderStatus, SearchMethod};
use crate::providers::error::{ProviderError, ProviderErrorReport, RegistryError};
use crate::providers::registry::{
    ProviderFilter, ProviderRegistry, ProviderStateStore, RegisteredProvider,
};
use crate::rate_limiter::RateLimiter;

/// Caller options narrowing a search.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Only query providers with these codes.
    pub provider_codes: Vec<String>,
    /// Only query providers of these families.
    pub families: Vec<ApiFamily>,
    /// Drop results whose cabin differs from the requested one.
    pub cabin_only: bool,
    /// Keep only these marketing carriers (`AA`, `B6`).
    pub airlines: Vec<String>,
    /// Overall deadline; the configured default applies when unset.
    pub deadline: Option<Duration>,
}

/// Merged search results with the per-provider error map.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub search_id: Uuid,
    pub results: Vec<CanonicalFlightRecord>,
    /// Failed providers keyed by provider id
    #[schema(value_type = Object)]
    pub provider_errors: BTreeMap<Uuid, ProviderErrorReport>,
    /// Provider entries discarded during normalization
    pub dropped_entries: usize,
    pub providers_queried: usize,
}

impl SearchOutcome {
    /// Every queried provider failed.
    pub fn all_providers_failed(&self) -> bool {
        self.providers_queried > 0 && self.provider_errors.len() == self.providers_queried
    }
}

/// Outcome of an explicit provider health check.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckReport {
    pub provider_id: Uuid,
    pub provider_code: String,
    pub healthy: bool,
    pub status: ProviderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Copy)]
enum ProviderCall<'a> {
    Search(&'a SearchCriteria),
    Catalog,
}

pub struct Aggregator {
    registry: Arc<ProviderRegistry>,
    auth: Arc<AuthManager>,
    limiter: Arc<RateLimiter>,
    dispatcher: Dispatcher,
    catalog: Arc<dyn FlightCatalog>,
    store: Arc<dyn ProviderStateStore>,
    default_deadline: Duration,
}

impl Aggregator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        auth: Arc<AuthManager>,
        limiter: Arc<RateLimiter>,
        dispatcher: Dispatcher,
        catalog: Arc<dyn FlightCatalog>,
        store: Arc<dyn ProviderStateStore>,
        search: &SearchConfig,
    ) -> Self {
        Self {
            registry,
            auth,
            limiter,
            dispatcher,
            catalog,
            store,
            default_deadline: Duration::from_millis(search.deadline_ms),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn catalog(&self) -> &Arc<dyn FlightCatalog> {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<dyn ProviderStateStore> {
        &self.store
    }

    /// Search every eligible provider concurrently.
    ///
    /// Only invalid criteria fail the call, and they fail it before any
    /// provider is contacted. Providers still running when the deadline
    /// expires are cancelled and reported as timeouts.
    #[instrument(skip_all, fields(search_id, origin = %criteria.origin, destination = %criteria.destination))]
    pub async fn search(
        self: &Arc<Self>,
        criteria: &SearchCriteria,
        options: &SearchOptions,
    ) -> Result<SearchOutcome, ValidationError> {
        let criteria = criteria.validated()?;
        let started = std::time::Instant::now();
        let search_id = Uuid::new_v4();
        tracing::Span::current().record("search_id", tracing::field::display(search_id));

        let filter = ProviderFilter {
            families: options.families.clone(),
            codes: options.provider_codes.clone(),
        };
        let providers = self.registry.list_active(&filter);
        let providers_queried = providers.len();
        let deadline =
            tokio::time::Instant::now() + options.deadline.unwrap_or(self.default_deadline);

        let mut pending: HashMap<Uuid, Arc<RegisteredProvider>> = providers
            .iter()
            .map(|p| (p.id(), Arc::clone(p)))
            .collect();
        let mut tasks = JoinSet::new();
        for provider in providers {
            let this = Arc::clone(self);
            let criteria = criteria.clone();
            let span = info_span!(
                "provider_search",
                provider_id = %provider.id(),
                provider_code = %provider.code()
            );
            tasks.spawn(
                async move {
                    let result = this.query_provider(&provider, &criteria).await;
                    (provider.id(), result)
                }
                .instrument(span),
            );
        }

        let mut live = Vec::new();
        let mut provider_errors = BTreeMap::new();
        let mut dropped_entries = 0;
        let mut deadline_expired = false;

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((provider_id, result)))) => {
                    let Some(provider) = pending.remove(&provider_id) else {
                        continue;
                    };
                    match result {
                        Ok(outcome) => {
                            dropped_entries += outcome.dropped;
                            live.extend(outcome.records);
                        }
                        Err(err) => {
                            provider_errors.insert(
                                provider_id,
                                ProviderErrorReport::new(provider_id, provider.code(), &err),
                            );
                        }
                    }
                }
                Ok(Some(Err(join_err))) => {
                    warn!(error = %join_err, "Provider search task ended abnormally");
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_expired = true;
                    tasks.abort_all();
                    break;
                }
            }
        }

        for (provider_id, provider) in pending {
            let err = if deadline_expired {
                ProviderError::DeadlineExceeded
            } else {
                ProviderError::Internal {
                    details: "search task panicked".to_string(),
                }
            };
            counter!(
                "aggregator_provider_requests_total",
                "provider" => provider.code().to_string(),
                "outcome" => err.code()
            )
            .increment(1);
            provider_errors.insert(
                provider_id,
                ProviderErrorReport::new(provider_id, provider.code(), &err),
            );
        }

        let stored = self.catalog_records(&criteria, &filter).await;
        let results: Vec<_> = merge_records(stored, live)
            .into_iter()
            .filter(|record| passes_post_filters(record, &criteria, options))
            .collect();

        let elapsed = started.elapsed();
        histogram!("aggregator_search_duration_seconds").record(elapsed.as_secs_f64());
        info!(
            providers = providers_queried,
            failed = provider_errors.len(),
            results = results.len(),
            dropped_entries,
            deadline_expired,
            elapsed_ms = elapsed.as_millis() as u64,
            "Search completed"
        );

        Ok(SearchOutcome {
            search_id,
            results,
            provider_errors,
            dropped_entries,
            providers_queried,
        })
    }

    /// Run the search pipeline against a single provider.
    pub async fn query_provider(
        &self,
        provider: &RegisteredProvider,
        criteria: &SearchCriteria,
    ) -> Result<NormalizationOutcome, ProviderError> {
        self.call(provider, ProviderCall::Search(criteria)).await
    }

    /// Pull the provider's full catalog from its `catalog` endpoint.
    pub async fn fetch_catalog(
        &self,
        provider: &RegisteredProvider,
    ) -> Result<NormalizationOutcome, ProviderError> {
        self.call(provider, ProviderCall::Catalog).await
    }

    async fn call(
        &self,
        provider: &RegisteredProvider,
        call: ProviderCall<'_>,
    ) -> Result<NormalizationOutcome, ProviderError> {
        let config = provider.config();
        let result = if self.limiter.try_acquire(config) {
            self.call_admitted(provider, call).await
        } else {
            Err(ProviderError::RateLimitExceeded {
                limit_per_minute: config.rate_limit_per_minute,
            })
        };
        self.record_outcome(provider, &result).await;
        result
    }

    async fn call_admitted(
        &self,
        provider: &RegisteredProvider,
        call: ProviderCall<'_>,
    ) -> Result<NormalizationOutcome, ProviderError> {
        let config = provider.config();
        let auth = self.auth.get_auth_header(config).await?;

        let payload = match call {
            ProviderCall::Search(criteria) => Some(provider.translator().translate(criteria)),
            ProviderCall::Catalog => None,
        };
        let (method, path) = match call {
            ProviderCall::Search(_) => (config.endpoints.search_method, config.endpoints.search.as_str()),
            ProviderCall::Catalog => (
                SearchMethod::Get,
                config
                    .endpoints
                    .catalog
                    .as_deref()
                    .ok_or_else(|| ProviderError::Configuration {
                        details: "no catalog endpoint configured".to_string(),
                    })?,
            ),
        };

        let raw = self
            .dispatcher
            .send(
                config,
                &auth,
                &ProviderRequest {
                    method,
                    path,
                    payload: payload.as_ref(),
                },
            )
            .await?;

        provider
            .normalizer()
            .normalize(config, &raw)
            .map_err(|err| ProviderError::MalformedResponse {
                details: err.to_string(),
            })
    }

    async fn record_outcome(
        &self,
        provider: &RegisteredProvider,
        result: &Result<NormalizationOutcome, ProviderError>,
    ) {
        let outcome = match result {
            Ok(_) => "success",
            Err(err) => err.code(),
        };
        counter!(
            "aggregator_provider_requests_total",
            "provider" => provider.code().to_string(),
            "outcome" => outcome
        )
        .increment(1);

        match result {
            Ok(_) => {
                if provider.consecutive_failures() > 0 {
                    provider.record_success();
                    self.persist_status(provider).await;
                }
            }
            Err(err) if err.counts_toward_health() => {
                provider.record_failure();
                self.persist_status(provider).await;
            }
            Err(err) => {
                info!(error = %err, code = err.code(), "Provider call failed");
            }
        }
    }

    async fn persist_status(&self, provider: &RegisteredProvider) {
        if let Err(err) = self
            .store
            .save_status(provider.id(), provider.status(), provider.consecutive_failures())
            .await
        {
            warn!(provider_code = %provider.code(), error = %err, "Failed to persist provider status");
        }
    }

    async fn catalog_records(
        &self,
        criteria: &SearchCriteria,
        filter: &ProviderFilter,
    ) -> Vec<CanonicalFlightRecord> {
        let records = match self
            .catalog
            .find_route(&criteria.origin, &criteria.destination, criteria.departure_date)
            .await
        {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "Catalog lookup failed; returning live results only");
                return Vec::new();
            }
        };
        if filter.families.is_empty() && filter.codes.is_empty() {
            return records;
        }
        let allowed: HashSet<Uuid> = self
            .registry
            .list_all()
            .iter()
            .filter(|p| filter.matches(p.config()))
            .map(|p| p.id())
            .collect();
        records
            .into_iter()
            .filter(|r| allowed.contains(&r.provider_id))
            .collect()
    }

    /// Probe the provider's status endpoint; a 2xx restores an errored
    /// provider to `active`.
    #[instrument(skip_all, fields(provider_id = %provider_id))]
    pub async fn health_check(&self, provider_id: Uuid) -> Result<HealthCheckReport, RegistryError> {
        let provider = self.registry.get(provider_id)?;
        let config = provider.config();

        let probe = match self.auth.get_auth_header(config).await {
            Ok(auth) => self.dispatcher.probe(config, &auth).await,
            Err(err) => Err(ProviderError::from(err)),
        };

        let report = match probe {
            Ok(http_status) => {
                provider.mark_healthy();
                self.persist_status(&provider).await;
                HealthCheckReport {
                    provider_id,
                    provider_code: provider.code().to_string(),
                    healthy: true,
                    status: provider.status(),
                    http_status: Some(http_status),
                    error: None,
                }
            }
            Err(err) => HealthCheckReport {
                provider_id,
                provider_code: provider.code().to_string(),
                healthy: false,
                status: provider.status(),
                http_status: match &err {
                    ProviderError::Http { status, .. } => Some(*status),
                    _ => None,
                },
                error: Some(err.to_string()),
            },
        };
        info!(healthy = report.healthy, status = %report.status, "Provider health check finished");
        Ok(report)
    }
}

/// Catalog records first; a live record with the same identity replaces the
/// stored one only when it is fresher.
pub fn merge_records(
    catalog: Vec<CanonicalFlightRecord>,
    live: Vec<CanonicalFlightRecord>,
) -> Vec<CanonicalFlightRecord> {
    let mut merged: Vec<CanonicalFlightRecord> = Vec::with_capacity(catalog.len() + live.len());
    let mut index = HashMap::new();

    for record in catalog.into_iter().chain(live) {
        let identity = record.identity();
        match index.get(&identity) {
            Some(&idx) => {
                let existing: &mut CanonicalFlightRecord = &mut merged[idx];
                if record.last_updated > existing.last_updated {
                    *existing = record;
                }
            }
            None => {
                index.insert(identity, merged.len());
                merged.push(record);
            }
        }
    }
    merged
}

fn passes_post_filters(
    record: &CanonicalFlightRecord,
    criteria: &SearchCriteria,
    options: &SearchOptions,
) -> bool {
    (!options.cabin_only || record.cabin_class == criteria.cabin_class)
        && (options.airlines.is_empty()
            || options
                .airlines
                .iter()
                .any(|airline| airline.trim().eq_ignore_ascii_case(record.carrier_code())))
}
