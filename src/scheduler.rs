//! # Sync Scheduler
//!
//! Background task that refreshes the flight catalog from every active
//! provider. Each provider sync runs the same pipeline as a live search over
//! a rolling window of dates for the configured routes, or pulls the
//! provider's full catalog endpoint when it has one, and upserts the
//! normalized records by identity. Providers sync independently; one failing
//! never holds up another.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Duration as TokioDuration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::aggregator::Aggregator;
use crate::config::SchedulerConfig;
use crate::models::criteria::SearchCriteria;
use crate::normalization::NormalizationOutcome;
use crate::providers::error::{ProviderError, RegistryError};
use crate::providers::registry::{ProviderFilter, RegisteredProvider};

/// Outcome of syncing one provider.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub provider_id: Uuid,
    pub provider_code: String,
    /// Normalized records received from the provider
    pub found: usize,
    /// Records written to the catalog
    pub saved: usize,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Whether a provider last synced at `last_sync` is due at `now`.
pub fn is_due(last_sync: Option<DateTime<Utc>>, interval: Duration, now: DateTime<Utc>) -> bool {
    last_sync.is_none_or(|last| now - last >= interval)
}

/// Background scheduler service.
pub struct SyncScheduler {
    aggregator: Arc<Aggregator>,
    config: SchedulerConfig,
}

impl SyncScheduler {
    pub fn new(aggregator: Arc<Aggregator>, config: SchedulerConfig) -> Self {
        Self { aggregator, config }
    }

    /// Run the scheduler loop until the provided shutdown token fires.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            tick_interval_seconds = self.config.tick_interval_seconds,
            sync_interval_seconds = self.config.sync_interval_seconds,
            "Starting sync scheduler"
        );
        let tick_interval = TokioDuration::from_secs(self.config.tick_interval_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Sync scheduler shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = Instant::now();
                    let results = self.sync_due(Utc::now()).await;
                    let failed = results.iter().filter(|r| !r.errors.is_empty()).count();
                    if failed > 0 {
                        error!(providers = results.len(), failed, "Scheduler tick finished with provider errors");
                    } else {
                        debug!(providers = results.len(), "Scheduler tick finished");
                    }
                    histogram!("sync_scheduler_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Sync scheduler stopped");
    }

    /// Sync every active provider whose last sync is older than the interval.
    pub async fn sync_due(&self, now: DateTime<Utc>) -> Vec<SyncResult> {
        let interval = Duration::seconds(self.config.sync_interval_seconds as i64);
        let due: Vec<_> = self
            .aggregator
            .registry()
            .list_active(&ProviderFilter::default())
            .into_iter()
            .filter(|p| is_due(p.last_sync_at(), interval, now))
            .collect();
        self.sync_many(due).await
    }

    /// Sync every active provider, bounded by the configured concurrency.
    pub async fn sync_all(&self) -> Vec<SyncResult> {
        let providers = self
            .aggregator
            .registry()
            .list_active(&ProviderFilter::default());
        self.sync_many(providers).await
    }

    async fn sync_many(&self, providers: Vec<Arc<RegisteredProvider>>) -> Vec<SyncResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for provider in providers {
            let semaphore = Arc::clone(&semaphore);
            let aggregator = Arc::clone(&self.aggregator);
            let config = self.config.clone();
            let span = info_span!(
                "provider_sync",
                provider_id = %provider.id(),
                provider_code = %provider.code()
            );
            tasks.spawn(
                async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    sync_registered(&aggregator, &config, &provider).await
                }
                .instrument(span),
            );
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => error!(error = %err, "Provider sync task ended abnormally"),
            }
        }
        results.sort_by(|a, b| a.provider_code.cmp(&b.provider_code));
        results
    }

    /// Sync a single provider by id.
    #[instrument(skip_all, fields(provider_id = %provider_id))]
    pub async fn sync_provider(&self, provider_id: Uuid) -> Result<SyncResult, RegistryError> {
        let provider = self.aggregator.registry().get(provider_id)?;
        Ok(sync_registered(&self.aggregator, &self.config, &provider).await)
    }
}

async fn sync_registered(
    aggregator: &Aggregator,
    config: &SchedulerConfig,
    provider: &RegisteredProvider,
) -> SyncResult {
    let started_at = Utc::now();
    let started = Instant::now();
    let mut result = SyncResult {
        provider_id: provider.id(),
        provider_code: provider.code().to_string(),
        found: 0,
        saved: 0,
        errors: Vec::new(),
        started_at,
        finished_at: started_at,
    };

    if !provider.is_active() {
        result
            .errors
            .push(format!("provider status is {}; sync skipped", provider.status()));
        result.finished_at = Utc::now();
        return result;
    }

    let mut any_succeeded = false;
    if provider.config().endpoints.catalog.is_some() {
        match aggregator.fetch_catalog(provider).await {
            Ok(outcome) => {
                any_succeeded = true;
                save(aggregator, &mut result, outcome).await;
            }
            Err(err) => result.errors.push(format!("catalog: {err}")),
        }
    } else {
        let today = started_at.date_naive();
        'routes: for route in &config.routes {
            for offset in 0..config.window_days {
                let date = today + Duration::days(i64::from(offset));
                let criteria = SearchCriteria::one_way(&route.origin, &route.destination, date);
                match aggregator.query_provider(provider, &criteria).await {
                    Ok(outcome) => {
                        any_succeeded = true;
                        save(aggregator, &mut result, outcome).await;
                    }
                    Err(err) => {
                        result.errors.push(format!("{route} {date}: {err}"));
                        if stops_sweep(&err) || !provider.is_active() {
                            warn!(error = %err, "Stopping provider sync sweep");
                            break 'routes;
                        }
                    }
                }
            }
        }
    }

    if any_succeeded {
        let synced_at = Utc::now();
        provider.mark_synced(synced_at);
        if let Err(err) = aggregator
            .store()
            .save_last_sync(provider.id(), synced_at)
            .await
        {
            warn!(error = %err, "Failed to persist provider last sync time");
        }
    }

    result.finished_at = Utc::now();
    histogram!("sync_provider_duration_seconds", "provider" => provider.code().to_string())
        .record(started.elapsed().as_secs_f64());
    info!(
        found = result.found,
        saved = result.saved,
        errors = result.errors.len(),
        "Provider sync finished"
    );
    result
}

async fn save(aggregator: &Aggregator, result: &mut SyncResult, outcome: NormalizationOutcome) {
    result.found += outcome.records.len();
    let mut saved = 0;
    for record in &outcome.records {
        match aggregator.catalog().upsert(record).await {
            Ok(_) => saved += 1,
            Err(err) => result
                .errors
                .push(format!("failed to store {}: {err}", record.flight_number)),
        }
    }
    result.saved += saved;
    counter!("sync_records_saved_total", "provider" => result.provider_code.clone())
        .increment(saved as u64);
}

/// Errors that will repeat for every remaining date in the sweep.
fn stops_sweep(err: &ProviderError) -> bool {
    matches!(
        err,
        ProviderError::RateLimitExceeded { .. }
            | ProviderError::Auth(_)
            | ProviderError::Configuration { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_manager::AuthError;

    #[test]
    fn due_when_never_synced_or_interval_elapsed() {
        let now = Utc::now();
        let hour = Duration::hours(1);
        assert!(is_due(None, hour, now));
        assert!(is_due(Some(now - Duration::minutes(61)), hour, now));
        assert!(is_due(Some(now - hour), hour, now));
        assert!(!is_due(Some(now - Duration::minutes(59)), hour, now));
    }

    #[test]
    fn sweep_stops_on_errors_that_repeat() {
        assert!(stops_sweep(&ProviderError::RateLimitExceeded {
            limit_per_minute: 1
        }));
        assert!(stops_sweep(&ProviderError::Auth(AuthError::MissingTokenEndpoint)));
        assert!(!stops_sweep(&ProviderError::Http {
            status: 404,
            body: None,
            attempts: 1
        }));
    }
}
