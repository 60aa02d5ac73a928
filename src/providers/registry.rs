//! Provider registry
//!
//! Holds every loaded provider together with the translator and normalizer
//! chosen for its family at registration, plus the live health state the
//! pipeline mutates: status, consecutive failures and last sync time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use super::config::{
    ApiFamily, AuthStrategy, Credentials, ProviderConfig, ProviderStatus, SearchMethod,
};
use super::error::RegistryError;
use crate::normalization::{NormalizerDefaults, ResponseNormalizer};
use crate::translation::RequestTranslator;

/// Persistence seam for the pipeline-owned provider fields.
#[async_trait]
pub trait ProviderStateStore: Send + Sync {
    async fn save_token(
        &self,
        provider_id: Uuid,
        access_token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()>;

    async fn save_status(
        &self,
        provider_id: Uuid,
        status: ProviderStatus,
        consecutive_failures: u32,
    ) -> anyhow::Result<()>;

    async fn save_last_sync(&self, provider_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()>;
}

/// State store that keeps nothing; used when providers are not database-backed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStateStore;

#[async_trait]
impl ProviderStateStore for NullStateStore {
    async fn save_token(&self, _: Uuid, _: &str, _: Option<DateTime<Utc>>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn save_status(&self, _: Uuid, _: ProviderStatus, _: u32) -> anyhow::Result<()> {
        Ok(())
    }

    async fn save_last_sync(&self, _: Uuid, _: DateTime<Utc>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Optional narrowing applied by [`ProviderRegistry::list_active`].
#[derive(Debug, Clone, Default)]
pub struct ProviderFilter {
    /// Only providers of these families; empty means any.
    pub families: Vec<ApiFamily>,
    /// Only providers with these codes; empty means any.
    pub codes: Vec<String>,
}

impl ProviderFilter {
    pub fn matches(&self, config: &ProviderConfig) -> bool {
        (self.families.is_empty() || self.families.contains(&config.api_family))
            && (self.codes.is_empty()
                || self
                    .codes
                    .iter()
                    .any(|code| code.eq_ignore_ascii_case(&config.code)))
    }
}

/// A provider as held by the registry.
pub struct RegisteredProvider {
    config: ProviderConfig,
    translator: RequestTranslator,
    normalizer: ResponseNormalizer,
    error_threshold: u32,
    status: RwLock<ProviderStatus>,
    consecutive_failures: AtomicU32,
    last_sync_at: RwLock<Option<DateTime<Utc>>>,
}

impl std::fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("id", &self.config.id)
            .field("code", &self.config.code)
            .field("family", &self.config.api_family)
            .field("status", &self.status())
            .field("consecutive_failures", &self.consecutive_failures())
            .finish()
    }
}

impl RegisteredProvider {
    pub fn id(&self) -> Uuid {
        self.config.id
    }

    pub fn code(&self) -> &str {
        &self.config.code
    }

    /// Administrator-owned configuration as loaded.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn translator(&self) -> &RequestTranslator {
        &self.translator
    }

    pub fn normalizer(&self) -> &ResponseNormalizer {
        &self.normalizer
    }

    pub fn status(&self) -> ProviderStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_active(&self) -> bool {
        self.status() == ProviderStatus::Active
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        *self.last_sync_at.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configuration with the live status and sync time folded in.
    pub fn snapshot(&self) -> ProviderConfig {
        let mut config = self.config.clone();
        config.status = self.status();
        config.last_sync_at = self.last_sync_at();
        config
    }

    /// Count a health-affecting failure.
    ///
    /// Returns `Some(ProviderStatus::Error)` when this failure crossed the
    /// threshold and moved an active provider to `error`.
    pub fn record_failure(&self) -> Option<ProviderStatus> {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!(
            "provider_consecutive_failures",
            "provider" => self.config.code.clone()
        )
        .set(f64::from(failures));

        if failures < self.error_threshold {
            return None;
        }
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        if *status != ProviderStatus::Active {
            return None;
        }
        *status = ProviderStatus::Error;
        warn!(
            provider_id = %self.config.id,
            provider_code = %self.config.code,
            consecutive_failures = failures,
            "Provider moved to error status"
        );
        Some(ProviderStatus::Error)
    }

    /// Reset the failure streak after a successful call. Does not clear `error`.
    pub fn record_success(&self) {
        if self.consecutive_failures.swap(0, Ordering::SeqCst) > 0 {
            metrics::gauge!(
                "provider_consecutive_failures",
                "provider" => self.config.code.clone()
            )
            .set(0.0);
        }
    }

    /// Result of an explicit health check; the only way out of `error`.
    pub fn mark_healthy(&self) {
        self.record_success();
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        if *status == ProviderStatus::Error {
            info!(
                provider_id = %self.config.id,
                provider_code = %self.config.code,
                "Provider restored to active after health check"
            );
            *status = ProviderStatus::Active;
        }
    }

    pub fn mark_synced(&self, at: DateTime<Utc>) {
        *self
            .last_sync_at
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(at);
    }
}

/// In-memory set of providers keyed by id.
pub struct ProviderRegistry {
    providers: RwLock<HashMap<Uuid, Arc<RegisteredProvider>>>,
    error_threshold: u32,
    normalizer_defaults: NormalizerDefaults,
}

impl ProviderRegistry {
    pub fn new(error_threshold: u32, normalizer_defaults: NormalizerDefaults) -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            error_threshold: error_threshold.max(1),
            normalizer_defaults,
        }
    }

    /// Validate and add (or replace, by id) a provider.
    ///
    /// Replacing an entry keeps its live failure streak.
    pub fn register(&self, config: ProviderConfig) -> Result<Arc<RegisteredProvider>, RegistryError> {
        self.insert(config, None)
    }

    /// Register a provider loaded from storage, resuming its persisted
    /// failure streak.
    pub fn restore(
        &self,
        config: ProviderConfig,
        consecutive_failures: u32,
    ) -> Result<Arc<RegisteredProvider>, RegistryError> {
        self.insert(config, Some(consecutive_failures))
    }

    fn insert(
        &self,
        config: ProviderConfig,
        consecutive_failures: Option<u32>,
    ) -> Result<Arc<RegisteredProvider>, RegistryError> {
        validate(&config)?;

        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let failures = consecutive_failures.unwrap_or_else(|| {
            providers
                .get(&config.id)
                .map_or(0, |existing| existing.consecutive_failures())
        });
        if providers
            .values()
            .any(|p| p.config.id != config.id && p.config.code.eq_ignore_ascii_case(&config.code))
        {
            return Err(RegistryError::DuplicateCode { code: config.code });
        }

        let registered = Arc::new(RegisteredProvider {
            translator: RequestTranslator::for_provider(&config),
            normalizer: ResponseNormalizer::for_provider(&config, self.normalizer_defaults.clone()),
            error_threshold: self.error_threshold,
            status: RwLock::new(config.status),
            consecutive_failures: AtomicU32::new(failures),
            last_sync_at: RwLock::new(config.last_sync_at),
            config,
        });
        providers.insert(registered.id(), Arc::clone(&registered));

        info!(
            provider_id = %registered.id(),
            provider_code = %registered.code(),
            api_family = %registered.config.api_family,
            status = %registered.status(),
            consecutive_failures = failures,
            "Registered provider"
        );
        Ok(registered)
    }

    pub fn get(&self, id: Uuid) -> Result<Arc<RegisteredProvider>, RegistryError> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| RegistryError::ProviderNotFound { id: id.to_string() })
    }

    pub fn get_by_code(&self, code: &str) -> Option<Arc<RegisteredProvider>> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|p| p.config.code.eq_ignore_ascii_case(code))
            .cloned()
    }

    /// All providers regardless of status, ordered by code.
    pub fn list_all(&self) -> Vec<Arc<RegisteredProvider>> {
        let mut all: Vec<_> = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.config.code.cmp(&b.config.code));
        all
    }

    /// Providers with status `active` that pass `filter`, ordered by code.
    pub fn list_active(&self, filter: &ProviderFilter) -> Vec<Arc<RegisteredProvider>> {
        self.list_all()
            .into_iter()
            .filter(|p| p.is_active() && filter.matches(&p.config))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate(config: &ProviderConfig) -> Result<(), RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidConfig {
        code: config.code.clone(),
        reason,
    };

    if config.code.trim().is_empty() {
        return Err(invalid("provider code is empty".to_string()));
    }
    if !matches!(config.base_url.scheme(), "http" | "https") {
        return Err(invalid(format!(
            "base URL scheme '{}' is not http(s)",
            config.base_url.scheme()
        )));
    }
    if config.timeout_seconds == 0 {
        return Err(invalid("timeout must be at least one second".to_string()));
    }

    let endpoints = &config.endpoints;
    let paths = std::iter::once(("search", Some(&endpoints.search))).chain([
        ("pricing", endpoints.pricing.as_ref()),
        ("booking", endpoints.booking.as_ref()),
        ("cancel", endpoints.cancel.as_ref()),
        ("status", endpoints.status.as_ref()),
        ("token", endpoints.token.as_ref()),
        ("catalog", endpoints.catalog.as_ref()),
    ]);
    for (name, path) in paths {
        if let Some(path) = path {
            config
                .endpoint_url(path)
                .map_err(|e| invalid(format!("{name} endpoint '{path}' is invalid: {e}")))?;
        }
    }

    if config.endpoints.search_method == SearchMethod::Get
        && let Some((field, path)) = config
            .field_mapping
            .request
            .iter()
            .find(|(_, path)| path.segments().len() > 1)
    {
        return Err(invalid(format!(
            "request field {} maps to nested path '{path}', which a GET query string cannot carry",
            field.as_str()
        )));
    }

    if config.auth.header_name.trim().is_empty() {
        return Err(invalid("auth header name is empty".to_string()));
    }

    let credentials_fit = match (config.auth.strategy, &config.credentials) {
        (AuthStrategy::Basic, Credentials::Basic { .. }) => true,
        (AuthStrategy::ApiKey, Credentials::ApiKey { .. }) => true,
        (AuthStrategy::Bearer, Credentials::Token { .. }) => true,
        // Bearer providers may instead start from a stored access token or a client grant.
        (AuthStrategy::Bearer, Credentials::OAuthClient { .. } | Credentials::None) => {
            config.access_token.is_some() || endpoints.token.is_some()
        }
        (AuthStrategy::OAuth, Credentials::OAuthClient { .. } | Credentials::ApiKey { .. }) => true,
        _ => false,
    };
    if !credentials_fit {
        return Err(invalid(format!(
            "{:?} do not fit the {} auth strategy",
            config.credentials, config.auth.strategy
        )));
    }
    if config.auth.strategy == AuthStrategy::OAuth && endpoints.token.is_none() {
        return Err(invalid("oauth providers need a token endpoint".to_string()));
    }

    Ok(())
}
