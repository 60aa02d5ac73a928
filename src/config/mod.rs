//! Configuration loading for the flight aggregator.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `AGGREGATOR_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, fmt, net::SocketAddr, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

const ENV_PREFIX: &str = "AGGREGATOR_";

/// Application configuration derived from `AGGREGATOR_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operator_tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto_key: Option<Vec<u8>>,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub provider_health: ProviderHealthConfig,
    #[serde(default)]
    pub retry_policy: RetryPolicyConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Defaults applied to live searches and to normalized records.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SearchConfig {
    /// Caller deadline applied when a search request does not supply one.
    ///
    /// Environment variable: `AGGREGATOR_SEARCH_DEADLINE_MS`
    #[serde(default = "default_search_deadline_ms")]
    #[schema(example = 10000)]
    pub deadline_ms: u64,

    /// Seat capacity assumed when a provider omits seat counts.
    ///
    /// Environment variable: `AGGREGATOR_DEFAULT_SEAT_CAPACITY`
    #[serde(default = "default_seat_capacity")]
    #[schema(example = 180)]
    pub default_seat_capacity: i32,

    /// Currency assumed when a provider omits one.
    ///
    /// Environment variable: `AGGREGATOR_DEFAULT_CURRENCY`
    #[serde(default = "default_currency")]
    #[schema(example = "USD")]
    pub default_currency: String,
}

/// Thresholds governing provider health and token lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ProviderHealthConfig {
    /// A token expiring within this many seconds is refreshed before use.
    ///
    /// Environment variable: `AGGREGATOR_AUTH_REFRESH_LEAD_SECONDS`
    #[serde(default = "default_auth_refresh_lead_seconds")]
    #[schema(example = 300)]
    pub refresh_lead_seconds: u64,

    /// Consecutive 5xx/timeout failures before a provider is moved to `error`.
    ///
    /// Environment variable: `AGGREGATOR_PROVIDER_ERROR_THRESHOLD`
    #[serde(default = "default_provider_error_threshold")]
    #[schema(example = 3)]
    pub error_threshold: u32,
}

/// Backoff policy for retrying provider calls on 5xx and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RetryPolicyConfig {
    /// Base backoff in milliseconds (default: 250)
    ///
    /// Retries wait base_ms * 2^attempt, capped at max_ms.
    ///
    /// Environment variable: `AGGREGATOR_RETRY_BASE_MS`
    #[serde(default = "default_retry_base_ms")]
    #[schema(example = 250)]
    pub base_ms: u64,

    /// Upper bound for a single backoff in milliseconds (default: 5000)
    ///
    /// Environment variable: `AGGREGATOR_RETRY_MAX_MS`
    #[serde(default = "default_retry_max_ms")]
    #[schema(example = 5000)]
    pub max_ms: u64,

    /// Jitter factor (default: 0.1, range: 0.0-1.0)
    ///
    /// Environment variable: `AGGREGATOR_RETRY_JITTER_FACTOR`
    #[serde(default = "default_retry_jitter_factor")]
    #[schema(example = 0.1, minimum = 0.0, maximum = 1.0)]
    pub jitter_factor: f64,
}

/// Sync scheduler configuration parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SchedulerConfig {
    #[serde(default = "default_sync_enabled")]
    pub enabled: bool,
    #[serde(default = "default_sync_tick_interval_seconds")]
    pub tick_interval_seconds: u64,
    #[serde(default = "default_sync_interval_seconds")]
    pub sync_interval_seconds: u64,
    #[serde(default = "default_sync_window_days")]
    pub window_days: u32,
    #[serde(default = "default_sync_routes")]
    pub routes: Vec<SyncRoute>,
    #[serde(default = "default_sync_max_concurrency")]
    pub max_concurrency: usize,
}

/// An origin/destination pair covered by catalog syncs, written `JFK-LAX`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SyncRoute {
    pub origin: String,
    pub destination: String,
}

impl FromStr for SyncRoute {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidSyncRoute {
            value: value.to_string(),
        };
        let (origin, destination) = value.trim().split_once('-').ok_or_else(invalid)?;
        let origin = origin.trim().to_ascii_uppercase();
        let destination = destination.trim().to_ascii_uppercase();
        let is_code = |code: &str| code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase());
        if !is_code(&origin) || !is_code(&destination) || origin == destination {
            return Err(invalid());
        }
        Ok(Self {
            origin,
            destination,
        })
    }
}

impl TryFrom<String> for SyncRoute {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SyncRoute> for String {
    fn from(route: SyncRoute) -> Self {
        route.to_string()
    }
}

impl fmt::Display for SyncRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.origin, self.destination)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            operator_tokens: Vec::new(),
            crypto_key: None,
            search: SearchConfig::default(),
            provider_health: ProviderHealthConfig::default(),
            retry_policy: RetryPolicyConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_search_deadline_ms(),
            default_seat_capacity: default_seat_capacity(),
            default_currency: default_currency(),
        }
    }
}

impl Default for ProviderHealthConfig {
    fn default() -> Self {
        Self {
            refresh_lead_seconds: default_auth_refresh_lead_seconds(),
            error_threshold: default_provider_error_threshold(),
        }
    }
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            base_ms: default_retry_base_ms(),
            max_ms: default_retry_max_ms(),
            jitter_factor: default_retry_jitter_factor(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_sync_enabled(),
            tick_interval_seconds: default_sync_tick_interval_seconds(),
            sync_interval_seconds: default_sync_interval_seconds(),
            window_days: default_sync_window_days(),
            routes: default_sync_routes(),
            max_concurrency: default_sync_max_concurrency(),
        }
    }
}

impl SearchConfig {
    /// Validate search defaults.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deadline_ms == 0 {
            return Err(ConfigError::InvalidSearchDeadline {
                value: self.deadline_ms,
            });
        }
        if self.default_seat_capacity <= 0 {
            return Err(ConfigError::InvalidSeatCapacity {
                value: self.default_seat_capacity,
            });
        }
        if self.default_currency.len() != 3 {
            return Err(ConfigError::InvalidCurrency {
                value: self.default_currency.clone(),
            });
        }
        Ok(())
    }
}

impl ProviderHealthConfig {
    /// Validate health thresholds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_lead_seconds < 30 || self.refresh_lead_seconds > 86400 {
            return Err(ConfigError::InvalidRefreshLeadTime {
                value: self.refresh_lead_seconds,
            });
        }
        if self.error_threshold == 0 {
            return Err(ConfigError::InvalidErrorThreshold {
                value: self.error_threshold,
            });
        }
        Ok(())
    }
}

impl RetryPolicyConfig {
    /// Validate backoff bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_ms > self.max_ms {
            return Err(ConfigError::InvalidRetryBounds {
                base: self.base_ms,
                max: self.max_ms,
            });
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::InvalidRetryJitter {
                value: self.jitter_factor,
            });
        }
        Ok(())
    }
}

impl SchedulerConfig {
    /// Validate scheduler configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_seconds < 10 || self.tick_interval_seconds > 3600 {
            return Err(ConfigError::InvalidSchedulerTickInterval {
                value: self.tick_interval_seconds,
            });
        }
        if self.sync_interval_seconds < 60 {
            return Err(ConfigError::InvalidSyncInterval {
                value: self.sync_interval_seconds,
            });
        }
        if self.window_days == 0 || self.window_days > 365 {
            return Err(ConfigError::InvalidSyncWindow {
                value: self.window_days,
            });
        }
        if self.max_concurrency == 0 || self.max_concurrency > 64 {
            return Err(ConfigError::InvalidSyncConcurrency {
                value: self.max_concurrency,
            });
        }
        Ok(())
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Whether the profile is a developer profile with relaxed requirements.
    pub fn is_dev_profile(&self) -> bool {
        matches!(self.profile.as_str(), "local" | "test")
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if !config.operator_tokens.is_empty() {
            config.operator_tokens = vec!["[REDACTED]".to_string()];
        }
        if config.crypto_key.is_some() {
            config.crypto_key = Some(b"[REDACTED]".to_vec());
        }
        if let Some((scheme, _)) = config.database_url.split_once("://") {
            if config.database_url.contains('@') {
                config.database_url = format!("{scheme}://[REDACTED]");
            }
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.crypto_key {
            Some(ref key) if key.len() != 32 => {
                return Err(ConfigError::InvalidCryptoKeyLength { length: key.len() });
            }
            None if !self.is_dev_profile() => return Err(ConfigError::MissingCryptoKey),
            _ => {}
        }

        if !self.is_dev_profile() && self.operator_tokens.is_empty() {
            return Err(ConfigError::MissingOperatorTokens);
        }

        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        self.search.validate()?;
        self.provider_health.validate()?;
        self.retry_policy.validate()?;
        self.scheduler.validate()?;

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_database_url() -> String {
    "sqlite://flight_aggregator.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_search_deadline_ms() -> u64 {
    10_000
}

fn default_seat_capacity() -> i32 {
    180
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_auth_refresh_lead_seconds() -> u64 {
    300
}

fn default_provider_error_threshold() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    250
}

fn default_retry_max_ms() -> u64 {
    5000
}

fn default_retry_jitter_factor() -> f64 {
    0.1
}

fn default_sync_enabled() -> bool {
    true
}

fn default_sync_tick_interval_seconds() -> u64 {
    60
}

fn default_sync_interval_seconds() -> u64 {
    3600
}

fn default_sync_window_days() -> u32 {
    30
}

fn default_sync_routes() -> Vec<SyncRoute> {
    vec![
        SyncRoute {
            origin: "JFK".to_string(),
            destination: "LAX".to_string(),
        },
        SyncRoute {
            origin: "LAX".to_string(),
            destination: "JFK".to_string(),
        },
    ]
}

fn default_sync_max_concurrency() -> usize {
    4
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error(
        "no operator tokens configured; set AGGREGATOR_OPERATOR_TOKEN or AGGREGATOR_OPERATOR_TOKENS"
    )]
    MissingOperatorTokens,
    #[error("crypto key is missing; set AGGREGATOR_CRYPTO_KEY environment variable")]
    MissingCryptoKey,
    #[error("crypto key is invalid base64: {error}")]
    InvalidCryptoKeyBase64 { error: String },
    #[error("crypto key must decode to exactly 32 bytes, got {length} bytes")]
    InvalidCryptoKeyLength { length: usize },
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("{key} must be a valid {expected}, got '{value}'")]
    InvalidValue {
        key: String,
        expected: &'static str,
        value: String,
    },
    #[error("search deadline must be positive, got {value}ms")]
    InvalidSearchDeadline { value: u64 },
    #[error("default seat capacity must be positive, got {value}")]
    InvalidSeatCapacity { value: i32 },
    #[error("default currency must be a 3-letter code, got '{value}'")]
    InvalidCurrency { value: String },
    #[error("auth refresh lead time must be between 30 and 86400 seconds, got {value}")]
    InvalidRefreshLeadTime { value: u64 },
    #[error("provider error threshold must be at least 1, got {value}")]
    InvalidErrorThreshold { value: u32 },
    #[error("retry base ms ({base}) cannot be greater than max ms ({max})")]
    InvalidRetryBounds { base: u64, max: u64 },
    #[error("retry jitter factor must be between 0.0 and 1.0, got {value}")]
    InvalidRetryJitter { value: f64 },
    #[error("sync scheduler tick interval must be between 10 and 3600 seconds, got {value}")]
    InvalidSchedulerTickInterval { value: u64 },
    #[error("sync interval must be at least 60 seconds, got {value}")]
    InvalidSyncInterval { value: u64 },
    #[error("sync window must be between 1 and 365 days, got {value}")]
    InvalidSyncWindow { value: u32 },
    #[error("sync concurrency must be between 1 and 64, got {value}")]
    InvalidSyncConcurrency { value: usize },
    #[error("invalid sync route '{value}'; expected ORIGIN-DESTINATION such as JFK-LAX")]
    InvalidSyncRoute { value: String },
}

/// Loads configuration using layered `.env` files and `AGGREGATOR_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads configuration from env files and the process environment.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = take_string(&mut layered, "PROFILE").unwrap_or(profile_hint);
        let is_dev = matches!(profile.as_str(), "local" | "test");
        let log_format = take_string(&mut layered, "LOG_FORMAT").unwrap_or_else(|| {
            if is_dev {
                default_log_format()
            } else {
                "json".to_string()
            }
        });

        let operator_tokens = if let Some(tokens) = layered.remove("OPERATOR_TOKENS") {
            tokens
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        } else if let Some(token) = take_string(&mut layered, "OPERATOR_TOKEN") {
            vec![token]
        } else {
            Vec::new()
        };

        let crypto_key = match take_string(&mut layered, "CRYPTO_KEY") {
            Some(encoded) => {
                use base64::{Engine as _, engine::general_purpose};
                let bytes = general_purpose::STANDARD.decode(encoded.trim()).map_err(|e| {
                    ConfigError::InvalidCryptoKeyBase64 {
                        error: e.to_string(),
                    }
                })?;
                Some(bytes)
            }
            None => None,
        };

        let routes = match take_string(&mut layered, "SYNC_ROUTES") {
            Some(raw) => raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(SyncRoute::from_str)
                .collect::<Result<Vec<_>, _>>()?,
            None => default_sync_routes(),
        };

        let config = AppConfig {
            profile,
            api_bind_addr: take_string(&mut layered, "API_BIND_ADDR")
                .unwrap_or_else(default_api_bind_addr),
            log_level: take_string(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level),
            log_format,
            database_url: take_string(&mut layered, "DATABASE_URL")
                .unwrap_or_else(default_database_url),
            db_max_connections: take_parsed(&mut layered, "DB_MAX_CONNECTIONS", "integer")?
                .unwrap_or_else(default_db_max_connections),
            db_acquire_timeout_ms: take_parsed(&mut layered, "DB_ACQUIRE_TIMEOUT_MS", "integer")?
                .unwrap_or_else(default_db_acquire_timeout_ms),
            operator_tokens,
            crypto_key,
            search: SearchConfig {
                deadline_ms: take_parsed(&mut layered, "SEARCH_DEADLINE_MS", "integer")?
                    .unwrap_or_else(default_search_deadline_ms),
                default_seat_capacity: take_parsed(
                    &mut layered,
                    "DEFAULT_SEAT_CAPACITY",
                    "integer",
                )?
                .unwrap_or_else(default_seat_capacity),
                default_currency: take_string(&mut layered, "DEFAULT_CURRENCY")
                    .map(|c| c.to_ascii_uppercase())
                    .unwrap_or_else(default_currency),
            },
            provider_health: ProviderHealthConfig {
                refresh_lead_seconds: take_parsed(
                    &mut layered,
                    "AUTH_REFRESH_LEAD_SECONDS",
                    "integer",
                )?
                .unwrap_or_else(default_auth_refresh_lead_seconds),
                error_threshold: take_parsed(&mut layered, "PROVIDER_ERROR_THRESHOLD", "integer")?
                    .unwrap_or_else(default_provider_error_threshold),
            },
            retry_policy: RetryPolicyConfig {
                base_ms: take_parsed(&mut layered, "RETRY_BASE_MS", "integer")?
                    .unwrap_or_else(default_retry_base_ms),
                max_ms: take_parsed(&mut layered, "RETRY_MAX_MS", "integer")?
                    .unwrap_or_else(default_retry_max_ms),
                jitter_factor: take_parsed(&mut layered, "RETRY_JITTER_FACTOR", "number")?
                    .unwrap_or_else(default_retry_jitter_factor),
            },
            scheduler: SchedulerConfig {
                enabled: take_parsed(&mut layered, "SYNC_ENABLED", "boolean")?
                    .unwrap_or_else(default_sync_enabled),
                tick_interval_seconds: take_parsed(
                    &mut layered,
                    "SYNC_TICK_INTERVAL_SECONDS",
                    "integer",
                )?
                .unwrap_or_else(default_sync_tick_interval_seconds),
                sync_interval_seconds: take_parsed(
                    &mut layered,
                    "SYNC_INTERVAL_SECONDS",
                    "integer",
                )?
                .unwrap_or_else(default_sync_interval_seconds),
                window_days: take_parsed(&mut layered, "SYNC_WINDOW_DAYS", "integer")?
                    .unwrap_or_else(default_sync_window_days),
                routes,
                max_concurrency: take_parsed(&mut layered, "SYNC_MAX_CONCURRENCY", "integer")?
                    .unwrap_or_else(default_sync_max_concurrency),
            },
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_string(layered: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    layered
        .remove(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn take_parsed<T: FromStr>(
    layered: &mut BTreeMap<String, String>,
    key: &str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    match take_string(layered, key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: format!("{ENV_PREFIX}{key}"),
                expected,
                value: raw,
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_validation() {
        let mut policy = RetryPolicyConfig::default();
        assert!(policy.validate().is_ok());

        policy.base_ms = 10_000;
        assert!(matches!(
            policy.validate(),
            Err(ConfigError::InvalidRetryBounds { base: 10_000, .. })
        ));

        policy.base_ms = 100;
        policy.jitter_factor = 1.5;
        assert!(matches!(
            policy.validate(),
            Err(ConfigError::InvalidRetryJitter { .. })
        ));
    }

    #[test]
    fn test_sync_route_parsing() {
        let route: SyncRoute = " jfk-lax ".parse().unwrap();
        assert_eq!(route.origin, "JFK");
        assert_eq!(route.destination, "LAX");
        assert_eq!(route.to_string(), "JFK-LAX");

        assert!("JFKLAX".parse::<SyncRoute>().is_err());
        assert!("JFK-JFK".parse::<SyncRoute>().is_err());
        assert!("JF-LAX".parse::<SyncRoute>().is_err());
    }

    #[test]
    fn test_crypto_key_only_required_outside_dev_profiles() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.profile = "prod".to_string();
        config.operator_tokens = vec!["ops".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCryptoKey)
        ));

        config.crypto_key = Some(vec![7u8; 32]);
        assert!(config.validate().is_ok());

        config.crypto_key = Some(vec![7u8; 16]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCryptoKeyLength { length: 16 })
        ));
    }

    #[test]
    fn test_scheduler_window_bounds() {
        let mut scheduler = SchedulerConfig::default();
        assert_eq!(scheduler.window_days, 30);
        scheduler.window_days = 0;
        assert!(matches!(
            scheduler.validate(),
            Err(ConfigError::InvalidSyncWindow { value: 0 })
        ));
    }

    #[test]
    fn test_redacted_json_hides_secrets() {
        let config = AppConfig {
            operator_tokens: vec!["super-secret".to_string()],
            crypto_key: Some(vec![1u8; 32]),
            database_url: "postgres://user:pw@db:5432/flights".to_string(),
            ..AppConfig::default()
        };
        let json = config.redacted_json().unwrap();
        assert!(!json.contains("super-secret"));
        assert!(!json.contains("user:pw"));
        assert!(json.contains("[REDACTED]"));
    }
}
