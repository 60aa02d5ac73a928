//! Test utilities shared by the integration suites.
//!
//! In-memory SQLite setup with migrations, provider fixtures pointed at
//! wiremock servers, and a fully wired search pipeline.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use flight_aggregator::aggregator::Aggregator;
use flight_aggregator::auth_manager::AuthManager;
use flight_aggregator::catalog::{FlightCatalog, InMemoryFlightCatalog};
use flight_aggregator::config::{ProviderHealthConfig, RetryPolicyConfig, SearchConfig};
use flight_aggregator::crypto::CryptoKey;
use flight_aggregator::dispatch::Dispatcher;
use flight_aggregator::normalization::NormalizerDefaults;
use flight_aggregator::providers::config::{
    ApiFamily, AuthStrategy, Credentials, ProviderConfig,
};
use flight_aggregator::providers::registry::{
    NullStateStore, ProviderRegistry, ProviderStateStore,
};
use flight_aggregator::rate_limiter::RateLimiter;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use serde_json::{Value, json};
use url::Url;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;

    // Catalog rows in some tests reference providers that were never stored.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = OFF".to_string(),
    ))
    .await?;

    Ok(db)
}

pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    Ok(Arc::new(setup_test_db().await?))
}

pub fn test_key() -> CryptoKey {
    CryptoKey::new(vec![42u8; 32]).expect("valid test key")
}

/// Retry policy with millisecond backoff so retry tests stay fast.
pub fn fast_retry() -> RetryPolicyConfig {
    RetryPolicyConfig {
        base_ms: 1,
        max_ms: 5,
        jitter_factor: 0.0,
    }
}

/// Generic REST provider with an API key, pointed at `base_url`.
pub fn generic_provider(code: &str, base_url: &str) -> ProviderConfig {
    let mut config = ProviderConfig::new(
        code,
        ApiFamily::GenericRest,
        Url::parse(base_url).expect("valid mock server url"),
        AuthStrategy::ApiKey,
    );
    config.credentials = Credentials::ApiKey {
        key: format!("{code}-key"),
        secret: None,
    };
    config.retry_attempts = 0;
    config
}

/// OAuth client-credentials provider, pointed at `base_url`.
pub fn oauth_provider(code: &str, base_url: &str) -> ProviderConfig {
    let mut config = ProviderConfig::new(
        code,
        ApiFamily::GenericRest,
        Url::parse(base_url).expect("valid mock server url"),
        AuthStrategy::OAuth,
    );
    config.credentials = Credentials::OAuthClient {
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
    };
    config.endpoints.token = Some("/oauth/token".to_string());
    config.retry_attempts = 0;
    config
}

/// One generic REST flight entry departing JFK for LAX on 2030-06-01.
pub fn generic_flight(flight_number: &str, hour: u32, price: &str) -> Value {
    json!({
        "flightNumber": flight_number,
        "origin": "JFK",
        "destination": "LAX",
        "departureTime": format!("2030-06-01T{hour:02}:00:00Z"),
        "arrivalTime": format!("2030-06-01T{:02}:30:00Z", hour + 6),
        "totalSeats": 180,
        "availableSeats": 42,
        "price": price,
        "currency": "USD",
        "cabinClass": "economy",
        "status": "scheduled"
    })
}

pub fn flights_body(flights: Vec<Value>) -> Value {
    json!({ "flights": flights })
}

/// Fully wired pipeline over an in-memory catalog.
pub struct Pipeline {
    pub registry: Arc<ProviderRegistry>,
    pub auth: Arc<AuthManager>,
    pub catalog: Arc<InMemoryFlightCatalog>,
    pub aggregator: Arc<Aggregator>,
}

pub fn pipeline(providers: Vec<ProviderConfig>, error_threshold: u32) -> Pipeline {
    pipeline_with_store(providers, error_threshold, Arc::new(NullStateStore))
}

pub fn pipeline_with_store(
    providers: Vec<ProviderConfig>,
    error_threshold: u32,
    store: Arc<dyn ProviderStateStore>,
) -> Pipeline {
    let search = SearchConfig::default();
    let registry = Arc::new(ProviderRegistry::new(
        error_threshold,
        NormalizerDefaults::from(&search),
    ));
    for provider in providers {
        registry.register(provider).expect("valid provider fixture");
    }

    let http = reqwest::Client::new();
    let auth = Arc::new(AuthManager::new(
        http.clone(),
        &ProviderHealthConfig::default(),
        Arc::clone(&store),
    ));
    let catalog = Arc::new(InMemoryFlightCatalog::new());
    let dyn_catalog: Arc<dyn FlightCatalog> = catalog.clone();
    let aggregator = Arc::new(Aggregator::new(
        Arc::clone(&registry),
        Arc::clone(&auth),
        Arc::new(RateLimiter::new()),
        Dispatcher::new(http, fast_retry()),
        dyn_catalog,
        store,
        &search,
    ));

    Pipeline {
        registry,
        auth,
        catalog,
        aggregator,
    }
}
