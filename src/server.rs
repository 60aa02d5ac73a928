//! # Server Configuration
//!
//! Router assembly, shared application state and the OpenAPI document for
//! the flight aggregator API.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::aggregator::Aggregator;
use crate::auth::operator_auth_middleware;
use crate::auth_manager::AuthManager;
use crate::booking::BookingService;
use crate::catalog::FlightCatalog;
use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::dispatch::Dispatcher;
use crate::handlers;
use crate::normalization::NormalizerDefaults;
use crate::providers::registry::{ProviderRegistry, ProviderStateStore};
use crate::rate_limiter::RateLimiter;
use crate::repositories::{FlightRepository, ProviderRepository};
use crate::scheduler::SyncScheduler;
use crate::telemetry::trace_context_middleware;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub aggregator: Arc<Aggregator>,
    pub scheduler: Arc<SyncScheduler>,
    pub bookings: Arc<BookingService>,
}

/// Wire the provider pipeline on top of an open database connection.
///
/// Provider rows that fail registration are skipped with a warning.
pub async fn build_state(config: Arc<AppConfig>, db: DatabaseConnection) -> Result<AppState> {
    let key = match &config.crypto_key {
        Some(bytes) => CryptoKey::new(bytes.clone())?,
        None => {
            tracing::warn!(
                profile = %config.profile,
                "No crypto key configured; using an ephemeral key, stored credentials will not survive a restart"
            );
            CryptoKey::ephemeral()
        }
    };

    let shared_db = Arc::new(db.clone());
    let providers = Arc::new(ProviderRepository::new(Arc::clone(&shared_db), key));
    let catalog: Arc<dyn FlightCatalog> = Arc::new(FlightRepository::new(shared_db));
    let store: Arc<dyn ProviderStateStore> = providers.clone();

    let registry = Arc::new(ProviderRegistry::new(
        config.provider_health.error_threshold,
        NormalizerDefaults::from(&config.search),
    ));
    for (provider, failures) in providers.load_with_failures().await? {
        let code = provider.code.clone();
        if let Err(err) = registry.restore(provider, failures) {
            tracing::warn!(provider_code = %code, error = %err, "Skipping invalid provider");
        }
    }
    tracing::info!(providers = registry.len(), "Provider registry loaded");

    let http = reqwest::Client::builder()
        .user_agent(concat!("flight-aggregator/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let auth = Arc::new(AuthManager::new(
        http.clone(),
        &config.provider_health,
        Arc::clone(&store),
    ));
    let aggregator = Arc::new(Aggregator::new(
        Arc::clone(&registry),
        auth,
        Arc::new(RateLimiter::new()),
        Dispatcher::new(http, config.retry_policy.clone()),
        catalog,
        store,
        &config.search,
    ));
    let scheduler = Arc::new(SyncScheduler::new(
        Arc::clone(&aggregator),
        config.scheduler.clone(),
    ));

    Ok(AppState {
        config,
        db,
        aggregator,
        scheduler,
        bookings: Arc::new(BookingService::new(registry)),
    })
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let operator_routes = Router::new()
        .route("/providers", get(handlers::providers::list_providers))
        .route("/providers/sync", post(handlers::providers::sync_all_providers))
        .route("/providers/{id}/sync", post(handlers::providers::sync_provider))
        .route(
            "/providers/{id}/health-check",
            post(handlers::providers::health_check_provider),
        )
        .route("/providers/{id}/bookings", post(handlers::bookings::create_booking))
        .route(
            "/providers/{id}/bookings/{booking_id}",
            delete(handlers::bookings::cancel_booking),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            operator_auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/flights/search", post(handlers::flights::search_flights))
        .merge(operator_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the API until `shutdown` fires.
pub async fn run_server(state: AppState, shutdown: CancellationToken) -> Result<()> {
    let addr = state
        .config
        .bind_addr()
        .context("Invalid server address")?;
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Server terminated unexpectedly")?;

    tracing::info!("Server stopped");
    Ok(())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::flights::search_flights,
        crate::handlers::providers::list_providers,
        crate::handlers::providers::sync_all_providers,
        crate::handlers::providers::sync_provider,
        crate::handlers::providers::health_check_provider,
        crate::handlers::bookings::create_booking,
        crate::handlers::bookings::cancel_booking,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::flights::SearchRequest,
            crate::handlers::providers::ProviderSummary,
            crate::handlers::providers::ProvidersResponse,
            crate::models::criteria::SearchCriteria,
            crate::models::criteria::CabinClass,
            crate::models::flight_record::CanonicalFlightRecord,
            crate::models::flight_record::FlightStatus,
            crate::aggregator::SearchOutcome,
            crate::aggregator::HealthCheckReport,
            crate::scheduler::SyncResult,
            crate::booking::BookingRequest,
            crate::booking::BookingConfirmation,
            crate::providers::error::ProviderErrorReport,
            crate::providers::config::ApiFamily,
            crate::providers::config::ProviderStatus,
            crate::error::ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "flights", description = "Multi-provider flight search"),
        (name = "providers", description = "Provider administration"),
        (name = "bookings", description = "Booking pass-through")
    ),
    info(
        title = "Flight Aggregator API",
        description = "Aggregates flight availability from heterogeneous airline and GDS APIs",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
