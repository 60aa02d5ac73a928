//! Provider booking and cancellation entry points.
//!
//! No provider integration books or cancels yet. Both operations resolve the
//! provider and then fail with [`ProviderError::NotImplemented`]; callers must
//! treat them as always failing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::providers::error::{ProviderError, RegistryError};
use crate::providers::registry::ProviderRegistry;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    #[schema(example = "AA100")]
    pub flight_number: String,
    /// Provider-native offer identifier, when the offer came with one
    #[serde(default)]
    pub external_id: Option<String>,
    #[schema(example = 1, minimum = 1, maximum = 9)]
    pub passengers: u8,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmation {
    pub provider_id: Uuid,
    pub external_booking_id: String,
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

pub struct BookingService {
    registry: Arc<ProviderRegistry>,
}

impl BookingService {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub async fn book(
        &self,
        provider_id: Uuid,
        request: &BookingRequest,
    ) -> Result<BookingConfirmation, BookingError> {
        let provider = self.registry.get(provider_id)?;
        info!(
            provider_code = %provider.code(),
            flight_number = %request.flight_number,
            "Booking requested for provider without booking support"
        );
        Err(ProviderError::NotImplemented { operation: "booking" }.into())
    }

    pub async fn cancel(
        &self,
        provider_id: Uuid,
        external_booking_id: &str,
    ) -> Result<(), BookingError> {
        let provider = self.registry.get(provider_id)?;
        info!(
            provider_code = %provider.code(),
            external_booking_id,
            "Cancellation requested for provider without booking support"
        );
        Err(ProviderError::NotImplemented {
            operation: "cancellation",
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::NormalizerDefaults;
    use crate::providers::config::{ApiFamily, AuthStrategy, Credentials, ProviderConfig};
    use url::Url;

    #[tokio::test]
    async fn booking_and_cancel_always_fail() {
        let registry = Arc::new(ProviderRegistry::new(3, NormalizerDefaults::default()));
        let mut config = ProviderConfig::new(
            "book-me",
            ApiFamily::GenericRest,
            Url::parse("https://api.example.com").unwrap(),
            AuthStrategy::ApiKey,
        );
        config.credentials = Credentials::ApiKey {
            key: "k".to_string(),
            secret: None,
        };
        let id = registry.register(config).unwrap().id();
        let service = BookingService::new(registry);

        let request = BookingRequest {
            flight_number: "AA100".to_string(),
            external_id: None,
            passengers: 1,
        };
        assert!(matches!(
            service.book(id, &request).await,
            Err(BookingError::Provider(ProviderError::NotImplemented { .. }))
        ));
        assert!(matches!(
            service.cancel(id, "PNR123").await,
            Err(BookingError::Provider(ProviderError::NotImplemented { .. }))
        ));
        assert!(matches!(
            service.cancel(Uuid::new_v4(), "PNR123").await,
            Err(BookingError::Registry(RegistryError::ProviderNotFound { .. }))
        ));
    }
}
