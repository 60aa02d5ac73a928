//! # Data Models
//!
//! This module contains the data models used throughout the flight aggregator:
//! search criteria, the canonical flight record, and the SeaORM entities.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod criteria;
pub mod flight;
pub mod flight_provider;
pub mod flight_record;

pub use flight::Entity as Flight;
pub use flight_provider::Entity as FlightProvider;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "flight-aggregator".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
