//! Canonical, provider-agnostic flight record.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::criteria::CabinClass;

/// Operational status of a flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FlightStatus {
    #[default]
    Scheduled,
    Delayed,
    Cancelled,
    Completed,
}

impl FlightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightStatus::Scheduled => "scheduled",
            FlightStatus::Delayed => "delayed",
            FlightStatus::Cancelled => "cancelled",
            FlightStatus::Completed => "completed",
        }
    }

    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "scheduled" | "on_time" | "ontime" | "confirmed" | "hk" => Some(FlightStatus::Scheduled),
            "delayed" | "late" => Some(FlightStatus::Delayed),
            "cancelled" | "canceled" | "xx" => Some(FlightStatus::Cancelled),
            "completed" | "landed" | "arrived" => Some(FlightStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized flight offer as returned to callers and stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalFlightRecord {
    /// Provider that produced the record
    pub provider_id: Uuid,
    #[schema(example = "AA100")]
    pub flight_number: String,
    #[schema(example = "JFK")]
    pub origin: String,
    #[schema(example = "LAX")]
    pub destination: String,
    pub departure_time: Option<DateTime<Utc>>,
    pub arrival_time: Option<DateTime<Utc>>,
    pub aircraft: Option<String>,
    pub total_seats: i32,
    pub available_seats: i32,
    /// Base fare as a decimal string
    #[schema(value_type = Option<String>, example = "249.99")]
    pub price: Option<Decimal>,
    #[schema(example = "USD")]
    pub currency: String,
    pub cabin_class: CabinClass,
    pub status: FlightStatus,
    /// Provider-native identifier, when the provider supplies one
    pub external_id: Option<String>,
    /// Name of the provider API the record came from
    pub api_source: String,
    pub last_updated: DateTime<Utc>,
}

/// Deduplication and upsert key for flight records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlightIdentity {
    External {
        external_id: String,
        source: String,
    },
    Natural {
        flight_number: String,
        origin: String,
        destination: String,
        departure_time: Option<DateTime<Utc>>,
    },
}

impl FlightIdentity {
    /// Flat key stored in the catalog's unique `identity_key` column.
    pub fn storage_key(&self) -> String {
        match self {
            FlightIdentity::External {
                external_id,
                source,
            } => format!("ext|{source}|{external_id}"),
            FlightIdentity::Natural {
                flight_number,
                origin,
                destination,
                departure_time,
            } => {
                let departure = departure_time
                    .map(|t| t.timestamp().to_string())
                    .unwrap_or_else(|| "-".to_string());
                format!("nat|{flight_number}|{origin}|{destination}|{departure}")
            }
        }
    }
}

impl CanonicalFlightRecord {
    /// Identity used to collapse duplicates across the catalog and live results.
    pub fn identity(&self) -> FlightIdentity {
        match self.external_id.as_deref() {
            Some(external_id) if !external_id.is_empty() && !self.api_source.is_empty() => {
                FlightIdentity::External {
                    external_id: external_id.to_string(),
                    source: self.api_source.clone(),
                }
            }
            _ => FlightIdentity::Natural {
                flight_number: self.flight_number.clone(),
                origin: self.origin.clone(),
                destination: self.destination.clone(),
                departure_time: self.departure_time,
            },
        }
    }

    /// Marketing carrier prefix of the flight number (`AA` for `AA100`).
    pub fn carrier_code(&self) -> &str {
        if !self.flight_number.is_ascii() {
            return &self.flight_number;
        }
        let end = self
            .flight_number
            .char_indices()
            .find(|(idx, c)| *idx >= 2 && c.is_ascii_digit())
            .map(|(idx, _)| idx)
            .unwrap_or(self.flight_number.len().min(2));
        &self.flight_number[..end]
    }
}
