//! Canonical search criteria and their validation rules.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Maximum passengers accepted in a single search.
pub const MAX_PASSENGERS: u8 = 9;

/// Cabin class requested by a search or reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CabinClass {
    #[default]
    Economy,
    #[serde(alias = "premium-economy", alias = "premiumEconomy")]
    PremiumEconomy,
    Business,
    First,
}

impl CabinClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CabinClass::Economy => "economy",
            CabinClass::PremiumEconomy => "premium_economy",
            CabinClass::Business => "business",
            CabinClass::First => "first",
        }
    }

    /// Lenient parse used on provider payloads.
    ///
    /// Accepts canonical names in any case and separator style, plus the
    /// single-letter booking codes GDS responses carry (Y, W, C, J, F).
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let folded: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match folded.as_str() {
            "economy" | "coach" | "y" | "m" => Some(CabinClass::Economy),
            "premiumeconomy" | "premium" | "w" | "s" => Some(CabinClass::PremiumEconomy),
            "business" | "c" | "j" => Some(CabinClass::Business),
            "first" | "f" | "p" => Some(CabinClass::First),
            _ => None,
        }
    }
}

impl fmt::Display for CabinClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-agnostic flight search input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchCriteria {
    /// Origin airport, 3-letter IATA code
    #[schema(example = "JFK")]
    pub origin: String,
    /// Destination airport, 3-letter IATA code
    #[schema(example = "LAX")]
    pub destination: String,
    /// Outbound date (ISO-8601)
    pub departure_date: NaiveDate,
    /// Optional inbound date (ISO-8601)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_date: Option<NaiveDate>,
    /// Passenger count, 1 to 9
    #[schema(example = 2, minimum = 1, maximum = 9)]
    pub passengers: u8,
    #[serde(default)]
    pub cabin_class: CabinClass,
    /// Only non-stop itineraries
    #[serde(default, alias = "direct")]
    pub direct_only: bool,
}

/// Rejection reasons for malformed search input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be a 3-letter airport code, got '{value}'")]
    InvalidAirportCode { field: &'static str, value: String },
    #[error("origin and destination must differ, both are '{code}'")]
    SameOriginAndDestination { code: String },
    #[error("passenger count must be between 1 and 9, got {value}")]
    PassengerCount { value: u8 },
    #[error("return date {return_date} is before departure date {departure_date}")]
    ReturnBeforeDeparture {
        departure_date: NaiveDate,
        return_date: NaiveDate,
    },
}

impl SearchCriteria {
    /// Convenience constructor for a one-way economy search.
    pub fn one_way(origin: &str, destination: &str, departure_date: NaiveDate) -> Self {
        Self {
            origin: origin.to_string(),
            destination: destination.to_string(),
            departure_date,
            return_date: None,
            passengers: 1,
            cabin_class: CabinClass::Economy,
            direct_only: false,
        }
    }

    /// Returns an upper-cased copy of the criteria after checking every invariant.
    ///
    /// The receiver is left untouched.
    pub fn validated(&self) -> Result<SearchCriteria, ValidationError> {
        let origin = airport_code("origin", &self.origin)?;
        let destination = airport_code("destination", &self.destination)?;

        if origin == destination {
            return Err(ValidationError::SameOriginAndDestination { code: origin });
        }

        if self.passengers == 0 || self.passengers > MAX_PASSENGERS {
            return Err(ValidationError::PassengerCount {
                value: self.passengers,
            });
        }

        if let Some(return_date) = self.return_date
            && return_date < self.departure_date
        {
            return Err(ValidationError::ReturnBeforeDeparture {
                departure_date: self.departure_date,
                return_date,
            });
        }

        Ok(SearchCriteria {
            origin,
            destination,
            ..self.clone()
        })
    }
}

fn airport_code(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(code)
    } else {
        Err(ValidationError::InvalidAirportCode {
            field,
            value: raw.to_string(),
        })
    }
}
