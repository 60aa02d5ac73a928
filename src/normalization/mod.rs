//! Provider responses to canonical flight records.
//!
//! The normalizer locates the family's flight-list container, resolves every
//! canonical field through the merged mapping table, and coerces the raw JSON
//! values. Entries that cannot be mapped are dropped and counted; only a
//! response without a usable container fails as a whole.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;

use crate::config::SearchConfig;
use crate::models::criteria::CabinClass;
use crate::models::flight_record::{CanonicalFlightRecord, FlightStatus};
use crate::providers::config::{ApiFamily, ProviderConfig};
use crate::providers::mapping::{FieldPath, FlightField};

pub mod defaults;

/// Why a single entry was discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("required field '{}' is missing", .0.as_str())]
    MissingField(FlightField),
    #[error("field '{}' has an unusable value: {value}", .field.as_str())]
    InvalidValue { field: FlightField, value: String },
    #[error("entry is not a JSON object")]
    NotAnObject,
}

/// Batch-level failure: the response had no flight list where one was expected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("response has no flight list at '{path}'")]
    MissingContainer { path: String },
    #[error("value at '{path}' is not a list of flights")]
    NotAList { path: String },
}

/// Records that survived mapping plus the number of entries discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizationOutcome {
    pub records: Vec<CanonicalFlightRecord>,
    pub dropped: usize,
}

/// Fallbacks for fields providers commonly omit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizerDefaults {
    pub seat_capacity: i32,
    pub currency: String,
}

impl Default for NormalizerDefaults {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for NormalizerDefaults {
    fn from(config: &SearchConfig) -> Self {
        Self {
            seat_capacity: config.default_seat_capacity,
            currency: config.default_currency.clone(),
        }
    }
}

/// Response normalizer bound to one provider's family and mapping table.
#[derive(Clone, PartialEq, Eq)]
pub struct ResponseNormalizer {
    family: ApiFamily,
    results_path: Option<FieldPath>,
    fields: BTreeMap<FlightField, FieldPath>,
    defaults: NormalizerDefaults,
}

impl fmt::Debug for ResponseNormalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseNormalizer")
            .field("family", &self.family)
            .field("results_path", &self.results_path.as_ref().map(FieldPath::as_str))
            .field("fields", &self.fields.len())
            .finish()
    }
}

impl ResponseNormalizer {
    /// Build the normalizer for a provider: family layout overlaid with the
    /// provider's own response mapping.
    pub fn for_provider(provider: &ProviderConfig, defaults: NormalizerDefaults) -> Self {
        let mapping = &provider.field_mapping;
        let mut fields = defaults::response_paths(provider.api_family);
        fields.extend(
            mapping
                .response
                .iter()
                .map(|(field, path)| (*field, path.clone())),
        );
        Self {
            family: provider.api_family,
            results_path: mapping
                .results_path
                .clone()
                .or_else(|| defaults::results_path(provider.api_family)),
            fields,
            defaults,
        }
    }

    pub fn family(&self) -> ApiFamily {
        self.family
    }

    /// Normalize a raw response, stamping records with the current time.
    pub fn normalize(
        &self,
        provider: &ProviderConfig,
        raw: &Value,
    ) -> Result<NormalizationOutcome, NormalizationError> {
        self.normalize_at(provider, raw, Utc::now())
    }

    /// Normalize with an explicit `last_updated` stamp.
    pub fn normalize_at(
        &self,
        provider: &ProviderConfig,
        raw: &Value,
        now: DateTime<Utc>,
    ) -> Result<NormalizationOutcome, NormalizationError> {
        let entries = self.entries(raw)?;
        let mut outcome = NormalizationOutcome::default();

        for (index, entry) in entries.iter().enumerate() {
            match self.map_entry(provider, entry, now) {
                Ok(record) => outcome.records.push(record),
                Err(err) => {
                    outcome.dropped += 1;
                    tracing::debug!(
                        provider_code = %provider.code,
                        entry = index,
                        error = %err,
                        "Dropped malformed flight entry"
                    );
                }
            }
        }

        if outcome.dropped > 0 {
            metrics::counter!(
                "normalizer_dropped_entries_total",
                "provider" => provider.code.clone()
            )
            .increment(outcome.dropped as u64);
        }

        Ok(outcome)
    }

    fn entries<'a>(&self, raw: &'a Value) -> Result<&'a [Value], NormalizationError> {
        // Generic providers may answer with a bare array.
        if let Value::Array(items) = raw {
            return Ok(items);
        }
        let Some(path) = &self.results_path else {
            return Err(NormalizationError::NotAList {
                path: "<root>".to_string(),
            });
        };
        match path.extract(raw) {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(NormalizationError::NotAList {
                path: path.to_string(),
            }),
            None => Err(NormalizationError::MissingContainer {
                path: path.to_string(),
            }),
        }
    }

    fn lookup<'a>(&self, entry: &'a Value, field: FlightField) -> Option<&'a Value> {
        self.fields.get(&field).and_then(|path| path.extract(entry))
    }

    fn text(&self, entry: &Value, field: FlightField) -> Option<String> {
        self.lookup(entry, field)
            .and_then(scalar_text)
            .filter(|s| !s.is_empty())
    }

    fn map_entry(
        &self,
        provider: &ProviderConfig,
        entry: &Value,
        now: DateTime<Utc>,
    ) -> Result<CanonicalFlightRecord, MappingError> {
        if !entry.is_object() {
            return Err(MappingError::NotAnObject);
        }

        let flight_number = self
            .text(entry, FlightField::FlightNumber)
            .ok_or(MappingError::MissingField(FlightField::FlightNumber))?;
        let origin = self
            .text(entry, FlightField::Origin)
            .ok_or(MappingError::MissingField(FlightField::Origin))?
            .to_ascii_uppercase();
        let destination = self
            .text(entry, FlightField::Destination)
            .ok_or(MappingError::MissingField(FlightField::Destination))?
            .to_ascii_uppercase();

        let carrier = self.text(entry, FlightField::CarrierCode);
        let flight_number = qualify_flight_number(&flight_number, carrier.as_deref());

        let departure_time = self.timestamp(entry, FlightField::DepartureTime)?;
        let arrival_time = self.timestamp(entry, FlightField::ArrivalTime)?;

        let (price, price_currency) = match self.lookup(entry, FlightField::Price) {
            Some(value) => {
                let (amount, currency) =
                    parse_price(value).ok_or_else(|| MappingError::InvalidValue {
                        field: FlightField::Price,
                        value: value.to_string(),
                    })?;
                (Some(amount), currency)
            }
            None => (None, None),
        };
        let currency = self
            .text(entry, FlightField::Currency)
            .or(price_currency)
            .unwrap_or_else(|| self.defaults.currency.clone())
            .to_ascii_uppercase();

        let total_seats = self
            .seats(entry, FlightField::TotalSeats)?
            .unwrap_or(self.defaults.seat_capacity);
        let available_seats = self
            .seats(entry, FlightField::AvailableSeats)?
            .unwrap_or(total_seats);

        let cabin_class = self
            .text(entry, FlightField::CabinClass)
            .and_then(|raw| CabinClass::parse_lenient(&raw))
            .unwrap_or_default();
        let status = self
            .text(entry, FlightField::Status)
            .and_then(|raw| FlightStatus::parse_lenient(&raw))
            .unwrap_or_default();

        Ok(CanonicalFlightRecord {
            provider_id: provider.id,
            flight_number,
            origin,
            destination,
            departure_time,
            arrival_time,
            aircraft: self.text(entry, FlightField::Aircraft),
            total_seats: total_seats.max(available_seats),
            available_seats,
            price,
            currency,
            cabin_class,
            status,
            external_id: self.text(entry, FlightField::ExternalId),
            api_source: provider.api_name.clone(),
            last_updated: now,
        })
    }

    fn timestamp(
        &self,
        entry: &Value,
        field: FlightField,
    ) -> Result<Option<DateTime<Utc>>, MappingError> {
        match self.lookup(entry, field) {
            None => Ok(None),
            Some(value) => parse_timestamp(value)
                .map(Some)
                .ok_or_else(|| MappingError::InvalidValue {
                    field,
                    value: value.to_string(),
                }),
        }
    }

    fn seats(&self, entry: &Value, field: FlightField) -> Result<Option<i32>, MappingError> {
        match self.lookup(entry, field) {
            None => Ok(None),
            Some(value) => parse_count(value)
                .map(Some)
                .ok_or_else(|| MappingError::InvalidValue {
                    field,
                    value: value.to_string(),
                }),
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `100` + `AA` → `AA100`; already-qualified numbers are kept.
fn qualify_flight_number(raw: &str, carrier: Option<&str>) -> String {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    match carrier {
        Some(carrier) if compact.chars().all(|c| c.is_ascii_digit()) => {
            format!("{}{}", carrier.trim().to_ascii_uppercase(), compact)
        }
        _ => compact,
    }
}

/// Decimal amount with an optional currency, from `249.99`, `"249.99"` or `"USD249.99"`.
fn parse_price(value: &Value) -> Option<(Decimal, Option<String>)> {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
                .map(|amount| (amount, None))
        }
        Value::String(s) => {
            let s = s.trim();
            let split = s
                .find(|c: char| c.is_ascii_digit() || c == '-' || c == '.')
                .unwrap_or(s.len());
            let (prefix, amount) = s.split_at(split);
            let prefix = prefix.trim();
            let currency = match prefix.len() {
                0 => None,
                3 if prefix.chars().all(|c| c.is_ascii_alphabetic()) => {
                    Some(prefix.to_ascii_uppercase())
                }
                _ => return None,
            };
            Decimal::from_str(amount.trim())
                .ok()
                .map(|amount| (amount, currency))
        }
        _ => None,
    }
}

fn parse_count(value: &Value) -> Option<i32> {
    let count = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    i32::try_from(count).ok().filter(|c| *c >= 0)
}

/// RFC 3339, naive ISO local time (taken as UTC) or epoch seconds/milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                return Some(parsed.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Number(n) => {
            let raw = n.as_i64()?;
            if raw.abs() >= 100_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::config::AuthStrategy;
    use crate::providers::mapping::FieldMapping;
    use serde_json::json;
    use url::Url;

    fn provider(family: ApiFamily) -> ProviderConfig {
        let mut provider = ProviderConfig::new(
            "test-provider",
            family,
            Url::parse("https://api.example.com").unwrap(),
            AuthStrategy::Bearer,
        );
        provider.api_name = "TestAPI".to_string();
        provider
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap()
    }

    #[test]
    fn generic_entries_are_mapped_and_stamped() {
        let provider = provider(ApiFamily::GenericRest);
        let normalizer = ResponseNormalizer::for_provider(&provider, NormalizerDefaults::default());
        let raw = json!({
            "flights": [{
                "flightNumber": "AA100",
                "origin": "jfk",
                "destination": "LAX",
                "departureTime": "2024-06-01T08:00:00Z",
                "arrivalTime": "2024-06-01T11:30:00",
                "price": "249.99",
                "currency": "usd",
                "cabinClass": "ECONOMY",
                "externalId": "offer-1"
            }]
        });

        let outcome = normalizer.normalize_at(&provider, &raw, fixed_now()).unwrap();
        assert_eq!(outcome.dropped, 0);
        let record = &outcome.records[0];
        assert_eq!(record.flight_number, "AA100");
        assert_eq!(record.origin, "JFK");
        assert_eq!(record.price, Some(Decimal::new(24999, 2)));
        assert_eq!(record.currency, "USD");
        assert_eq!(record.total_seats, 180);
        assert_eq!(record.available_seats, 180);
        assert_eq!(record.api_source, "TestAPI");
        assert_eq!(record.last_updated, fixed_now());
        assert_eq!(
            record.arrival_time,
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 11, 30, 0).unwrap())
        );
    }

    #[test]
    fn entries_missing_required_fields_are_dropped_and_counted() {
        let provider = provider(ApiFamily::GenericRest);
        let normalizer = ResponseNormalizer::for_provider(&provider, NormalizerDefaults::default());
        let raw = json!([
            { "flightNumber": "AA100", "origin": "JFK", "destination": "LAX" },
            { "origin": "JFK", "destination": "LAX" },
            { "flightNumber": "AA102", "destination": "LAX" },
            { "flightNumber": "AA103", "origin": "JFK", "destination": null },
            { "flightNumber": "AA104", "origin": "JFK", "destination": "LAX", "price": "n/a" },
            "not-an-object"
        ]);

        let outcome = normalizer.normalize_at(&provider, &raw, fixed_now()).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.dropped, 5);
    }

    #[test]
    fn identical_payloads_normalize_identically() {
        let provider = provider(ApiFamily::GenericRest);
        let normalizer = ResponseNormalizer::for_provider(&provider, NormalizerDefaults::default());
        let raw = json!({ "flights": [
            { "flightNumber": "DL1", "origin": "ATL", "destination": "SEA", "price": 99.5 },
            { "flightNumber": "DL2", "origin": "ATL", "destination": "SEA" }
        ]});
        let first = normalizer.normalize_at(&provider, &raw, fixed_now()).unwrap();
        let second = normalizer.normalize_at(&provider, &raw, fixed_now()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.records[0].flight_number, "DL1");
        assert_eq!(first.records[1].flight_number, "DL2");
    }

    #[test]
    fn amadeus_offers_use_family_layout() {
        let provider = provider(ApiFamily::Amadeus);
        let normalizer = ResponseNormalizer::for_provider(&provider, NormalizerDefaults::default());
        let raw = json!({
            "data": [{
                "id": "1",
                "numberOfBookableSeats": 7,
                "itineraries": [{ "segments": [{
                    "carrierCode": "B6",
                    "number": "615",
                    "departure": { "iataCode": "JFK", "at": "2024-06-01T06:00:00" },
                    "arrival": { "iataCode": "LAX", "at": "2024-06-01T09:15:00" },
                    "aircraft": { "code": "320" }
                }]}],
                "price": { "currency": "EUR", "total": "312.40" },
                "travelerPricings": [{ "fareDetailsBySegment": [{ "cabin": "BUSINESS" }] }]
            }]
        });

        let outcome = normalizer.normalize_at(&provider, &raw, fixed_now()).unwrap();
        let record = &outcome.records[0];
        assert_eq!(record.flight_number, "B6615");
        assert_eq!(record.available_seats, 7);
        assert_eq!(record.total_seats, 180);
        assert_eq!(record.currency, "EUR");
        assert_eq!(record.cabin_class, CabinClass::Business);
        assert_eq!(record.aircraft.as_deref(), Some("320"));
        assert_eq!(record.external_id.as_deref(), Some("1"));
    }

    #[test]
    fn travelport_price_prefix_supplies_currency() {
        let provider = provider(ApiFamily::Travelport);
        let normalizer = ResponseNormalizer::for_provider(&provider, NormalizerDefaults::default());
        let raw = json!({ "airSegmentList": { "airSegment": [{
            "key": "seg-1", "carrier": "UA", "flightNumber": "1549",
            "origin": "LGA", "destination": "CLT", "totalPrice": "GBP120.00",
            "departureTime": 1717228800
        }]}});

        let outcome = normalizer.normalize_at(&provider, &raw, fixed_now()).unwrap();
        let record = &outcome.records[0];
        assert_eq!(record.flight_number, "UA1549");
        assert_eq!(record.currency, "GBP");
        assert_eq!(record.price, Some(Decimal::new(12000, 2)));
        assert_eq!(
            record.departure_time,
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn provider_mapping_overrides_family_defaults() {
        let mut provider = provider(ApiFamily::GenericRest);
        provider.field_mapping = FieldMapping::from_json(&json!({
            "resultsPath": "payload.items",
            "response": {
                "flightNumber": "flight.code",
                "origin": "route.from",
                "destination": "route.to",
                "totalSeats": "capacity"
            }
        }))
        .unwrap();
        let normalizer = ResponseNormalizer::for_provider(
            &provider,
            NormalizerDefaults {
                seat_capacity: 150,
                currency: "CAD".to_string(),
            },
        );
        let raw = json!({ "payload": { "items": [
            { "flight": { "code": "AC 8" }, "route": { "from": "YYZ", "to": "YVR" }, "capacity": "220" },
            { "flight": { "code": "AC9" }, "route": { "from": "YVR", "to": "YYZ" } }
        ]}});

        let outcome = normalizer.normalize_at(&provider, &raw, fixed_now()).unwrap();
        assert_eq!(outcome.records[0].flight_number, "AC8");
        assert_eq!(outcome.records[0].total_seats, 220);
        assert_eq!(outcome.records[0].currency, "CAD");
        assert_eq!(outcome.records[1].total_seats, 150);
    }

    #[test]
    fn missing_container_fails_the_batch() {
        let provider = provider(ApiFamily::Sabre);
        let normalizer = ResponseNormalizer::for_provider(&provider, NormalizerDefaults::default());
        let err = normalizer
            .normalize_at(&provider, &json!({ "Errors": [] }), fixed_now())
            .unwrap_err();
        assert_eq!(
            err,
            NormalizationError::MissingContainer {
                path: "PricedItineraries".to_string()
            }
        );
    }

    #[test]
    fn price_parsing_variants() {
        assert_eq!(
            parse_price(&json!("USD 10.50")),
            Some((Decimal::new(1050, 2), Some("USD".to_string())))
        );
        assert_eq!(parse_price(&json!(12)), Some((Decimal::new(12, 0), None)));
        assert_eq!(parse_price(&json!("free")), None);
        assert_eq!(parse_price(&json!("EURO10")), None);
    }
}
