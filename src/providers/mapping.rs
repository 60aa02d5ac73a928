//! Field-mapping tables and dot-path extraction over provider JSON.
//!
//! A mapping table binds canonical field names to dot-notation paths inside a
//! provider payload (`itineraries.0.segments.0.number`). Paths are parsed and
//! checked when a provider is loaded so that a bad table fails registration
//! instead of silently yielding empty results on every request.

use std::{collections::BTreeMap, fmt, str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

static PATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_$@-]+(\.[A-Za-z0-9_$@-]+)*$").expect("static path pattern compiles")
});

/// Errors raised while loading a mapping table.
#[derive(Debug, Error)]
pub enum MappingConfigError {
    #[error("invalid field path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("malformed field mapping: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A validated dot-notation path into a JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self, MappingConfigError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(MappingConfigError::InvalidPath {
                path: raw.to_string(),
                reason: "path is empty",
            });
        }
        if !PATH_PATTERN.is_match(trimmed) {
            return Err(MappingConfigError::InvalidPath {
                path: raw.to_string(),
                reason: "segments must be non-empty and contain only letters, digits, '_', '-', '$' or '@'",
            });
        }
        Ok(Self {
            raw: trimmed.to_string(),
            segments: trimmed.split('.').map(str::to_string).collect(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Walk `root` along the path.
    ///
    /// Numeric segments index arrays; on objects they are ordinary keys. Any
    /// missing step yields `None`, as does an explicit JSON `null` at the end.
    pub fn extract<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        (!current.is_null()).then_some(current)
    }

    /// Write `value` at the path, creating intermediate objects as needed.
    ///
    /// Non-object intermediates are replaced.
    pub fn insert(&self, root: &mut Value, value: Value) {
        *root = insert_at(std::mem::take(root), &self.segments, value);
    }
}

fn insert_at(target: Value, segments: &[String], value: Value) -> Value {
    let Some((head, rest)) = segments.split_first() else {
        return value;
    };
    let mut map = match target {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let slot = map.entry(head.clone()).or_insert(Value::Null);
    *slot = insert_at(std::mem::take(slot), rest, value);
    Value::Object(map)
}

impl FromStr for FieldPath {
    type Err = MappingConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = MappingConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.raw
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Canonical search-criteria fields addressable from a request mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CriteriaField {
    Origin,
    Destination,
    DepartureDate,
    ReturnDate,
    Passengers,
    CabinClass,
    DirectOnly,
}

impl CriteriaField {
    pub const ALL: [CriteriaField; 7] = [
        CriteriaField::Origin,
        CriteriaField::Destination,
        CriteriaField::DepartureDate,
        CriteriaField::ReturnDate,
        CriteriaField::Passengers,
        CriteriaField::CabinClass,
        CriteriaField::DirectOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CriteriaField::Origin => "origin",
            CriteriaField::Destination => "destination",
            CriteriaField::DepartureDate => "departureDate",
            CriteriaField::ReturnDate => "returnDate",
            CriteriaField::Passengers => "passengers",
            CriteriaField::CabinClass => "cabinClass",
            CriteriaField::DirectOnly => "directOnly",
        }
    }
}

/// Canonical flight-record fields addressable from a response mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlightField {
    FlightNumber,
    CarrierCode,
    Origin,
    Destination,
    DepartureTime,
    ArrivalTime,
    Aircraft,
    TotalSeats,
    AvailableSeats,
    Price,
    Currency,
    CabinClass,
    Status,
    ExternalId,
}

impl FlightField {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightField::FlightNumber => "flightNumber",
            FlightField::CarrierCode => "carrierCode",
            FlightField::Origin => "origin",
            FlightField::Destination => "destination",
            FlightField::DepartureTime => "departureTime",
            FlightField::ArrivalTime => "arrivalTime",
            FlightField::Aircraft => "aircraft",
            FlightField::TotalSeats => "totalSeats",
            FlightField::AvailableSeats => "availableSeats",
            FlightField::Price => "price",
            FlightField::Currency => "currency",
            FlightField::CabinClass => "cabinClass",
            FlightField::Status => "status",
            FlightField::ExternalId => "externalId",
        }
    }
}

/// Provider field-mapping table as stored with the provider configuration.
///
/// ```json
/// {
///   "resultsPath": "payload.flights",
///   "request":  { "origin": "from", "departureDate": "when.date" },
///   "response": { "flightNumber": "flight.no", "price": "fare.amount" }
/// }
/// ```
///
/// Every section is optional; family defaults fill in whatever is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_path: Option<FieldPath>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub request: BTreeMap<CriteriaField, FieldPath>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub response: BTreeMap<FlightField, FieldPath>,
}

impl FieldMapping {
    /// Parse and validate a stored mapping document. `null` means no overrides.
    pub fn from_json(value: &Value) -> Result<Self, MappingConfigError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Shorthand for building a path table from string literals.
pub(crate) fn paths<K: Ord + Copy>(entries: &[(K, &str)]) -> BTreeMap<K, FieldPath> {
    entries
        .iter()
        .filter_map(|(key, raw)| FieldPath::parse(raw).ok().map(|path| (*key, path)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_walks_nested_objects_and_arrays() {
        let doc = json!({
            "itineraries": [
                { "segments": [ { "number": "100", "departure": { "iataCode": "JFK" } } ] }
            ]
        });
        let path = FieldPath::parse("itineraries.0.segments.0.departure.iataCode").unwrap();
        assert_eq!(path.extract(&doc), Some(&json!("JFK")));
    }

    #[test]
    fn extract_missing_intermediate_yields_none() {
        let doc = json!({ "a": { "b": 1 }, "n": null });
        assert_eq!(FieldPath::parse("a.x.c").unwrap().extract(&doc), None);
        assert_eq!(FieldPath::parse("a.b.c").unwrap().extract(&doc), None);
        assert_eq!(FieldPath::parse("n").unwrap().extract(&doc), None);
        assert_eq!(FieldPath::parse("a.5").unwrap().extract(&doc), None);
    }

    #[test]
    fn parse_rejects_malformed_paths() {
        for raw in ["", "a..b", ".a", "a.", "a b", "a.[0]"] {
            assert!(FieldPath::parse(raw).is_err(), "{raw} should be rejected");
        }
        assert!(FieldPath::parse(" data.0.id ").is_ok());
    }

    #[test]
    fn insert_builds_nested_objects() {
        let mut doc = json!({ "search": "overwritten" });
        FieldPath::parse("search.leg.from")
            .unwrap()
            .insert(&mut doc, json!("JFK"));
        FieldPath::parse("search.leg.to")
            .unwrap()
            .insert(&mut doc, json!("LAX"));
        assert_eq!(doc, json!({ "search": { "leg": { "from": "JFK", "to": "LAX" } } }));
    }

    #[test]
    fn insert_replaces_scalar_roots_and_keeps_siblings() {
        let mut doc = json!(7);
        FieldPath::parse("leg.from").unwrap().insert(&mut doc, json!("JFK"));
        assert_eq!(doc, json!({ "leg": { "from": "JFK" } }));

        let mut doc = json!({ "pax": 2, "leg": [1, 2] });
        FieldPath::parse("leg.to").unwrap().insert(&mut doc, json!("LAX"));
        FieldPath::parse("cabin").unwrap().insert(&mut doc, json!("economy"));
        assert_eq!(
            doc,
            json!({ "pax": 2, "leg": { "to": "LAX" }, "cabin": "economy" })
        );
    }

    #[test]
    fn mapping_rejects_unknown_fields_and_bad_paths() {
        let unknown = json!({ "response": { "seatMap": "x" } });
        assert!(FieldMapping::from_json(&unknown).is_err());

        let bad_path = json!({ "response": { "flightNumber": "a..b" } });
        assert!(FieldMapping::from_json(&bad_path).is_err());

        let typo_section = json!({ "responses": {} });
        assert!(FieldMapping::from_json(&typo_section).is_err());
    }

    #[test]
    fn mapping_round_trips_through_storage_json() {
        let raw = json!({
            "resultsPath": "payload.flights",
            "request": { "origin": "from" },
            "response": { "flightNumber": "flight.no" }
        });
        let mapping = FieldMapping::from_json(&raw).unwrap();
        assert_eq!(
            mapping.response.get(&FlightField::FlightNumber).map(FieldPath::as_str),
            Some("flight.no")
        );
        assert_eq!(mapping.to_json(), raw);
        assert_eq!(FieldMapping::from_json(&Value::Null).unwrap(), FieldMapping::default());
    }
}
