//! Request builder for generic REST providers, driven by the mapping table.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use super::iso_date;
use crate::models::criteria::SearchCriteria;
use crate::providers::mapping::{CriteriaField, FieldPath, paths};

/// Paths used when a provider maps nothing: canonical camelCase names at top level.
fn default_request_paths() -> BTreeMap<CriteriaField, FieldPath> {
    paths(
        &CriteriaField::ALL
            .iter()
            .map(|field| (*field, field.as_str()))
            .collect::<Vec<_>>(),
    )
}

/// Generic translator with the provider's request mapping merged over defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericTranslator {
    paths: BTreeMap<CriteriaField, FieldPath>,
}

impl GenericTranslator {
    pub fn new(overrides: &BTreeMap<CriteriaField, FieldPath>) -> Self {
        let mut paths = default_request_paths();
        paths.extend(overrides.iter().map(|(field, path)| (*field, path.clone())));
        Self { paths }
    }

    pub fn translate(&self, criteria: &SearchCriteria) -> Value {
        let mut payload = Value::Object(Map::new());
        for (field, path) in &self.paths {
            if let Some(value) = field_value(*field, criteria) {
                path.insert(&mut payload, value);
            }
        }
        payload
    }
}

fn field_value(field: CriteriaField, criteria: &SearchCriteria) -> Option<Value> {
    match field {
        CriteriaField::Origin => Some(json!(criteria.origin)),
        CriteriaField::Destination => Some(json!(criteria.destination)),
        CriteriaField::DepartureDate => Some(json!(iso_date(criteria.departure_date))),
        CriteriaField::ReturnDate => criteria.return_date.map(|d| json!(iso_date(d))),
        CriteriaField::Passengers => Some(json!(criteria.passengers)),
        CriteriaField::CabinClass => Some(json!(criteria.cabin_class.as_str())),
        CriteriaField::DirectOnly => Some(json!(criteria.direct_only)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn criteria() -> SearchCriteria {
        let mut criteria = SearchCriteria::one_way(
            "JFK",
            "LAX",
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        );
        criteria.passengers = 2;
        criteria
    }

    #[test]
    fn defaults_use_canonical_names() {
        let payload = GenericTranslator::new(&BTreeMap::new()).translate(&criteria());
        assert_eq!(
            payload,
            json!({
                "origin": "JFK",
                "destination": "LAX",
                "departureDate": "2024-06-01",
                "passengers": 2,
                "cabinClass": "economy",
                "directOnly": false
            })
        );
    }

    #[test]
    fn overrides_relocate_fields_into_nested_objects() {
        let overrides = paths(&[
            (CriteriaField::Origin, "route.from"),
            (CriteriaField::Destination, "route.to"),
            (CriteriaField::Passengers, "pax.adults"),
        ]);
        let payload = GenericTranslator::new(&overrides).translate(&criteria());
        assert_eq!(payload["route"], json!({ "from": "JFK", "to": "LAX" }));
        assert_eq!(payload["pax"]["adults"], 2);
        assert!(payload.get("origin").is_none());
        assert_eq!(payload["departureDate"], "2024-06-01");
    }
}
