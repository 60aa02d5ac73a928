//! Canonical search criteria to provider-specific request payloads.
//!
//! One translator variant per API family, chosen once when the provider is
//! registered. Translation is pure: no I/O and the criteria are only borrowed.

use serde_json::Value;

use crate::models::criteria::SearchCriteria;
use crate::providers::config::{ApiFamily, ProviderConfig};

pub mod amadeus;
pub mod generic;
pub mod sabre;
pub mod travelport;

pub use generic::GenericTranslator;

/// Request builder bound to a provider's API family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTranslator {
    GenericRest(GenericTranslator),
    Amadeus,
    Sabre,
    Travelport,
}

impl RequestTranslator {
    /// Select the translator for a provider.
    pub fn for_provider(provider: &ProviderConfig) -> Self {
        match provider.api_family {
            ApiFamily::GenericRest => RequestTranslator::GenericRest(GenericTranslator::new(
                &provider.field_mapping.request,
            )),
            ApiFamily::Amadeus => RequestTranslator::Amadeus,
            ApiFamily::Sabre => RequestTranslator::Sabre,
            ApiFamily::Travelport => RequestTranslator::Travelport,
        }
    }

    pub fn family(&self) -> ApiFamily {
        match self {
            RequestTranslator::GenericRest(_) => ApiFamily::GenericRest,
            RequestTranslator::Amadeus => ApiFamily::Amadeus,
            RequestTranslator::Sabre => ApiFamily::Sabre,
            RequestTranslator::Travelport => ApiFamily::Travelport,
        }
    }

    /// Build the search payload for `criteria`.
    pub fn translate(&self, criteria: &SearchCriteria) -> Value {
        match self {
            RequestTranslator::GenericRest(generic) => generic.translate(criteria),
            RequestTranslator::Amadeus => amadeus::search_payload(criteria),
            RequestTranslator::Sabre => sabre::search_payload(criteria),
            RequestTranslator::Travelport => travelport::search_payload(criteria),
        }
    }
}

/// ISO-8601 calendar date as every family expects it.
pub(crate) fn iso_date(date: chrono::NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::config::AuthStrategy;
    use chrono::NaiveDate;
    use url::Url;

    #[test]
    fn translator_follows_provider_family() {
        let base = Url::parse("https://api.example.com").unwrap();
        for family in [
            ApiFamily::GenericRest,
            ApiFamily::Amadeus,
            ApiFamily::Sabre,
            ApiFamily::Travelport,
        ] {
            let provider = ProviderConfig::new("p", family, base.clone(), AuthStrategy::Bearer);
            assert_eq!(RequestTranslator::for_provider(&provider).family(), family);
        }
    }

    #[test]
    fn translation_does_not_touch_criteria() {
        let criteria = SearchCriteria::one_way(
            "JFK",
            "LAX",
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        );
        let before = criteria.clone();
        let _ = RequestTranslator::Sabre.translate(&criteria);
        let _ = RequestTranslator::Amadeus.translate(&criteria);
        assert_eq!(criteria, before);
    }
}
