//! Amadeus Self-Service flight-offers search payload.

use serde_json::{Value, json};

use super::iso_date;
use crate::models::criteria::{CabinClass, SearchCriteria};

/// Offers requested per search; Amadeus caps this at 250.
const MAX_OFFERS: u32 = 50;

pub fn travel_class(cabin: CabinClass) -> &'static str {
    match cabin {
        CabinClass::Economy => "ECONOMY",
        CabinClass::PremiumEconomy => "PREMIUM_ECONOMY",
        CabinClass::Business => "BUSINESS",
        CabinClass::First => "FIRST",
    }
}

pub fn search_payload(criteria: &SearchCriteria) -> Value {
    let mut payload = json!({
        "originLocationCode": criteria.origin,
        "destinationLocationCode": criteria.destination,
        "departureDate": iso_date(criteria.departure_date),
        "adults": criteria.passengers,
        "travelClass": travel_class(criteria.cabin_class),
        "nonStop": criteria.direct_only,
        "max": MAX_OFFERS,
    });
    if let Some(return_date) = criteria.return_date {
        payload["returnDate"] = json!(iso_date(return_date));
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn builds_flight_offers_query() {
        let criteria = SearchCriteria {
            origin: "JFK".to_string(),
            destination: "LAX".to_string(),
            departure_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            return_date: NaiveDate::from_ymd_opt(2024, 6, 8),
            passengers: 2,
            cabin_class: CabinClass::PremiumEconomy,
            direct_only: true,
        };

        let payload = search_payload(&criteria);
        assert_eq!(payload["originLocationCode"], "JFK");
        assert_eq!(payload["destinationLocationCode"], "LAX");
        assert_eq!(payload["departureDate"], "2024-06-01");
        assert_eq!(payload["returnDate"], "2024-06-08");
        assert_eq!(payload["adults"], 2);
        assert_eq!(payload["travelClass"], "PREMIUM_ECONOMY");
        assert_eq!(payload["nonStop"], true);
    }

    #[test]
    fn one_way_omits_return_date() {
        let criteria = SearchCriteria::one_way(
            "JFK",
            "LAX",
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        );
        assert!(search_payload(&criteria).get("returnDate").is_none());
    }
}
