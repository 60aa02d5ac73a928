//! Sabre Bargain Finder Max (OTA_AirLowFareSearchRQ) payload.

use serde_json::{Value, json};

use super::iso_date;
use crate::models::criteria::{CabinClass, SearchCriteria};

pub fn cabin_code(cabin: CabinClass) -> &'static str {
    match cabin {
        CabinClass::Economy => "Y",
        CabinClass::PremiumEconomy => "S",
        CabinClass::Business => "C",
        CabinClass::First => "F",
    }
}

fn leg(rph: u8, origin: &str, destination: &str, date: chrono::NaiveDate) -> Value {
    json!({
        "RPH": rph.to_string(),
        "DepartureDateTime": format!("{}T00:00:00", iso_date(date)),
        "OriginLocation": { "LocationCode": origin },
        "DestinationLocation": { "LocationCode": destination },
    })
}

pub fn search_payload(criteria: &SearchCriteria) -> Value {
    let mut legs = vec![leg(
        1,
        &criteria.origin,
        &criteria.destination,
        criteria.departure_date,
    )];
    if let Some(return_date) = criteria.return_date {
        legs.push(leg(2, &criteria.destination, &criteria.origin, return_date));
    }

    let mut preferences = json!({
        "CabinPref": [{ "Cabin": cabin_code(criteria.cabin_class), "PreferLevel": "Preferred" }],
    });
    if criteria.direct_only {
        preferences["MaxStopsQuantity"] = json!(0);
    }

    json!({
        "OTA_AirLowFareSearchRQ": {
            "Version": "4",
            "OriginDestinationInformation": legs,
            "TravelPreferences": preferences,
            "TravelerInfoSummary": {
                "AirTravelerAvail": [{
                    "PassengerTypeQuantity": [{ "Code": "ADT", "Quantity": criteria.passengers }]
                }]
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn builds_pascal_case_request_with_return_leg() {
        let mut criteria = SearchCriteria::one_way(
            "JFK",
            "LAX",
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        );
        criteria.return_date = NaiveDate::from_ymd_opt(2024, 6, 9);
        criteria.passengers = 3;
        criteria.cabin_class = CabinClass::Business;

        let payload = search_payload(&criteria);
        let rq = &payload["OTA_AirLowFareSearchRQ"];
        let legs = rq["OriginDestinationInformation"].as_array().unwrap();
        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0]["OriginLocation"]["LocationCode"], "JFK");
        assert_eq!(legs[0]["DepartureDateTime"], "2024-06-01T00:00:00");
        assert_eq!(legs[1]["OriginLocation"]["LocationCode"], "LAX");
        assert_eq!(rq["TravelPreferences"]["CabinPref"][0]["Cabin"], "C");
        assert!(rq["TravelPreferences"].get("MaxStopsQuantity").is_none());
        assert_eq!(
            rq["TravelerInfoSummary"]["AirTravelerAvail"][0]["PassengerTypeQuantity"][0]["Quantity"],
            3
        );
    }

    #[test]
    fn direct_only_limits_stops() {
        let mut criteria = SearchCriteria::one_way(
            "JFK",
            "LAX",
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        );
        criteria.direct_only = true;
        let payload = search_payload(&criteria);
        assert_eq!(
            payload["OTA_AirLowFareSearchRQ"]["TravelPreferences"]["MaxStopsQuantity"],
            0
        );
    }
}
