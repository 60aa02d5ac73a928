//! Travelport JSON air-search payload.

use serde_json::{Value, json};

use super::iso_date;
use crate::models::criteria::{CabinClass, SearchCriteria};

pub fn cabin_name(cabin: CabinClass) -> &'static str {
    match cabin {
        CabinClass::Economy => "Economy",
        CabinClass::PremiumEconomy => "PremiumEconomy",
        CabinClass::Business => "Business",
        CabinClass::First => "First",
    }
}

fn air_leg(origin: &str, destination: &str, date: chrono::NaiveDate) -> Value {
    json!({
        "searchOrigin": [{ "airport": { "code": origin } }],
        "searchDestination": [{ "airport": { "code": destination } }],
        "searchDepTime": [{ "preferredTime": iso_date(date) }],
    })
}

pub fn search_payload(criteria: &SearchCriteria) -> Value {
    let mut legs = vec![air_leg(
        &criteria.origin,
        &criteria.destination,
        criteria.departure_date,
    )];
    if let Some(return_date) = criteria.return_date {
        legs.push(air_leg(&criteria.destination, &criteria.origin, return_date));
    }

    let passengers: Vec<Value> = (0..criteria.passengers)
        .map(|_| json!({ "code": "ADT" }))
        .collect();

    json!({
        "searchAirLeg": legs,
        "searchPassenger": passengers,
        "searchModifiers": {
            "preferredCabins": [{ "cabinClass": cabin_name(criteria.cabin_class) }],
            "flightType": { "nonStopDirects": criteria.direct_only },
        },
    })
}
