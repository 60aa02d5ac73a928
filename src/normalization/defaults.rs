//! Built-in response layouts for each API family.
//!
//! Provider field mappings are merged over these, so a provider only needs to
//! map the fields where it departs from its family's usual shape.

use std::collections::BTreeMap;

use crate::providers::config::ApiFamily;
use crate::providers::mapping::{FieldPath, FlightField, paths};

/// Top-level container holding the list of flights.
///
/// `None` means the response root itself is the list.
pub fn results_path(family: ApiFamily) -> Option<FieldPath> {
    let raw = match family {
        ApiFamily::GenericRest => "flights",
        ApiFamily::Amadeus => "data",
        ApiFamily::Sabre => "PricedItineraries",
        ApiFamily::Travelport => "airSegmentList.airSegment",
    };
    FieldPath::parse(raw).ok()
}

pub fn response_paths(family: ApiFamily) -> BTreeMap<FlightField, FieldPath> {
    match family {
        ApiFamily::GenericRest => generic(),
        ApiFamily::Amadeus => amadeus(),
        ApiFamily::Sabre => sabre(),
        ApiFamily::Travelport => travelport(),
    }
}

fn generic() -> BTreeMap<FlightField, FieldPath> {
    use FlightField::*;
    let fields = [
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
    ];
    paths(
        &fields
            .iter()
            .map(|field| (*field, field.as_str()))
            .collect::<Vec<_>>(),
    )
}

fn amadeus() -> BTreeMap<FlightField, FieldPath> {
    use FlightField::*;
    paths(&[
        (ExternalId, "id"),
        (CarrierCode, "itineraries.0.segments.0.carrierCode"),
        (FlightNumber, "itineraries.0.segments.0.number"),
        (Origin, "itineraries.0.segments.0.departure.iataCode"),
        (Destination, "itineraries.0.segments.0.arrival.iataCode"),
        (DepartureTime, "itineraries.0.segments.0.departure.at"),
        (ArrivalTime, "itineraries.0.segments.0.arrival.at"),
        (Aircraft, "itineraries.0.segments.0.aircraft.code"),
        (AvailableSeats, "numberOfBookableSeats"),
        (Price, "price.total"),
        (Currency, "price.currency"),
        (CabinClass, "travelerPricings.0.fareDetailsBySegment.0.cabin"),
    ])
}

fn sabre() -> BTreeMap<FlightField, FieldPath> {
    use FlightField::*;
    paths(&[
        (ExternalId, "SequenceNumber"),
        (
            CarrierCode,
            "AirItinerary.OriginDestinationOptions.OriginDestinationOption.0.FlightSegment.0.MarketingAirline.Code",
        ),
        (
            FlightNumber,
            "AirItinerary.OriginDestinationOptions.OriginDestinationOption.0.FlightSegment.0.FlightNumber",
        ),
        (
            Origin,
            "AirItinerary.OriginDestinationOptions.OriginDestinationOption.0.FlightSegment.0.DepartureAirport.LocationCode",
        ),
        (
            Destination,
            "AirItinerary.OriginDestinationOptions.OriginDestinationOption.0.FlightSegment.0.ArrivalAirport.LocationCode",
        ),
        (
            DepartureTime,
            "AirItinerary.OriginDestinationOptions.OriginDestinationOption.0.FlightSegment.0.DepartureDateTime",
        ),
        (
            ArrivalTime,
            "AirItinerary.OriginDestinationOptions.OriginDestinationOption.0.FlightSegment.0.ArrivalDateTime",
        ),
        (
            Aircraft,
            "AirItinerary.OriginDestinationOptions.OriginDestinationOption.0.FlightSegment.0.Equipment.AirEquipType",
        ),
        (
            AvailableSeats,
            "AirItinerary.OriginDestinationOptions.OriginDestinationOption.0.FlightSegment.0.SeatsRemaining",
        ),
        (Price, "AirItineraryPricingInfo.ItinTotalFare.TotalFare.Amount"),
        (
            Currency,
            "AirItineraryPricingInfo.ItinTotalFare.TotalFare.CurrencyCode",
        ),
        (
            CabinClass,
            "AirItinerary.OriginDestinationOptions.OriginDestinationOption.0.FlightSegment.0.ResBookDesigCode",
        ),
    ])
}

fn travelport() -> BTreeMap<FlightField, FieldPath> {
    use FlightField::*;
    paths(&[
        (ExternalId, "key"),
        (CarrierCode, "carrier"),
        (FlightNumber, "flightNumber"),
        (Origin, "origin"),
        (Destination, "destination"),
        (DepartureTime, "departureTime"),
        (ArrivalTime, "arrivalTime"),
        (Aircraft, "equipment"),
        (AvailableSeats, "seatsAvailable"),
        (Price, "totalPrice"),
        (CabinClass, "cabinClass"),
        (Status, "status"),
    ])
}
