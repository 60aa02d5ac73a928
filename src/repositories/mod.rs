//! # Repository Layer
//!
//! Repository implementations that encapsulate SeaORM operations for the
//! provider configuration store and the flight catalog.

pub mod flight;
pub mod provider;

pub use flight::FlightRepository;
pub use provider::ProviderRepository;
