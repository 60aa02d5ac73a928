//! Database migrations for the flight aggregator.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_10_01_000001_create_flight_providers;
mod m2026_10_01_000002_create_flights;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_10_01_000001_create_flight_providers::Migration),
            Box::new(m2026_10_01_000002_create_flights::Migration),
        ]
    }
}
