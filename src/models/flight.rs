//! Flight catalog entity model
//!
//! This module contains the SeaORM entity model for the flights table, the
//! catalog store the sync scheduler upserts canonical records into.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Stored canonical flight record
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "flights")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Flattened record identity; unique
    #[sea_orm(unique)]
    pub identity_key: String,

    /// Provider the record was synced from
    pub provider_id: Uuid,

    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub departure_time: Option<DateTimeWithTimeZone>,
    pub arrival_time: Option<DateTimeWithTimeZone>,
    pub aircraft: Option<String>,
    pub total_seats: i32,
    pub available_seats: i32,

    /// Decimal price kept as text so every backend round-trips it exactly
    pub base_price: Option<String>,

    pub currency: String,
    pub cabin_class: String,
    pub status: String,

    /// Provider-native identifier
    pub external_id: Option<String>,

    /// Provider API name the record came from
    pub api_source: String,

    /// Freshness of the record as reported by the pipeline
    pub last_updated: DateTimeWithTimeZone,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::flight_provider::Entity",
        from = "Column::ProviderId",
        to = "super::flight_provider::Column::Id"
    )]
    FlightProvider,
}

impl Related<super::flight_provider::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FlightProvider.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
