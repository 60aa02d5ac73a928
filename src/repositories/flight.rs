//! Flight catalog repository
//!
//! Database-backed [`FlightCatalog`]. Records are upserted by identity: the
//! provider-native `(external_id, api_source)` pair when present, otherwise
//! the natural key of flight number, route and departure time. The identity
//! is stored flattened in the unique `identity_key` column and upserts are a
//! single conflict-guarded insert, so concurrent syncs never duplicate a row.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::catalog::{CatalogError, FlightCatalog, UpsertOutcome};
use crate::models::criteria::CabinClass;
use crate::models::flight::{self, Entity as Flight};
use crate::models::flight_record::{CanonicalFlightRecord, FlightStatus};

/// Repository for flight catalog operations
#[derive(Debug, Clone)]
pub struct FlightRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
}

impl FlightRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn to_record(row: flight::Model) -> Result<CanonicalFlightRecord, CatalogError> {
    let price = row
        .base_price
        .as_deref()
        .map(Decimal::from_str)
        .transpose()
        .map_err(|e| CatalogError::Corrupt {
            details: format!("flight {} has unreadable price: {e}", row.id),
        })?;
    let cabin_class = CabinClass::parse_lenient(&row.cabin_class).ok_or_else(|| {
        CatalogError::Corrupt {
            details: format!("flight {} has unknown cabin class '{}'", row.id, row.cabin_class),
        }
    })?;
    let status = FlightStatus::parse_lenient(&row.status).ok_or_else(|| CatalogError::Corrupt {
        details: format!("flight {} has unknown status '{}'", row.id, row.status),
    })?;

    Ok(CanonicalFlightRecord {
        provider_id: row.provider_id,
        flight_number: row.flight_number,
        origin: row.origin,
        destination: row.destination,
        departure_time: row.departure_time.map(|t| t.with_timezone(&Utc)),
        arrival_time: row.arrival_time.map(|t| t.with_timezone(&Utc)),
        aircraft: row.aircraft,
        total_seats: row.total_seats,
        available_seats: row.available_seats,
        price,
        currency: row.currency,
        cabin_class,
        status,
        external_id: row.external_id,
        api_source: row.api_source,
        last_updated: row.last_updated.with_timezone(&Utc),
    })
}

fn apply(model: &mut flight::ActiveModel, record: &CanonicalFlightRecord) {
    model.provider_id = Set(record.provider_id);
    model.flight_number = Set(record.flight_number.clone());
    model.origin = Set(record.origin.clone());
    model.destination = Set(record.destination.clone());
    model.departure_time = Set(record.departure_time.map(Into::into));
    model.arrival_time = Set(record.arrival_time.map(Into::into));
    model.aircraft = Set(record.aircraft.clone());
    model.total_seats = Set(record.total_seats);
    model.available_seats = Set(record.available_seats);
    model.base_price = Set(record.price.map(|p| p.to_string()));
    model.currency = Set(record.currency.clone());
    model.cabin_class = Set(record.cabin_class.as_str().to_string());
    model.status = Set(record.status.as_str().to_string());
    model.external_id = Set(record.external_id.clone());
    model.api_source = Set(record.api_source.clone());
    model.last_updated = Set(record.last_updated.into());
    model.updated_at = Set(Utc::now().into());
}

#[async_trait]
impl FlightCatalog for FlightRepository {
    async fn upsert(&self, record: &CanonicalFlightRecord) -> Result<UpsertOutcome, CatalogError> {
        let key = record.identity().storage_key();

        let mut model = flight::ActiveModel {
            id: Set(Uuid::new_v4()),
            identity_key: Set(key.clone()),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        };
        apply(&mut model, record);
        let inserted = Flight::insert(model)
            .on_conflict(
                OnConflict::column(flight::Column::IdentityKey)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;
        if inserted > 0 {
            return Ok(UpsertOutcome::Inserted);
        }

        // The key is taken, possibly by a concurrent writer; overwrite in place.
        let mut changes = flight::ActiveModel::default();
        apply(&mut changes, record);
        Flight::update_many()
            .set(changes)
            .filter(flight::Column::IdentityKey.eq(key))
            .exec(&*self.db)
            .await?;
        Ok(UpsertOutcome::Updated)
    }

    async fn find_route(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
    ) -> Result<Vec<CanonicalFlightRecord>, CatalogError> {
        let rows = Flight::find()
            .filter(flight::Column::Origin.eq(origin.to_ascii_uppercase()))
            .filter(flight::Column::Destination.eq(destination.to_ascii_uppercase()))
            .all(&*self.db)
            .await?;

        rows.into_iter()
            .filter(|row| {
                row.departure_time
                    .is_some_and(|t| t.with_timezone(&Utc).date_naive() == date)
            })
            .map(to_record)
            .collect()
    }

    async fn count(&self) -> Result<u64, CatalogError> {
        Ok(Flight::find().count(&*self.db).await?)
    }
}
