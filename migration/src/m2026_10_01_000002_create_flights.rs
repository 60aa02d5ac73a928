//! Migration to create the flights catalog table.
//!
//! Rows are canonical flight records upserted by the sync scheduler. The
//! identity of a row is (external_id, api_source) when the provider supplies an
//! external id, otherwise (flight_number, origin, destination, departure_time).
//! `identity_key` flattens that identity and is unique, so concurrent upserts
//! of one flight resolve to a single row.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Flights::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Flights::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Flights::IdentityKey).text().not_null())
                    .col(ColumnDef::new(Flights::ProviderId).uuid().not_null())
                    .col(ColumnDef::new(Flights::FlightNumber).text().not_null())
                    .col(ColumnDef::new(Flights::Origin).text().not_null())
                    .col(ColumnDef::new(Flights::Destination).text().not_null())
                    .col(
                        ColumnDef::new(Flights::DepartureTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Flights::ArrivalTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Flights::Aircraft).text().null())
                    .col(ColumnDef::new(Flights::TotalSeats).integer().not_null())
                    .col(ColumnDef::new(Flights::AvailableSeats).integer().not_null())
                    .col(ColumnDef::new(Flights::BasePrice).text().null())
                    .col(ColumnDef::new(Flights::Currency).text().not_null())
                    .col(ColumnDef::new(Flights::CabinClass).text().not_null())
                    .col(ColumnDef::new(Flights::Status).text().not_null())
                    .col(ColumnDef::new(Flights::ExternalId).text().null())
                    .col(ColumnDef::new(Flights::ApiSource).text().not_null())
                    .col(
                        ColumnDef::new(Flights::LastUpdated)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Flights::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Flights::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_flights_provider_id")
                            .from(Flights::Table, Flights::ProviderId)
                            .to(FlightProviders::Table, FlightProviders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_flights_identity_key")
                    .table(Flights::Table)
                    .col(Flights::IdentityKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_flights_route")
                    .table(Flights::Table)
                    .col(Flights::Origin)
                    .col(Flights::Destination)
                    .col(Flights::FlightNumber)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_flights_identity_key").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_flights_route").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Flights::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Flights {
    Table,
    Id,
    IdentityKey,
    ProviderId,
    FlightNumber,
    Origin,
    Destination,
    DepartureTime,
    ArrivalTime,
    Aircraft,
    TotalSeats,
    AvailableSeats,
    BasePrice,
    Currency,
    CabinClass,
    Status,
    ExternalId,
    ApiSource,
    LastUpdated,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum FlightProviders {
    Table,
    Id,
}
