//! Migration to create the flight_providers table.
//!
//! Each row describes one external flight-data source: its API family, auth
//! strategy, encrypted credentials, endpoint and field-mapping tables, and the
//! operational state the aggregation pipeline maintains (token, status, last sync).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FlightProviders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FlightProviders::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FlightProviders::Code).text().not_null())
                    .col(ColumnDef::new(FlightProviders::ApiName).text().not_null())
                    .col(ColumnDef::new(FlightProviders::ApiFamily).text().not_null())
                    .col(ColumnDef::new(FlightProviders::BaseUrl).text().not_null())
                    .col(
                        ColumnDef::new(FlightProviders::AuthStrategy)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FlightProviders::AuthHeaderName)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FlightProviders::AuthPrefix)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(FlightProviders::CredentialsCiphertext)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FlightProviders::AccessTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(FlightProviders::TokenExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(FlightProviders::Endpoints)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FlightProviders::FieldMapping)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FlightProviders::RateLimitPerMinute)
                            .integer()
                            .not_null()
                            .default(60),
                    )
                    .col(
                        ColumnDef::new(FlightProviders::TimeoutSeconds)
                            .integer()
                            .not_null()
                            .default(10),
                    )
                    .col(
                        ColumnDef::new(FlightProviders::RetryAttempts)
                            .integer()
                            .not_null()
                            .default(2),
                    )
                    .col(
                        ColumnDef::new(FlightProviders::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(FlightProviders::ConsecutiveFailures)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(FlightProviders::LastSyncAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(FlightProviders::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(FlightProviders::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_flight_providers_code")
                    .table(FlightProviders::Table)
                    .col(FlightProviders::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_flight_providers_code").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(FlightProviders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FlightProviders {
    Table,
    Id,
    Code,
    ApiName,
    ApiFamily,
    BaseUrl,
    AuthStrategy,
    AuthHeaderName,
    AuthPrefix,
    CredentialsCiphertext,
    AccessTokenCiphertext,
    TokenExpiresAt,
    Endpoints,
    FieldMapping,
    RateLimitPerMinute,
    TimeoutSeconds,
    RetryAttempts,
    Status,
    ConsecutiveFailures,
    LastSyncAt,
    CreatedAt,
    UpdatedAt,
}
