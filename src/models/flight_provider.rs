//! Flight provider entity model
//!
//! This module contains the SeaORM entity model for the flight_providers table,
//! which stores administrator-maintained provider configurations together with
//! the token and health state owned by the aggregation pipeline.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Flight provider entity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "flight_providers")]
pub struct Model {
    /// Unique identifier for the provider (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Short unique code used in search filters (e.g. `amadeus-test`)
    pub code: String,

    /// Provider API name, stamped on records as their source
    pub api_name: String,

    /// API family: generic_rest|amadeus|sabre|travelport
    pub api_family: String,

    /// Base URL every endpoint path is resolved against
    pub base_url: String,

    /// Auth strategy: bearer|basic|api_key|oauth
    pub auth_strategy: String,

    /// Header carrying the credential
    pub auth_header_name: String,

    /// Prefix placed before the credential value (may be empty)
    pub auth_prefix: String,

    /// Encrypted credentials JSON, bound to the provider id
    pub credentials_ciphertext: Vec<u8>,

    /// Encrypted current access token
    pub access_token_ciphertext: Option<Vec<u8>>,

    /// Expiry of the current access token
    pub token_expires_at: Option<DateTimeWithTimeZone>,

    /// Endpoint path table
    #[sea_orm(column_type = "JsonBinary")]
    pub endpoints: JsonValue,

    /// Field-mapping table
    #[sea_orm(column_type = "JsonBinary")]
    pub field_mapping: JsonValue,

    /// Requests allowed per sliding 60s window
    pub rate_limit_per_minute: i32,

    /// Per-request timeout
    pub timeout_seconds: i32,

    /// Retries on 5xx/timeout after the first attempt
    pub retry_attempts: i32,

    /// Operational status: active|inactive|error
    pub status: String,

    /// Consecutive 5xx/timeout failures observed
    pub consecutive_failures: i32,

    /// Last successful sync
    pub last_sync_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the provider was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the provider was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::flight::Entity")]
    Flights,
}

impl Related<super::flight::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Flights.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
