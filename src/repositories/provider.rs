//! Provider repository for database operations
//!
//! Loads provider configurations (decrypting credentials and tokens), writes
//! administrator upserts, and persists the token, status and sync fields the
//! pipeline owns through [`ProviderStateStore`].

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use tracing::warn;
use url::Url;
use uuid::Uuid;

use crate::crypto::{self, CryptoKey};
use crate::models::flight_provider::{self, Entity as FlightProvider};
use crate::providers::config::{
    ApiFamily, AuthSettings, AuthStrategy, EndpointTable, ProviderConfig, ProviderStatus,
};
use crate::providers::mapping::FieldMapping;
use crate::providers::registry::ProviderStateStore;

/// Repository for provider database operations
#[derive(Debug, Clone)]
pub struct ProviderRepository {
    /// Database connection pool
    pub db: Arc<DatabaseConnection>,
    key: CryptoKey,
}

impl ProviderRepository {
    pub fn new(db: Arc<DatabaseConnection>, key: CryptoKey) -> Self {
        Self { db, key }
    }

    /// Load every stored provider ordered by code.
    pub async fn load_all(&self) -> Result<Vec<ProviderConfig>> {
        Ok(self
            .load_with_failures()
            .await?
            .into_iter()
            .map(|(config, _)| config)
            .collect())
    }

    /// Stored providers paired with their persisted failure streak, ordered
    /// by code.
    ///
    /// Rows that cannot be decrypted or parsed are skipped with a warning so
    /// one bad row does not take every provider offline.
    pub async fn load_with_failures(&self) -> Result<Vec<(ProviderConfig, u32)>> {
        let rows = FlightProvider::find()
            .order_by_asc(flight_provider::Column::Code)
            .all(&*self.db)
            .await?;

        let mut configs = Vec::with_capacity(rows.len());
        for row in rows {
            let code = row.code.clone();
            let failures = row.consecutive_failures.max(0) as u32;
            match self.to_config(row) {
                Ok(config) => configs.push((config, failures)),
                Err(err) => warn!(provider_code = %code, error = %err, "Skipping unreadable provider row"),
            }
        }
        Ok(configs)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<ProviderConfig>> {
        FlightProvider::find_by_id(id)
            .one(&*self.db)
            .await?
            .map(|row| self.to_config(row))
            .transpose()
    }

    /// Insert or replace a provider configuration by id.
    pub async fn upsert(&self, config: &ProviderConfig) -> Result<()> {
        let now = Utc::now();
        let credentials_ciphertext =
            crypto::encrypt_credentials(&self.key, config.id, &config.credentials)?;
        let access_token_ciphertext = config
            .access_token
            .as_deref()
            .map(|token| crypto::encrypt_token(&self.key, config.id, token))
            .transpose()?;
        let endpoints = serde_json::to_value(&config.endpoints)?;

        let mut model = flight_provider::ActiveModel {
            id: Set(config.id),
            code: Set(config.code.clone()),
            api_name: Set(config.api_name.clone()),
            api_family: Set(config.api_family.as_str().to_string()),
            base_url: Set(config.base_url.to_string()),
            auth_strategy: Set(config.auth.strategy.as_str().to_string()),
            auth_header_name: Set(config.auth.header_name.clone()),
            auth_prefix: Set(config.auth.prefix.clone()),
            credentials_ciphertext: Set(credentials_ciphertext),
            access_token_ciphertext: Set(access_token_ciphertext),
            token_expires_at: Set(config.token_expiry.map(Into::into)),
            endpoints: Set(endpoints),
            field_mapping: Set(config.field_mapping.to_json()),
            rate_limit_per_minute: Set(to_i32(config.rate_limit_per_minute as u64)),
            timeout_seconds: Set(to_i32(config.timeout_seconds)),
            retry_attempts: Set(to_i32(config.retry_attempts as u64)),
            status: Set(config.status.as_str().to_string()),
            consecutive_failures: Set(0),
            last_sync_at: Set(config.last_sync_at.map(Into::into)),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        if let Some(existing) = FlightProvider::find_by_id(config.id).one(&*self.db).await? {
            model.created_at = Set(existing.created_at);
            model.consecutive_failures = Set(existing.consecutive_failures);
            model.update(&*self.db).await?;
        } else {
            model.insert(&*self.db).await?;
        }
        Ok(())
    }

    /// Consecutive failure count as last persisted.
    pub async fn consecutive_failures(&self, id: Uuid) -> Result<Option<u32>> {
        Ok(FlightProvider::find_by_id(id)
            .one(&*self.db)
            .await?
            .map(|row| row.consecutive_failures.max(0) as u32))
    }

    async fn existing(&self, id: Uuid) -> Result<flight_provider::ActiveModel> {
        let row = FlightProvider::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| anyhow!("provider '{id}' not found"))?;
        Ok(row.into())
    }

    fn to_config(&self, row: flight_provider::Model) -> Result<ProviderConfig> {
        let api_family = ApiFamily::from_str(&row.api_family).map_err(|e| anyhow!(e))?;
        let strategy = AuthStrategy::from_str(&row.auth_strategy).map_err(|e| anyhow!(e))?;
        let status = ProviderStatus::from_str(&row.status).map_err(|e| anyhow!(e))?;
        let base_url = Url::parse(&row.base_url).context("invalid base URL")?;
        let endpoints: EndpointTable =
            serde_json::from_value(row.endpoints).context("invalid endpoint table")?;
        let field_mapping =
            FieldMapping::from_json(&row.field_mapping).context("invalid field mapping")?;
        let credentials =
            crypto::decrypt_credentials(&self.key, row.id, &row.credentials_ciphertext)
                .context("credentials could not be decrypted")?;
        let access_token = row
            .access_token_ciphertext
            .as_deref()
            .map(|sealed| crypto::decrypt_token(&self.key, row.id, sealed))
            .transpose()
            .context("access token could not be decrypted")?;

        Ok(ProviderConfig {
            id: row.id,
            code: row.code,
            api_name: row.api_name,
            api_family,
            base_url,
            credentials,
            auth: AuthSettings {
                strategy,
                header_name: row.auth_header_name,
                prefix: row.auth_prefix,
            },
            access_token,
            token_expiry: row.token_expires_at.map(|t| t.with_timezone(&Utc)),
            endpoints,
            field_mapping,
            rate_limit_per_minute: row.rate_limit_per_minute.max(0) as u32,
            timeout_seconds: row.timeout_seconds.max(1) as u64,
            retry_attempts: row.retry_attempts.max(0) as u32,
            status,
            last_sync_at: row.last_sync_at.map(|t| t.with_timezone(&Utc)),
        })
    }
}

fn to_i32(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[async_trait]
impl ProviderStateStore for ProviderRepository {
    async fn save_token(
        &self,
        provider_id: Uuid,
        access_token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut model = self.existing(provider_id).await?;
        model.access_token_ciphertext =
            Set(Some(crypto::encrypt_token(&self.key, provider_id, access_token)?));
        model.token_expires_at = Set(expires_at.map(Into::into));
        model.updated_at = Set(Utc::now().into());
        model.update(&*self.db).await?;
        Ok(())
    }

    async fn save_status(
        &self,
        provider_id: Uuid,
        status: ProviderStatus,
        consecutive_failures: u32,
    ) -> Result<()> {
        let mut model = self.existing(provider_id).await?;
        model.status = Set(status.as_str().to_string());
        model.consecutive_failures = Set(to_i32(consecutive_failures as u64));
        model.updated_at = Set(Utc::now().into());
        model.update(&*self.db).await?;
        Ok(())
    }

    async fn save_last_sync(&self, provider_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut model = self.existing(provider_id).await?;
        model.last_sync_at = Set(Some(at.into()));
        model.updated_at = Set(Utc::now().into());
        model.update(&*self.db).await?;
        Ok(())
    }
}
