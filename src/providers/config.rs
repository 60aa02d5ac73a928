//! Provider configuration as consumed by the aggregation pipeline.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

use super::mapping::FieldMapping;

/// Wire-protocol family a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApiFamily {
    #[serde(alias = "generic", alias = "generic-rest")]
    GenericRest,
    Amadeus,
    Sabre,
    Travelport,
}

impl ApiFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiFamily::GenericRest => "generic_rest",
            ApiFamily::Amadeus => "amadeus",
            ApiFamily::Sabre => "sabre",
            ApiFamily::Travelport => "travelport",
        }
    }
}

impl fmt::Display for ApiFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "generic_rest" | "generic" => Ok(ApiFamily::GenericRest),
            "amadeus" => Ok(ApiFamily::Amadeus),
            "sabre" => Ok(ApiFamily::Sabre),
            "travelport" => Ok(ApiFamily::Travelport),
            other => Err(format!("unknown api family '{other}'")),
        }
    }
}

/// How the credential is presented to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthStrategy {
    Bearer,
    Basic,
    #[serde(alias = "api-key")]
    ApiKey,
    #[serde(alias = "oauth2")]
    OAuth,
}

impl AuthStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthStrategy::Bearer => "bearer",
            AuthStrategy::Basic => "basic",
            AuthStrategy::ApiKey => "api_key",
            AuthStrategy::OAuth => "oauth",
        }
    }

    /// Prefix used when the provider configuration leaves it unset.
    pub fn default_prefix(&self) -> &'static str {
        match self {
            AuthStrategy::Bearer | AuthStrategy::OAuth => "Bearer",
            AuthStrategy::Basic => "Basic",
            AuthStrategy::ApiKey => "",
        }
    }

    pub fn default_header(&self) -> &'static str {
        match self {
            AuthStrategy::ApiKey => "X-API-Key",
            _ => "Authorization",
        }
    }
}

impl fmt::Display for AuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "bearer" => Ok(AuthStrategy::Bearer),
            "basic" => Ok(AuthStrategy::Basic),
            "api_key" | "apikey" => Ok(AuthStrategy::ApiKey),
            "oauth" | "oauth2" => Ok(AuthStrategy::OAuth),
            other => Err(format!("unknown auth strategy '{other}'")),
        }
    }
}

/// Stored credential material. Never serialized into API responses.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    ApiKey {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        secret: Option<String>,
    },
    Basic {
        username: String,
        password: String,
    },
    OAuthClient {
        client_id: String,
        client_secret: String,
    },
    /// A static token issued out of band.
    Token { token: String },
    None,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Credentials::ApiKey { .. } => "ApiKey",
            Credentials::Basic { .. } => "Basic",
            Credentials::OAuthClient { .. } => "OAuthClient",
            Credentials::Token { .. } => "Token",
            Credentials::None => "None",
        };
        write!(f, "Credentials::{kind}([REDACTED])")
    }
}

/// Header placement for the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSettings {
    pub strategy: AuthStrategy,
    pub header_name: String,
    pub prefix: String,
}

impl AuthSettings {
    /// Settings using the strategy's conventional header and prefix.
    pub fn conventional(strategy: AuthStrategy) -> Self {
        Self {
            strategy,
            header_name: strategy.default_header().to_string(),
            prefix: strategy.default_prefix().to_string(),
        }
    }
}

/// HTTP verb used for the search endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SearchMethod {
    Get,
    #[default]
    Post,
}

/// Endpoint paths, relative to the provider base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointTable {
    pub search: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Credential-grant endpoint for OAuth providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Full-catalog dump endpoint used by syncs when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    #[serde(default)]
    pub search_method: SearchMethod,
}

impl EndpointTable {
    pub fn with_search(search: &str) -> Self {
        Self {
            search: search.to_string(),
            pricing: None,
            booking: None,
            cancel: None,
            status: None,
            token: None,
            catalog: None,
            search_method: SearchMethod::default(),
        }
    }
}

/// Operational status of a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    #[default]
    Active,
    Inactive,
    Error,
}

impl ProviderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatus::Active => "active",
            ProviderStatus::Inactive => "inactive",
            ProviderStatus::Error => "error",
        }
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(ProviderStatus::Active),
            "inactive" => Ok(ProviderStatus::Inactive),
            "error" => Ok(ProviderStatus::Error),
            other => Err(format!("unknown provider status '{other}'")),
        }
    }
}

/// One external flight-data source.
///
/// Administrators own every field except `access_token`/`token_expiry`
/// (AuthManager), `status` and `last_sync_at` (pipeline), which the registry
/// snapshots at load time and tracks live afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub id: Uuid,
    pub code: String,
    pub api_name: String,
    pub api_family: ApiFamily,
    pub base_url: Url,
    pub credentials: Credentials,
    pub auth: AuthSettings,
    pub access_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub endpoints: EndpointTable,
    pub field_mapping: FieldMapping,
    pub rate_limit_per_minute: u32,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub status: ProviderStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl ProviderConfig {
    /// Minimal active provider with conventional auth settings.
    pub fn new(code: &str, api_family: ApiFamily, base_url: Url, strategy: AuthStrategy) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.to_string(),
            api_name: code.to_string(),
            api_family,
            base_url,
            credentials: Credentials::None,
            auth: AuthSettings::conventional(strategy),
            access_token: None,
            token_expiry: None,
            endpoints: EndpointTable::with_search("/flights/search"),
            field_mapping: FieldMapping::default(),
            rate_limit_per_minute: 60,
            timeout_seconds: 10,
            retry_attempts: 2,
            status: ProviderStatus::Active,
            last_sync_at: None,
        }
    }

    /// Resolve an endpoint path against the base URL.
    ///
    /// Paths keep any base-URL path prefix (`https://host/api` + `/v2/x`
    /// becomes `https://host/api/v2/x`); absolute URLs are used as-is.
    pub fn endpoint_url(&self, path: &str) -> Result<Url, url::ParseError> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Url::parse(path);
        }
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            return Url::parse(base);
        }
        Url::parse(&format!("{base}/{path}"))
    }
}
