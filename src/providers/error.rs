//! Per-provider failure taxonomy.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::auth_manager::AuthError;

/// Failure of a single provider call.
///
/// These never abort an aggregate search; they are collected into the
/// per-provider error map returned alongside partial results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("local rate limit of {limit_per_minute} requests/60s reached; request not sent")]
    RateLimitExceeded { limit_per_minute: u32 },
    #[error("no response within {timeout_ms}ms after {attempts} attempt(s)")]
    Timeout { timeout_ms: u64, attempts: u32 },
    #[error("provider returned HTTP {status} after {attempts} attempt(s)")]
    Http {
        status: u16,
        body: Option<String>,
        attempts: u32,
    },
    #[error("network error after {attempts} attempt(s): {message}")]
    Network { message: String, attempts: u32 },
    #[error("malformed provider response: {details}")]
    MalformedResponse { details: String },
    #[error("provider misconfigured: {details}")]
    Configuration { details: String },
    #[error("{operation} is not implemented for provider integrations")]
    NotImplemented { operation: &'static str },
    #[error("search deadline expired before the provider answered")]
    DeadlineExceeded,
    #[error("provider task ended unexpectedly: {details}")]
    Internal { details: String },
}

impl ProviderError {
    /// Stable code for error maps and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::Auth(_) => "AuthError",
            ProviderError::RateLimitExceeded { .. } => "RateLimitExceeded",
            ProviderError::Timeout { .. } | ProviderError::DeadlineExceeded => "ProviderTimeout",
            ProviderError::Http { .. } => "ProviderHttpError",
            ProviderError::Network { .. } => "ProviderNetworkError",
            ProviderError::MalformedResponse { .. } => "MalformedResponse",
            ProviderError::Configuration { .. } => "ConfigurationError",
            ProviderError::NotImplemented { .. } => "NotImplemented",
            ProviderError::Internal { .. } => "InternalError",
        }
    }

    /// Whether another attempt within the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Timeout { .. } | ProviderError::Network { .. } => true,
            ProviderError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the failure counts toward moving the provider to `error`.
    ///
    /// Only upstream unavailability counts: 5xx, timeouts, connection
    /// failures, and token-endpoint outages. Local denials, 4xx and caller
    /// deadlines do not.
    pub fn counts_toward_health(&self) -> bool {
        match self {
            ProviderError::Auth(err) => err.is_transient(),
            ProviderError::Timeout { .. } | ProviderError::Network { .. } => true,
            ProviderError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Serializable view of a provider error for API responses and logs.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderErrorReport {
    pub provider_id: Uuid,
    pub provider_code: String,
    /// Taxonomy code such as `ProviderTimeout` or `RateLimitExceeded`
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

impl ProviderErrorReport {
    pub fn new(provider_id: Uuid, provider_code: &str, error: &ProviderError) -> Self {
        let http_status = match error {
            ProviderError::Http { status, .. } => Some(*status),
            _ => None,
        };
        Self {
            provider_id,
            provider_code: provider_code.to_string(),
            code: error.code().to_string(),
            message: error.to_string(),
            http_status,
        }
    }
}

/// Errors raised by the provider registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("provider '{id}' not found")]
    ProviderNotFound { id: String },
    #[error("provider '{code}' has an invalid configuration: {reason}")]
    InvalidConfig { code: String, reason: String },
    #[error("provider code '{code}' is already registered")]
    DuplicateCode { code: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_and_health_classification() {
        let server = ProviderError::Http {
            status: 503,
            body: None,
            attempts: 3,
        };
        assert!(server.is_retryable());
        assert!(server.counts_toward_health());
        assert_eq!(server.code(), "ProviderHttpError");

        let client = ProviderError::Http {
            status: 404,
            body: None,
            attempts: 1,
        };
        assert!(!client.is_retryable());
        assert!(!client.counts_toward_health());

        let limited = ProviderError::RateLimitExceeded {
            limit_per_minute: 5,
        };
        assert!(!limited.counts_toward_health());
        assert_eq!(limited.code(), "RateLimitExceeded");

        assert_eq!(ProviderError::DeadlineExceeded.code(), "ProviderTimeout");
        assert!(!ProviderError::DeadlineExceeded.counts_toward_health());
    }

    #[test]
    fn malformed_response_has_its_own_code() {
        let malformed = ProviderError::MalformedResponse {
            details: "response body is not JSON".to_string(),
        };
        assert_eq!(malformed.code(), "MalformedResponse");
        assert!(!malformed.is_retryable());
        assert!(!malformed.counts_toward_health());
    }

    #[test]
    fn report_carries_http_status() {
        let report = ProviderErrorReport::new(
            Uuid::nil(),
            "sabre-cert",
            &ProviderError::Http {
                status: 502,
                body: Some("bad gateway".to_string()),
                attempts: 2,
            },
        );
        assert_eq!(report.http_status, Some(502));
        assert_eq!(report.code, "ProviderHttpError");
        assert!(report.message.contains("502"));
    }
}
