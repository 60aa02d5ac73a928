//! # Error Handling
//!
//! This module provides unified error handling for the flight aggregator API,
//! implementing a consistent problem+json response format with trace ID propagation.

use std::collections::BTreeMap;

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::booking::BookingError;
use crate::models::criteria::ValidationError;
use crate::providers::error::{ProviderError, ProviderErrorReport, RegistryError};
use crate::telemetry;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Extract current trace ID from the active tracing span (falls back to generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| Some(format!("corr-{}", &Uuid::new_v4().to_string()[..8]).into_boxed_str()))
    }
}

fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error
        .code()
        .is_some_and(|code| code == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code.as_ref()))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

// Error mappers for common sources

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            _ => {
                tracing::error!("Database error: {:?}", error);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            &error.to_string(),
        )
    }
}

impl From<RegistryError> for ApiError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::ProviderNotFound { .. } => {
                Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", &error.to_string())
            }
            RegistryError::InvalidConfig { .. } => Self::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                &error.to_string(),
            ),
            RegistryError::DuplicateCode { .. } => {
                Self::new(StatusCode::CONFLICT, "CONFLICT", &error.to_string())
            }
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(error: ProviderError) -> Self {
        match &error {
            ProviderError::NotImplemented { .. } => Self::new(
                StatusCode::NOT_IMPLEMENTED,
                "NOT_IMPLEMENTED",
                &error.to_string(),
            ),
            ProviderError::RateLimitExceeded { .. } => {
                Self::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", &error.to_string())
                    .with_retry_after(60)
            }
            _ => Self::new(
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                &error.to_string(),
            )
            .with_details(json!({ "providerErrorCode": error.code() })),
        }
    }
}

impl From<BookingError> for ApiError {
    fn from(error: BookingError) -> Self {
        match error {
            BookingError::Registry(err) => err.into(),
            BookingError::Provider(err) => err.into(),
        }
    }
}

/// Search where every queried provider failed and nothing came back.
pub fn all_providers_failed(errors: &BTreeMap<Uuid, ProviderErrorReport>) -> ApiError {
    ApiError::new(
        StatusCode::BAD_GATEWAY,
        "PROVIDER_ERROR",
        &format!("All {} queried providers failed", errors.len()),
    )
    .with_details(json!({ "providerErrors": errors }))
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_manager::AuthError;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_api_error_with_details() {
        let error = ApiError::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", "Test error message")
            .with_details(json!({"field": "value"}));

        assert_eq!(error.details, Some(Box::new(json!({"field": "value"}))));
        assert!(error.trace_id.is_some());
    }

    #[test]
    fn test_from_anyhow() {
        let api_error: ApiError = anyhow::anyhow!("Something went wrong").into();

        assert_eq!(api_error.code, Box::from("INTERNAL_SERVER_ERROR"));
        assert_eq!(api_error.message, Box::from("An internal error occurred"));
    }

    #[test]
    fn test_validation_error_maps_to_400() {
        let api_error: ApiError = ValidationError::SameOriginAndDestination {
            code: "JFK".to_string(),
        }
        .into();
        assert_eq!(api_error.status, StatusCode::BAD_REQUEST);
        assert_eq!(api_error.code, Box::from("VALIDATION_FAILED"));
    }

    #[test]
    fn test_registry_error_mapping() {
        let not_found: ApiError = RegistryError::ProviderNotFound {
            id: "abc".to_string(),
        }
        .into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);

        let duplicate: ApiError = RegistryError::DuplicateCode {
            code: "amadeus".to_string(),
        }
        .into();
        assert_eq!(duplicate.status, StatusCode::CONFLICT);
    }

    #[test]
    fn test_provider_error_mapping() {
        let stub: ApiError = ProviderError::NotImplemented { operation: "booking" }.into();
        assert_eq!(stub.status, StatusCode::NOT_IMPLEMENTED);

        let limited: ApiError = ProviderError::RateLimitExceeded {
            limit_per_minute: 10,
        }
        .into();
        assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.retry_after, Some(60));

        let auth: ApiError = ProviderError::Auth(AuthError::Timeout).into();
        assert_eq!(auth.status, StatusCode::BAD_GATEWAY);
        let details = auth.details.unwrap();
        assert_eq!(details["providerErrorCode"], "AuthError");
    }

    #[test]
    fn test_all_providers_failed_carries_error_map() {
        let id = Uuid::new_v4();
        let mut errors = BTreeMap::new();
        errors.insert(
            id,
            ProviderErrorReport::new(
                id,
                "alpha",
                &ProviderError::Http {
                    status: 503,
                    body: None,
                    attempts: 3,
                },
            ),
        );

        let error = all_providers_failed(&errors);
        assert_eq!(error.status, StatusCode::BAD_GATEWAY);
        assert_eq!(error.code, Box::from("PROVIDER_ERROR"));
        let details = error.details.unwrap();
        assert!(details["providerErrors"].get(id.to_string()).is_some());
    }

    #[test]
    fn test_content_type_and_retry_after_headers() {
        let response = ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "Rate limit exceeded",
        )
        .with_retry_after(60)
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("retry-after").unwrap(), "60");
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn test_database_error_mapping() {
        let api_error: ApiError = sea_orm::DbErr::RecordNotFound("flight".to_string()).into();
        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
    }
}
