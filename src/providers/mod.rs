//! Provider configuration, mapping tables and the in-memory registry.
//!
//! - [`config`]: the provider configuration record and its enums
//! - [`mapping`]: dot-path mapping tables validated at load time
//! - [`registry`]: active providers with live health state
//! - [`error`]: per-provider failure taxonomy

pub mod config;
pub mod error;
pub mod mapping;
pub mod registry;

pub use config::{
    ApiFamily, AuthSettings, AuthStrategy, Credentials, EndpointTable, ProviderConfig,
    ProviderStatus, SearchMethod,
};
pub use error::{ProviderError, ProviderErrorReport, RegistryError};
pub use mapping::{FieldMapping, FieldPath};
pub use registry::{
    NullStateStore, ProviderFilter, ProviderRegistry, ProviderStateStore, RegisteredProvider,
};
