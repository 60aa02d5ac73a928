//! # Provider authentication
//!
//! Builds the credential header for each outbound provider call and owns the
//! access-token lifecycle for providers that obtain tokens from a credential
//! grant.
//!
//! Per provider the token moves through
//! `Unauthenticated → Authenticated → NearExpiry → Refreshing → Authenticated`,
//! or `→ Failed` when the grant call fails. Refreshes are single-flight: all
//! callers arriving while a refresh is running await that same refresh and
//! observe the same outcome. A failed refresh leaves the previous token fields
//! untouched.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration as StdDuration;

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::ProviderHealthConfig;
use crate::providers::config::{AuthStrategy, Credentials, ProviderConfig};
use crate::providers::registry::ProviderStateStore;

/// Authentication failure for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no {expected} credentials configured")]
    MissingCredentials { expected: &'static str },
    #[error("provider has no token endpoint configured")]
    MissingTokenEndpoint,
    #[error("token endpoint returned HTTP {status}")]
    TokenEndpoint { status: u16 },
    #[error("token endpoint unreachable: {message}")]
    Network { message: String },
    #[error("token endpoint did not answer in time")]
    Timeout,
    #[error("token endpoint response was not understood: {details}")]
    InvalidTokenResponse { details: String },
}

impl AuthError {
    /// Failures caused by the token endpoint being unavailable rather than
    /// by configuration or rejected credentials.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Network { .. } | AuthError::Timeout => true,
            AuthError::TokenEndpoint { status } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Token lifecycle phase, as reported to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Unauthenticated,
    Authenticated,
    NearExpiry,
    Refreshing,
    Failed,
}

/// An access token and its expiry. `None` expiry means it does not expire.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Header carrying a provider credential.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthHeader {
    pub name: String,
    pub value: String,
}

impl fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthHeader({}: [REDACTED])", self.name)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

type RefreshCell = Arc<OnceCell<Result<AccessToken, AuthError>>>;

#[derive(Default)]
struct TokenSlot {
    token: RwLock<Option<AccessToken>>,
    failures: AtomicU32,
    inflight: Mutex<Option<RefreshCell>>,
}

impl TokenSlot {
    fn seeded(provider: &ProviderConfig) -> Self {
        let token = provider
            .access_token
            .clone()
            .map(|value| AccessToken {
                value,
                expires_at: provider.token_expiry,
            })
            .or_else(|| match &provider.credentials {
                Credentials::Token { token } => Some(AccessToken {
                    value: token.clone(),
                    expires_at: None,
                }),
                _ => None,
            });
        Self {
            token: RwLock::new(token),
            ..Self::default()
        }
    }

    fn current(&self) -> Option<AccessToken> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// True when the token is absent or expires within `lead` of `now`.
pub fn needs_refresh_at(token: Option<&AccessToken>, lead: Duration, now: DateTime<Utc>) -> bool {
    match token {
        None => true,
        Some(AccessToken {
            expires_at: Some(expires_at),
            ..
        }) => *expires_at - now < lead,
        Some(_) => false,
    }
}

/// Per-provider credential and token manager.
pub struct AuthManager {
    http: reqwest::Client,
    refresh_lead: Duration,
    store: Arc<dyn ProviderStateStore>,
    slots: RwLock<HashMap<Uuid, Arc<TokenSlot>>>,
}

impl AuthManager {
    pub fn new(
        http: reqwest::Client,
        config: &ProviderHealthConfig,
        store: Arc<dyn ProviderStateStore>,
    ) -> Self {
        Self {
            http,
            refresh_lead: Duration::seconds(config.refresh_lead_seconds as i64),
            store,
            slots: RwLock::new(HashMap::new()),
        }
    }

    fn slot(&self, provider: &ProviderConfig) -> Arc<TokenSlot> {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&provider.id)
        {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            slots
                .entry(provider.id)
                .or_insert_with(|| Arc::new(TokenSlot::seeded(provider))),
        )
    }

    /// Current token held for the provider, if any.
    pub fn current_token(&self, provider: &ProviderConfig) -> Option<AccessToken> {
        self.slot(provider).current()
    }

    /// Consecutive failed refreshes since the last successful one.
    pub fn refresh_failures(&self, provider: &ProviderConfig) -> u32 {
        self.slot(provider).failures.load(Ordering::SeqCst)
    }

    pub fn needs_refresh(&self, provider: &ProviderConfig) -> bool {
        needs_refresh_at(
            self.current_token(provider).as_ref(),
            self.refresh_lead,
            Utc::now(),
        )
    }

    pub fn phase(&self, provider: &ProviderConfig) -> AuthPhase {
        let slot = self.slot(provider);
        if slot
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
        {
            return AuthPhase::Refreshing;
        }
        let token = slot.current();
        let failed = slot.failures.load(Ordering::SeqCst) > 0;
        match token {
            None if failed => AuthPhase::Failed,
            None => AuthPhase::Unauthenticated,
            Some(ref t) if needs_refresh_at(Some(t), self.refresh_lead, Utc::now()) => {
                if failed {
                    AuthPhase::Failed
                } else {
                    AuthPhase::NearExpiry
                }
            }
            Some(_) => AuthPhase::Authenticated,
        }
    }

    /// Build the credential header for a provider call, refreshing the token
    /// first when the strategy requires one and it is absent or near expiry.
    #[instrument(skip_all, fields(provider_code = %provider.code))]
    pub async fn get_auth_header(&self, provider: &ProviderConfig) -> Result<AuthHeader, AuthError> {
        let auth = &provider.auth;
        let credential = match auth.strategy {
            AuthStrategy::Basic => match &provider.credentials {
                Credentials::Basic { username, password } => {
                    general_purpose::STANDARD.encode(format!("{username}:{password}"))
                }
                _ => return Err(AuthError::MissingCredentials { expected: "basic" }),
            },
            AuthStrategy::ApiKey => match &provider.credentials {
                Credentials::ApiKey { key, .. } => key.clone(),
                _ => return Err(AuthError::MissingCredentials { expected: "api key" }),
            },
            AuthStrategy::Bearer => {
                let slot = self.slot(provider);
                let current = slot.current();
                let refreshable = provider.endpoints.token.is_some()
                    && needs_refresh_at(current.as_ref(), self.refresh_lead, Utc::now());
                match current {
                    _ if refreshable => self.ensure_token(provider).await?.value,
                    Some(token) => token.value,
                    None => return Err(AuthError::MissingCredentials { expected: "bearer" }),
                }
            }
            AuthStrategy::OAuth => self.ensure_token(provider).await?.value,
        };

        let value = if auth.prefix.is_empty() {
            credential
        } else {
            format!("{} {}", auth.prefix, credential)
        };
        Ok(AuthHeader {
            name: auth.header_name.clone(),
            value,
        })
    }

    /// Return a usable token, refreshing only if the held one is stale.
    async fn ensure_token(&self, provider: &ProviderConfig) -> Result<AccessToken, AuthError> {
        let slot = self.slot(provider);
        if let Some(token) = slot.current()
            && !needs_refresh_at(Some(&token), self.refresh_lead, Utc::now())
        {
            return Ok(token);
        }
        self.single_flight(provider, slot, false).await
    }

    /// Obtain a new token from the provider's token endpoint.
    ///
    /// Concurrent callers share one in-flight grant call.
    pub async fn refresh(&self, provider: &ProviderConfig) -> Result<AccessToken, AuthError> {
        let slot = self.slot(provider);
        self.single_flight(provider, slot, true).await
    }

    async fn single_flight(
        &self,
        provider: &ProviderConfig,
        slot: Arc<TokenSlot>,
        force: bool,
    ) -> Result<AccessToken, AuthError> {
        let cell = {
            let mut inflight = slot.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(inflight.get_or_insert_with(|| Arc::new(OnceCell::new())))
        };

        let result = cell
            .get_or_init(|| async {
                // A refresh that completed while this caller was queued already
                // produced a fresh token.
                if !force
                    && let Some(token) = slot.current()
                    && !needs_refresh_at(Some(&token), self.refresh_lead, Utc::now())
                {
                    return Ok(token);
                }
                self.perform_refresh(provider, &slot).await
            })
            .await
            .clone();

        let mut inflight = slot.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if inflight
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &cell))
        {
            *inflight = None;
        }
        result
    }

    #[instrument(skip_all, fields(provider_id = %provider.id, provider_code = %provider.code))]
    async fn perform_refresh(
        &self,
        provider: &ProviderConfig,
        slot: &TokenSlot,
    ) -> Result<AccessToken, AuthError> {
        match self.request_token(provider).await {
            Ok(token) => {
                *slot.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
                slot.failures.store(0, Ordering::SeqCst);
                counter!(
                    "auth_refresh_total",
                    "provider" => provider.code.clone(),
                    "outcome" => "success"
                )
                .increment(1);
                info!(expires_at = ?token.expires_at, "Provider token refreshed");

                if let Err(err) = self
                    .store
                    .save_token(provider.id, &token.value, token.expires_at)
                    .await
                {
                    warn!(error = %err, "Failed to persist refreshed provider token");
                }
                Ok(token)
            }
            Err(err) => {
                let failures = slot.failures.fetch_add(1, Ordering::SeqCst) + 1;
                counter!(
                    "auth_refresh_total",
                    "provider" => provider.code.clone(),
                    "outcome" => "failure"
                )
                .increment(1);
                warn!(error = %err, consecutive_failures = failures, "Provider token refresh failed");
                Err(err)
            }
        }
    }

    async fn request_token(&self, provider: &ProviderConfig) -> Result<AccessToken, AuthError> {
        let path = provider
            .endpoints
            .token
            .as_deref()
            .ok_or(AuthError::MissingTokenEndpoint)?;
        let url = provider
            .endpoint_url(path)
            .map_err(|_| AuthError::MissingTokenEndpoint)?;

        let (client_id, client_secret) = match &provider.credentials {
            Credentials::OAuthClient {
                client_id,
                client_secret,
            } => (client_id.as_str(), client_secret.as_str()),
            Credentials::ApiKey {
                key,
                secret: Some(secret),
            } => (key.as_str(), secret.as_str()),
            _ => {
                return Err(AuthError::MissingCredentials {
                    expected: "oauth client",
                });
            }
        };

        debug!(token_url = %url, "Requesting provider access token");
        let response = self
            .http
            .post(url)
            .timeout(StdDuration::from_secs(provider.timeout_seconds))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    AuthError::Timeout
                } else {
                    AuthError::Network {
                        message: err.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::TokenEndpoint {
                status: status.as_u16(),
            });
        }

        let body: TokenResponse =
            response
                .json()
                .await
                .map_err(|err| AuthError::InvalidTokenResponse {
                    details: err.to_string(),
                })?;
        if body.access_token.trim().is_empty() {
            return Err(AuthError::InvalidTokenResponse {
                details: "access_token is empty".to_string(),
            });
        }

        Ok(AccessToken {
            value: body.access_token,
            expires_at: body
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::config::{ApiFamily, AuthSettings};
    use crate::providers::registry::NullStateStore;
    use url::Url;

    fn manager() -> AuthManager {
        AuthManager::new(
            reqwest::Client::new(),
            &ProviderHealthConfig::default(),
            Arc::new(NullStateStore),
        )
    }

    fn provider(strategy: AuthStrategy, credentials: Credentials) -> ProviderConfig {
        let mut config = ProviderConfig::new(
            "auth-test",
            ApiFamily::GenericRest,
            Url::parse("https://api.example.com").unwrap(),
            strategy,
        );
        config.credentials = credentials;
        config
    }

    #[test]
    fn needs_refresh_boundaries() {
        let now = Utc::now();
        let lead = Duration::minutes(5);
        let token = |expires_at| AccessToken {
            value: "t".to_string(),
            expires_at,
        };

        assert!(needs_refresh_at(None, lead, now));
        assert!(needs_refresh_at(
            Some(&token(Some(now + Duration::minutes(4)))),
            lead,
            now
        ));
        assert!(needs_refresh_at(
            Some(&token(Some(now - Duration::minutes(1)))),
            lead,
            now
        ));
        assert!(!needs_refresh_at(
            Some(&token(Some(now + Duration::minutes(6)))),
            lead,
            now
        ));
        assert!(!needs_refresh_at(Some(&token(None)), lead, now));
    }

    #[tokio::test]
    async fn basic_header_is_base64_of_user_and_password() {
        let provider = provider(
            AuthStrategy::Basic,
            Credentials::Basic {
                username: "agent".to_string(),
                password: "s3cret".to_string(),
            },
        );
        let header = manager().get_auth_header(&provider).await.unwrap();
        assert_eq!(header.name, "Authorization");
        assert_eq!(header.value, "Basic YWdlbnQ6czNjcmV0");
    }

    #[tokio::test]
    async fn api_key_goes_raw_into_configured_header() {
        let mut provider = provider(
            AuthStrategy::ApiKey,
            Credentials::ApiKey {
                key: "abc123".to_string(),
                secret: None,
            },
        );
        provider.auth = AuthSettings {
            strategy: AuthStrategy::ApiKey,
            header_name: "x-partner-key".to_string(),
            prefix: String::new(),
        };
        let header = manager().get_auth_header(&provider).await.unwrap();
        assert_eq!(header.name, "x-partner-key");
        assert_eq!(header.value, "abc123");
    }

    #[tokio::test]
    async fn bearer_uses_stored_token_with_prefix() {
        let mut provider = provider(AuthStrategy::Bearer, Credentials::None);
        provider.access_token = Some("tok".to_string());
        provider.token_expiry = Some(Utc::now() + Duration::hours(1));
        let manager = manager();
        let header = manager.get_auth_header(&provider).await.unwrap();
        assert_eq!(header.value, "Bearer tok");
        assert_eq!(manager.phase(&provider), AuthPhase::Authenticated);
    }

    #[tokio::test]
    async fn mismatched_credentials_are_reported() {
        let provider = provider(AuthStrategy::Basic, Credentials::None);
        let err = manager().get_auth_header(&provider).await.unwrap_err();
        assert_eq!(err, AuthError::MissingCredentials { expected: "basic" });
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn oauth_without_token_endpoint_fails_and_counts() {
        let provider = provider(
            AuthStrategy::OAuth,
            Credentials::OAuthClient {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            },
        );
        let manager = manager();
        assert_eq!(manager.phase(&provider), AuthPhase::Unauthenticated);
        let err = manager.get_auth_header(&provider).await.unwrap_err();
        assert_eq!(err, AuthError::MissingTokenEndpoint);
        assert_eq!(manager.refresh_failures(&provider), 1);
        assert_eq!(manager.phase(&provider), AuthPhase::Failed);
    }

    #[test]
    fn header_debug_hides_value() {
        let header = AuthHeader {
            name: "Authorization".to_string(),
            value: "Bearer secret".to_string(),
        };
        assert!(!format!("{header:?}").contains("secret"));
    }
}
