//! Outbound provider HTTP calls with per-attempt timeouts and retry backoff.
//!
//! 5xx responses, timeouts and connection failures are retried up to the
//! provider's `retry_attempts`; any other non-2xx status is returned at once.

use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::auth_manager::AuthHeader;
use crate::config::RetryPolicyConfig;
use crate::providers::config::{ProviderConfig, SearchMethod};
use crate::providers::error::ProviderError;

const ERROR_BODY_LIMIT: usize = 512;

/// One request to a provider endpoint.
#[derive(Debug, Clone)]
pub struct ProviderRequest<'a> {
    pub method: SearchMethod,
    pub path: &'a str,
    pub payload: Option<&'a Value>,
}

/// Backoff before retry number `attempt` (0-based):
/// `min(base * 2^attempt, max)` plus up to `jitter_factor` of that.
pub fn backoff_delay<R: Rng + ?Sized>(
    policy: &RetryPolicyConfig,
    attempt: u32,
    rng: &mut R,
) -> Duration {
    let exp = (policy.base_ms as f64 * 2_f64.powi(attempt.min(30) as i32)).min(policy.max_ms as f64);
    let jitter = if policy.jitter_factor > 0.0 && exp > 0.0 {
        rng.gen_range(0.0..(policy.jitter_factor * exp))
    } else {
        0.0
    };
    Duration::from_millis((exp + jitter) as u64)
}

#[derive(Clone)]
pub struct Dispatcher {
    http: reqwest::Client,
    retry: RetryPolicyConfig,
}

impl Dispatcher {
    pub fn new(http: reqwest::Client, retry: RetryPolicyConfig) -> Self {
        Self { http, retry }
    }

    /// Send `request` and decode the JSON body of the first 2xx response.
    #[instrument(skip_all, fields(provider_code = %provider.code, path = request.path))]
    pub async fn send(
        &self,
        provider: &ProviderConfig,
        auth: &AuthHeader,
        request: &ProviderRequest<'_>,
    ) -> Result<Value, ProviderError> {
        let url = provider
            .endpoint_url(request.path)
            .map_err(|e| ProviderError::Configuration {
                details: format!("endpoint '{}': {e}", request.path),
            })?;
        let (header_name, header_value) = auth_header(auth)?;
        let timeout = Duration::from_secs(provider.timeout_seconds);
        let max_attempts = provider.retry_attempts.saturating_add(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let builder = self
                .build(request, url.clone())
                .timeout(timeout)
                .header(header_name.clone(), header_value.clone());

            let failure = match builder.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(attempt, status = response.status().as_u16(), "Provider responded");
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|e| ProviderError::MalformedResponse {
                            details: format!("response body is not JSON: {e}"),
                        });
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.ok().map(truncate);
                    ProviderError::Http {
                        status,
                        body,
                        attempts: attempt,
                    }
                }
                Err(err) if err.is_timeout() => ProviderError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                    attempts: attempt,
                },
                Err(err) => ProviderError::Network {
                    message: err.to_string(),
                    attempts: attempt,
                },
            };

            if !failure.is_retryable() || attempt >= max_attempts {
                return Err(failure);
            }

            let delay = backoff_delay(&self.retry, attempt - 1, &mut rand::thread_rng());
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Provider call failed; retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Single-attempt GET of the provider's status endpoint (or base URL).
    #[instrument(skip_all, fields(provider_code = %provider.code))]
    pub async fn probe(
        &self,
        provider: &ProviderConfig,
        auth: &AuthHeader,
    ) -> Result<u16, ProviderError> {
        let path = provider.endpoints.status.as_deref().unwrap_or("");
        let url = provider
            .endpoint_url(path)
            .map_err(|e| ProviderError::Configuration {
                details: format!("status endpoint '{path}': {e}"),
            })?;
        let (name, value) = auth_header(auth)?;
        let timeout = Duration::from_secs(provider.timeout_seconds);

        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .header(name, value)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ProviderError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                        attempts: 1,
                    }
                } else {
                    ProviderError::Network {
                        message: err.to_string(),
                        attempts: 1,
                    }
                }
            })?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            Ok(status)
        } else {
            Err(ProviderError::Http {
                status,
                body: response.text().await.ok().map(truncate),
                attempts: 1,
            })
        }
    }

    fn build(&self, request: &ProviderRequest<'_>, url: url::Url) -> RequestBuilder {
        match request.method {
            SearchMethod::Get => {
                let builder = self.http.request(Method::GET, url);
                match request.payload {
                    Some(payload) => builder.query(&query_pairs(payload)),
                    None => builder,
                }
            }
            SearchMethod::Post => {
                let builder = self.http.request(Method::POST, url);
                match request.payload {
                    Some(payload) => builder.json(payload),
                    None => builder,
                }
            }
        }
    }
}

fn auth_header(auth: &AuthHeader) -> Result<(HeaderName, HeaderValue), ProviderError> {
    let name = HeaderName::from_bytes(auth.name.as_bytes()).map_err(|_| {
        ProviderError::Configuration {
            details: format!("'{}' is not a valid header name", auth.name),
        }
    })?;
    let mut value =
        HeaderValue::from_str(&auth.value).map_err(|_| ProviderError::Configuration {
            details: format!("credential for header '{}' is not a valid header value", auth.name),
        })?;
    value.set_sensitive(true);
    Ok((name, value))
}

/// Top-level scalar members of a payload object as query parameters.
fn query_pairs(payload: &Value) -> Vec<(String, String)> {
    let Value::Object(map) = payload else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.clone(), rendered))
        })
        .collect()
}

fn truncate(mut body: String) -> String {
    if body.len() > ERROR_BODY_LIMIT {
        let mut cut = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}
