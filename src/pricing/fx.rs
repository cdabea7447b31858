//! Fiat exchange rates from ExchangeRate-API with caching and key failover.

use super::http::{create_http_client, is_transient};
use super::retry::RetryPolicy;
use super::rotator::KeyRotator;
use super::SourceError;
use crate::config::{EXCHANGE_RATE_BASE_URL, PRICE_CACHE_MAX_SIZE};
use async_trait::async_trait;
use moka::future::Cache;
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// `error-type` tags documented by ExchangeRate-API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FxErrorKind {
    /// `invalid-key`
    InvalidKey,
    /// `inactive-account`
    InactiveAccount,
    /// `unsupported-code`
    UnsupportedCode,
    /// `malformed-request`
    MalformedRequest,
    /// `quota-reached`
    QuotaReached,
    /// `plan-upgrade-required`
    PlanUpgradeRequired,
    /// `server-error`
    ServerError,
    /// `rate-limit-reached`
    RateLimitReached,
    /// Anything else, including a missing tag
    Unknown(String),
}

impl FxErrorKind {
    /// Maps a provider tag onto a known kind
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "invalid-key" => Self::InvalidKey,
            "inactive-account" => Self::InactiveAccount,
            "unsupported-code" => Self::UnsupportedCode,
            "malformed-request" => Self::MalformedRequest,
            "quota-reached" => Self::QuotaReached,
            "plan-upgrade-required" => Self::PlanUpgradeRequired,
            "server-error" => Self::ServerError,
            "rate-limit-reached" => Self::RateLimitReached,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// True when another key may succeed where this one failed
    #[must_use]
    pub const fn is_key_specific(&self) -> bool {
        matches!(
            self,
            Self::InvalidKey | Self::InactiveAccount | Self::QuotaReached | Self::PlanUpgradeRequired
        )
    }
}

/// Outcome of one pair request, decoded at the HTTP boundary
#[derive(Debug, Clone, PartialEq)]
pub enum RateResponse {
    /// `result: success` with a conversion rate
    Rate(f64),
    /// `result: error` with its tag
    Rejected(FxErrorKind),
    /// Network failure or an unreadable 5xx
    Transient(String),
}

/// Remote provider of single-pair conversion rates
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Requests the `from` → `to` rate using `api_key`
    async fn fetch_rate(&self, from: &str, to: &str, api_key: &str) -> RateResponse;
}

#[derive(Debug, Deserialize)]
struct PairBody {
    result: String,
    conversion_rate: Option<f64>,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
}

/// ExchangeRate-API v6 `pair` endpoint client
pub struct ExchangeRateApiSource {
    client: HttpClient,
    base_url: String,
}

impl ExchangeRateApiSource {
    /// Creates a source against the public v6 endpoint
    #[must_use]
    pub fn new() -> Self {
        Self::with_url(create_http_client(), EXCHANGE_RATE_BASE_URL)
    }

    /// Creates a source with a custom client and base URL
    #[must_use]
    pub fn with_url(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn decode(status: StatusCode, body: &str) -> RateResponse {
        match serde_json::from_str::<PairBody>(body) {
            Ok(parsed) if parsed.result == "success" => match parsed.conversion_rate {
                Some(rate) => RateResponse::Rate(rate),
                None => RateResponse::Rejected(FxErrorKind::Unknown(
                    "success without conversion_rate".to_string(),
                )),
            },
            Ok(parsed) => RateResponse::Rejected(FxErrorKind::from_tag(
                parsed.error_type.as_deref().unwrap_or_default(),
            )),
            Err(_) if status == StatusCode::TOO_MANY_REQUESTS => {
                RateResponse::Rejected(FxErrorKind::RateLimitReached)
            }
            Err(e) if is_transient(status) => {
                RateResponse::Transient(format!("HTTP {status}: {e}"))
            }
            Err(e) => RateResponse::Rejected(FxErrorKind::Unknown(
                SourceError::Json(e.to_string()).to_string(),
            )),
        }
    }
}

impl Default for ExchangeRateApiSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateSource for ExchangeRateApiSource {
    async fn fetch_rate(&self, from: &str, to: &str, api_key: &str) -> RateResponse {
        let url = format!("{}/{api_key}/pair/{from}/{to}", self.base_url);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => return RateResponse::Transient(SourceError::from(e).to_string()),
        };

        let status = response.status();
        match response.text().await {
            Ok(body) => Self::decode(status, &body),
            Err(e) => RateResponse::Transient(SourceError::from(e).to_string()),
        }
    }
}

/// Pair rate lookups with a time-boxed cache.
///
/// Returns `None` whenever the rate cannot be determined; expired entries are
/// never served.
pub struct FxRateFetcher {
    source: Arc<dyn RateSource>,
    rotator: Arc<KeyRotator>,
    cache: Cache<(String, String), f64>,
    policy: RetryPolicy,
}

impl FxRateFetcher {
    /// Creates a fetcher whose cached rates live for `ttl`
    #[must_use]
    pub fn new(source: Arc<dyn RateSource>, rotator: Arc<KeyRotator>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(PRICE_CACHE_MAX_SIZE)
            .time_to_live(ttl)
            .build();

        Self {
            source,
            rotator,
            cache,
            policy: RetryPolicy::default(),
        }
    }

    /// Replaces the retry schedule
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Key rotation state for this provider
    #[must_use]
    pub fn rotator(&self) -> &KeyRotator {
        &self.rotator
    }

    /// Rate to multiply an amount of `from` by to get `to`.
    #[instrument(skip(self))]
    pub async fn get_rate(&self, from: &str, to: &str) -> Option<f64> {
        let key = (from.to_string(), to.to_string());
        if let Some(rate) = self.cache.get(&key).await {
            debug!(rate, "Rate served from cache");
            return Some(rate);
        }

        let rate = self.fetch_remote(from, to).await?;
        self.cache.insert(key, rate).await;
        Some(rate)
    }

    async fn fetch_remote(&self, from: &str, to: &str) -> Option<f64> {
        let key_count = self.rotator.len().max(1);
        let mut rejected = 0usize;
        let mut rate_limit_waits = 0u32;
        let mut transient_retries = 0u32;

        loop {
            let api_key = self.rotator.current();
            let reason = match self.source.fetch_rate(from, to, &api_key).await {
                RateResponse::Rate(rate) => return Some(rate),
                RateResponse::Rejected(kind) if kind.is_key_specific() => {
                    warn!(
                        key_index = self.rotator.index(),
                        kind = ?kind,
                        "ExchangeRate-API key unusable"
                    );
                    self.rotator.advance();
                    rejected += 1;
                    if rejected >= key_count {
                        error!(keys = key_count, "Every ExchangeRate-API key failed");
                        return None;
                    }
                    continue;
                }
                RateResponse::Rejected(FxErrorKind::UnsupportedCode) => {
                    info!("Currency code not supported by provider");
                    return None;
                }
                RateResponse::Rejected(FxErrorKind::RateLimitReached) => {
                    rate_limit_waits += 1;
                    if rate_limit_waits > self.policy.rate_limit_waits {
                        error!(waits = self.policy.rate_limit_waits, "Rate limit persisted");
                        return None;
                    }
                    let backoff = self.policy.rate_limit_delay(rate_limit_waits);
                    warn!(
                        attempt = rate_limit_waits,
                        backoff_ms = backoff.as_millis(),
                        "ExchangeRate-API rate limited"
                    );
                    tokio::time::sleep(backoff).await;
                    self.rotator.advance();
                    continue;
                }
                RateResponse::Rejected(FxErrorKind::ServerError) => "server-error".to_string(),
                RateResponse::Rejected(kind) => {
                    warn!(kind = ?kind, "Rate request failed");
                    return None;
                }
                RateResponse::Transient(reason) => reason,
            };

            transient_retries += 1;
            if transient_retries > self.policy.transient_retries {
                error!(
                    attempts = transient_retries,
                    reason = %reason,
                    "Rate request failed after retries"
                );
                return None;
            }
            let backoff = self.policy.transient_delay(transient_retries);
            warn!(
                attempt = transient_retries,
                max_attempts = self.policy.transient_retries,
                backoff_ms = backoff.as_millis(),
                reason = %reason,
                "Retrying rate request"
            );
            tokio::time::sleep(backoff).await;
            self.rotator.advance();
        }
    }
}
