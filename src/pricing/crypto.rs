//! Crypto quotes from CoinMarketCap with caching and key failover.

use super::http::{create_http_client, describe_error, is_transient};
use super::retry::RetryPolicy;
use super::rotator::KeyRotator;
use super::SourceError;
use crate::config::{CMC_QUOTES_URL, PRICE_CACHE_MAX_SIZE};
use async_trait::async_trait;
use moka::future::Cache;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// USD quote for a single asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Price in USD
    pub price: Option<f64>,
    /// Traded volume over the last 24 hours
    pub volume_24h: Option<f64>,
    /// Price change over the last hour, in percent
    pub percent_change_1h: Option<f64>,
    /// Price change over the last 24 hours, in percent
    pub percent_change_24h: Option<f64>,
    /// Price change over the last 7 days, in percent
    pub percent_change_7d: Option<f64>,
    /// Circulating market cap
    pub market_cap: Option<f64>,
    /// Fully diluted market cap
    pub fully_diluted_market_cap: Option<f64>,
    /// Provider timestamp of the quote
    pub last_updated: Option<String>,
}

/// Outcome of one batched quote request, decoded at the HTTP boundary
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteResponse {
    /// 200: quotes keyed by upper-case symbol; missing symbols were dropped
    Success(HashMap<String, Quote>),
    /// 429: the key's quota is spent
    RateLimited,
    /// 401: the key was rejected
    Unauthorized,
    /// Any other 4xx
    ClientError(u16),
    /// 200 with a body that does not match the quote schema
    Malformed(String),
    /// Network failure or 5xx
    Transient(String),
}

/// Remote provider of batched USD quotes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Requests quotes for all `symbols` in a single call using `api_key`
    async fn fetch_quotes(&self, symbols: &[String], api_key: &str) -> QuoteResponse;
}

#[derive(Debug, Deserialize)]
struct CmcQuotesResponse {
    #[serde(default)]
    data: HashMap<String, CmcAsset>,
}

#[derive(Debug, Deserialize)]
struct CmcAsset {
    quote: HashMap<String, Quote>,
}

/// CoinMarketCap `quotes/latest` client
pub struct CoinMarketCapSource {
    client: HttpClient,
    url: String,
}

impl CoinMarketCapSource {
    /// Creates a source against the public CoinMarketCap endpoint
    #[must_use]
    pub fn new() -> Self {
        Self::with_url(create_http_client(), CMC_QUOTES_URL)
    }

    /// Creates a source with a custom client and endpoint
    #[must_use]
    pub fn with_url(client: HttpClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Maps an HTTP status and body to a [`QuoteResponse`]
    #[must_use]
    pub fn classify(status: StatusCode, body: &str) -> QuoteResponse {
        match status {
            StatusCode::OK => Self::decode(body),
            StatusCode::TOO_MANY_REQUESTS => QuoteResponse::RateLimited,
            StatusCode::UNAUTHORIZED => QuoteResponse::Unauthorized,
            s if is_transient(s) => QuoteResponse::Transient(describe_error(s, body)),
            s if s.is_client_error() => {
                let reason = describe_error(s, body);
                warn!(status = s.as_u16(), error = %reason, "CoinMarketCap rejected the request");
                QuoteResponse::ClientError(s.as_u16())
            }
            s => QuoteResponse::Malformed(format!("Unexpected status {s}")),
        }
    }

    fn decode(body: &str) -> QuoteResponse {
        match serde_json::from_str::<CmcQuotesResponse>(body) {
            Ok(parsed) => QuoteResponse::Success(
                parsed
                    .data
                    .into_iter()
                    .filter_map(|(symbol, mut asset)| {
                        asset
                            .quote
                            .remove("USD")
                            .map(|quote| (symbol.to_uppercase(), quote))
                    })
                    .collect(),
            ),
            Err(e) => QuoteResponse::Malformed(SourceError::Json(e.to_string()).to_string()),
        }
    }
}

impl Default for CoinMarketCapSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuoteSource for CoinMarketCapSource {
    async fn fetch_quotes(&self, symbols: &[String], api_key: &str) -> QuoteResponse {
        let joined = symbols.join(",");
        let request = self
            .client
            .get(&self.url)
            .header("X-CMC_PRO_API_KEY", api_key)
            .header("Accept", "application/json")
            .query(&[
                ("symbol", joined.as_str()),
                ("convert", "USD"),
                ("skip_invalid", "true"),
            ]);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return QuoteResponse::Transient(SourceError::from(e).to_string()),
        };

        let status = response.status();
        match response.text().await {
            Ok(body) => Self::classify(status, &body),
            Err(e) => QuoteResponse::Transient(SourceError::from(e).to_string()),
        }
    }
}

/// Batched crypto price lookups with a time-boxed cache.
///
/// Requests never fail: symbols that cannot be resolved map to `None`.
pub struct CryptoPriceFetcher {
    source: Arc<dyn QuoteSource>,
    rotator: Arc<KeyRotator>,
    cache: Cache<String, Quote>,
    policy: RetryPolicy,
}

impl CryptoPriceFetcher {
    /// Creates a fetcher whose cached quotes live for `ttl`
    #[must_use]
    pub fn new(source: Arc<dyn QuoteSource>, rotator: Arc<KeyRotator>, ttl: Duration) -> Self {
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

    /// Returns a quote (or `None`) for every distinct requested symbol.
    ///
    /// Fresh cache entries are served without a network call; all misses are
    /// fetched in one batch.
    #[instrument(skip(self), fields(count = symbols.len()))]
    pub async fn get_prices(&self, symbols: &[String]) -> HashMap<String, Option<Quote>> {
        let mut result = HashMap::with_capacity(symbols.len());
        let mut pending: Vec<String> = Vec::new();

        for symbol in symbols {
            if result.contains_key(symbol) || pending.contains(symbol) {
                continue;
            }
            match self.cache.get(symbol).await {
                Some(quote) => {
                    result.insert(symbol.clone(), Some(quote));
                }
                None => pending.push(symbol.clone()),
            }
        }

        if pending.is_empty() {
            debug!("All quotes served from cache");
            return result;
        }

        debug!(missing = pending.len(), "Fetching quotes from provider");

        let Some(mut quotes) = self.fetch_remote(&pending).await else {
            result.extend(pending.into_iter().map(|symbol| (symbol, None)));
            return result;
        };

        for symbol in pending {
            let quote = quotes
                .remove(&symbol)
                .or_else(|| quotes.remove(&symbol.to_uppercase()));
            match quote {
                Some(quote) => {
                    self.cache.insert(symbol.clone(), quote.clone()).await;
                    result.insert(symbol, Some(quote));
                }
                None => {
                    warn!(symbol = %symbol, "Provider omitted symbol from response");
                    result.insert(symbol, None);
                }
            }
        }

        result
    }

    /// Single-symbol convenience over [`Self::get_prices`]
    pub async fn get_price(&self, symbol: &str) -> Option<Quote> {
        self.get_prices(&[symbol.to_string()])
            .await
            .remove(symbol)
            .flatten()
    }

    async fn fetch_remote(&self, symbols: &[String]) -> Option<HashMap<String, Quote>> {
        let key_count = self.rotator.len().max(1);
        let mut rate_limited = 0usize;
        let mut cooldown_rounds = 0u32;
        let mut rejected = 0usize;
        let mut transient_retries = 0u32;

        loop {
            let key = self.rotator.current();
            match self.source.fetch_quotes(symbols, &key).await {
                QuoteResponse::Success(quotes) => {
                    if transient_retries > 0 || rate_limited > 0 || rejected > 0 {
                        info!(key_index = self.rotator.index(), "Quote request recovered");
                    }
                    return Some(quotes);
                }
                QuoteResponse::RateLimited => {
                    warn!(key_index = self.rotator.index(), "CoinMarketCap key rate limited");
                    self.rotator.advance();
                    rate_limited += 1;
                    if rate_limited >= key_count {
                        cooldown_rounds += 1;
                        if cooldown_rounds > self.policy.exhaustion_rounds {
                            error!(
                                rounds = self.policy.exhaustion_rounds,
                                "CoinMarketCap temporarily unavailable: every key is rate limited"
                            );
                            return None;
                        }
                        warn!(
                            cooldown_secs = self.policy.exhaustion_cooldown.as_secs(),
                            round = cooldown_rounds,
                            "All CoinMarketCap keys rate limited, cooling down"
                        );
                        tokio::time::sleep(self.policy.exhaustion_cooldown).await;
                        rate_limited = 0;
                    }
                }
                QuoteResponse::Unauthorized => {
                    warn!(key_index = self.rotator.index(), "CoinMarketCap key rejected");
                    self.rotator.advance();
                    rejected += 1;
                    if rejected >= key_count {
                        error!(keys = key_count, "Every CoinMarketCap key was rejected");
                        return None;
                    }
                }
                QuoteResponse::ClientError(status) => {
                    warn!(status, "Quote request aborted on client error");
                    return None;
                }
                QuoteResponse::Malformed(reason) => {
                    error!(reason = %reason, "Unreadable CoinMarketCap response");
                    return None;
                }
                QuoteResponse::Transient(reason) => {
                    transient_retries += 1;
                    if transient_retries > self.policy.transient_retries {
                        error!(
                            attempts = transient_retries,
                            reason = %reason,
                            "Quote request failed after retries"
                        );
                        return None;
                    }
                    let backoff = self.policy.transient_delay(transient_retries);
                    warn!(
                        attempt = transient_retries,
                        max_attempts = self.policy.transient_retries,
                        backoff_ms = backoff.as_millis(),
                        reason = %reason,
                        "Retrying quote request"
                    );
                    tokio::time::sleep(backoff).await;
                    self.rotator.advance();
                }
            }
        }
    }
}
