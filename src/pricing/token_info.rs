//! On-chain token metadata from DexScreener.
//!
//! A single search per lookup: no key rotation and no cache.

use super::http::{create_http_client, describe_error};
use super::SourceError;
use crate::config::DEXSCREENER_SEARCH_URL;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Base token of a trading pair
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DexToken {
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Ticker
    #[serde(default)]
    pub symbol: String,
}

/// Values reported per time window
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DexWindow {
    /// Last hour
    pub h1: Option<f64>,
    /// Last 24 hours
    pub h24: Option<f64>,
}

/// Pool liquidity
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DexLiquidity {
    /// Liquidity in USD
    pub usd: Option<f64>,
}

/// One trading pair record from a DexScreener search
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DexPair {
    /// Chain identifier such as `ton` or `ethereum`
    pub chain_id: String,
    /// Canonical DexScreener page
    pub url: Option<String>,
    /// Token being priced
    #[serde(default)]
    pub base_token: DexToken,
    /// USD price, kept as the provider's decimal string
    pub price_usd: Option<String>,
    /// Percent price changes
    pub price_change: Option<DexWindow>,
    /// Traded volume in USD
    pub volume: Option<DexWindow>,
    /// Pool liquidity
    pub liquidity: Option<DexLiquidity>,
    /// Fully diluted valuation in USD
    pub fdv: Option<f64>,
    /// Pair creation time, ms since epoch
    pub pair_created_at: Option<i64>,
}

impl DexPair {
    fn liquidity_usd(&self) -> f64 {
        self.liquidity
            .as_ref()
            .and_then(|l| l.usd)
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    pairs: Option<Vec<DexPair>>,
}

/// Search backend for trading pairs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PairSource: Send + Sync {
    /// Returns every pair matching the free-text `query`, in provider order
    async fn search_pairs(&self, query: &str) -> Result<Vec<DexPair>, SourceError>;
}

/// DexScreener search client
pub struct DexScreenerSource {
    client: HttpClient,
    url: String,
}

impl DexScreenerSource {
    /// Creates a source against the public DexScreener API
    #[must_use]
    pub fn new() -> Self {
        Self::with_url(create_http_client(), DEXSCREENER_SEARCH_URL)
    }

    /// Creates a source with a custom client and endpoint
    #[must_use]
    pub fn with_url(client: HttpClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Decodes a search response; non-2xx statuses become [`SourceError::Api`]
    ///
    /// # Errors
    ///
    /// Returns an error for non-success statuses and unreadable bodies.
    pub fn decode(status: StatusCode, body: &str) -> Result<Vec<DexPair>, SourceError> {
        if !status.is_success() {
            return Err(SourceError::Api(describe_error(status, body)));
        }

        let parsed: SearchResponse =
            serde_json::from_str(body).map_err(|e| SourceError::Json(e.to_string()))?;
        Ok(parsed.pairs.unwrap_or_default())
    }
}

impl Default for DexScreenerSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PairSource for DexScreenerSource {
    async fn search_pairs(&self, query: &str) -> Result<Vec<DexPair>, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("q", query)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        Self::decode(status, &body)
    }
}

/// How to choose among several pairs on the target chain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PairSelection {
    /// First pair in provider order
    #[default]
    FirstMatch,
    /// Pair with the deepest USD liquidity; provider order breaks ties
    HighestLiquidity,
}

/// User-facing lookup failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    /// The provider knows no pair for the address
    #[error("No pairs found for this address.")]
    NoPairs,
    /// Pairs exist, but none on the target chain
    #[error("No {} pair found.", .0.to_uppercase())]
    NoChainPair(String),
    /// Transport or decoding failure
    #[error("Error fetching token data. Please try again later.")]
    Unavailable,
}

/// Normalised token metadata ready for display
#[derive(Debug, Clone, PartialEq)]
pub struct TokenReport {
    /// Token name
    pub name: String,
    /// Token ticker
    pub symbol: String,
    /// USD price as reported
    pub price_usd: Option<String>,
    /// 1h change, percent
    pub change_1h: Option<f64>,
    /// 24h change, percent
    pub change_24h: Option<f64>,
    /// 24h volume, USD
    pub volume_24h: Option<f64>,
    /// Liquidity, USD
    pub liquidity_usd: Option<f64>,
    /// Fully diluted valuation, USD
    pub fdv: Option<f64>,
    /// Pair age bucket (`3d`, `5h`, `<1h`, `N/A`)
    pub age: String,
    /// DexScreener page
    pub url: Option<String>,
}

impl TokenReport {
    /// Derives display fields from a pair, measuring age against `now`
    #[must_use]
    pub fn from_pair(pair: &DexPair, now: DateTime<Utc>) -> Self {
        let age = pair
            .pair_created_at
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .map_or_else(|| "N/A".to_string(), |created| format_age(created, now));

        Self {
            name: pair.base_token.name.clone(),
            symbol: pair.base_token.symbol.clone(),
            price_usd: pair.price_usd.clone(),
            change_1h: pair.price_change.as_ref().and_then(|w| w.h1),
            change_24h: pair.price_change.as_ref().and_then(|w| w.h24),
            volume_24h: pair.volume.as_ref().and_then(|w| w.h24),
            liquidity_usd: pair.liquidity.as_ref().and_then(|l| l.usd),
            fdv: pair.fdv,
            age,
            url: pair.url.clone(),
        }
    }

    /// Telegram HTML rendering of the report
    #[must_use]
    pub fn to_html(&self) -> String {
        let mut text = format!(
            "<b>{}</b> (${})\n\n\
             💵 Price: ${}\n\
             📈 1h: {} | 24h: {}\n\
             📊 Volume 24h: ${}\n\
             💧 Liquidity: ${}\n\
             🏦 FDV: ${}\n\
             ⏳ Age: {}",
            html_escape::encode_text(&self.name),
            html_escape::encode_text(&self.symbol),
            html_escape::encode_text(self.price_usd.as_deref().unwrap_or("N/A")),
            format_change(self.change_1h),
            format_change(self.change_24h),
            format_amount(self.volume_24h),
            format_amount(self.liquidity_usd),
            format_amount(self.fdv),
            html_escape::encode_text(&self.age),
        );

        if let Some(url) = &self.url {
            text.push_str(&format!(
                "\n\n<a href=\"{}\">View on DexScreener</a>",
                html_escape::encode_double_quoted_attribute(url)
            ));
        }
        text
    }
}

/// Abbreviates large numbers: `1.50M`, `12.30K`, `999.00`
#[must_use]
pub fn abbreviate(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 1_000_000.0 {
        return format!("{:.2}M", value / 1_000_000.0);
    }
    if magnitude >= 1_000.0 {
        let thousands = format!("{:.2}", value / 1_000.0);
        // 999_999 rounds to 1000.00K
        if reaches_next_unit(&thousands) {
            return format!("{:.2}M", value / 1_000_000.0);
        }
        return format!("{thousands}K");
    }
    let units = format!("{value:.2}");
    if reaches_next_unit(&units) {
        return format!("{:.2}K", value / 1_000.0);
    }
    units
}

fn reaches_next_unit(formatted: &str) -> bool {
    formatted
        .parse::<f64>()
        .is_ok_and(|rounded| rounded.abs() >= 1_000.0)
}

/// Buckets the time since `created` into days, hours or `<1h`
#[must_use]
pub fn format_age(created: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(created);
    if elapsed.num_days() >= 1 {
        format!("{}d", elapsed.num_days())
    } else if elapsed.num_hours() >= 1 {
        format!("{}h", elapsed.num_hours())
    } else {
        "<1h".to_string()
    }
}

fn format_amount(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), abbreviate)
}

fn format_change(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v:+.2}%"))
}

/// Resolves a contract address to a [`TokenReport`]
pub struct TokenInfoLookup {
    source: Arc<dyn PairSource>,
    chain: String,
    selection: PairSelection,
}

impl TokenInfoLookup {
    /// Creates a lookup restricted to `chain`
    #[must_use]
    pub fn new(source: Arc<dyn PairSource>, chain: impl Into<String>) -> Self {
        Self {
            source,
            chain: chain.into(),
            selection: PairSelection::default(),
        }
    }

    /// Replaces the tie-break rule
    #[must_use]
    pub fn with_selection(mut self, selection: PairSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Looks up `address`; exactly one of report or error is produced.
    ///
    /// # Errors
    ///
    /// Returns a [`LookupError`] whose `Display` is meant for the end user.
    #[instrument(skip(self))]
    pub async fn lookup(&self, address: &str) -> Result<TokenReport, LookupError> {
        let pairs = self.source.search_pairs(address).await.map_err(|e| {
            warn!(error = %e, "Token lookup failed");
            LookupError::Unavailable
        })?;

        if pairs.is_empty() {
            return Err(LookupError::NoPairs);
        }

        let pair = self
            .select(&pairs)
            .ok_or_else(|| LookupError::NoChainPair(self.chain.clone()))?;
        debug!(chain = %pair.chain_id, symbol = %pair.base_token.symbol, "Selected pair");

        Ok(TokenReport::from_pair(pair, Utc::now()))
    }

    fn select<'a>(&self, pairs: &'a [DexPair]) -> Option<&'a DexPair> {
        let mut on_chain = pairs
            .iter()
            .filter(|pair| pair.chain_id.eq_ignore_ascii_case(&self.chain));

        match self.selection {
            PairSelection::FirstMatch => on_chain.next(),
            PairSelection::HighestLiquidity => on_chain.fold(None, |best, pair| match best {
                Some(current) if DexPair::liquidity_usd(current) >= pair.liquidity_usd() => {
                    Some(current)
                }
                _ => Some(pair),
            }),
        }
    }
}
