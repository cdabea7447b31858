//! Hand-written provider doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use crypto_teller::pricing::{
    DexPair, PairSource, Quote, QuoteResponse, QuoteSource, RateResponse, RateSource,
    SourceError,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn quote(price: f64, change_24h: f64) -> Quote {
    Quote {
        price: Some(price),
        percent_change_24h: Some(change_24h),
        ..Quote::default()
    }
}

/// Quote source that answers from a fixed price table.
///
/// Keys listed in `rate_limited_keys` get a 429 instead. Every call is
/// recorded so tests can inspect batching and key usage.
pub struct TableQuoteSource {
    prices: HashMap<String, Quote>,
    rate_limited_keys: Vec<String>,
    calls: AtomicUsize,
    requests: Mutex<Vec<(Vec<String>, String)>>,
}

impl TableQuoteSource {
    pub fn new(prices: &[(&str, f64)]) -> Self {
        Self {
            prices: prices
                .iter()
                .map(|(s, p)| ((*s).to_string(), quote(*p, 1.0)))
                .collect(),
            rate_limited_keys: Vec::new(),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn rate_limiting(mut self, keys: &[&str]) -> Self {
        self.rate_limited_keys = keys.iter().map(ToString::to_string).collect();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(Vec<String>, String)> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl QuoteSource for TableQuoteSource {
    async fn fetch_quotes(&self, symbols: &[String], api_key: &str) -> QuoteResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((symbols.to_vec(), api_key.to_string()));
        }

        if self.rate_limited_keys.iter().any(|k| k == api_key) {
            return QuoteResponse::RateLimited;
        }

        QuoteResponse::Success(
            symbols
                .iter()
                .filter_map(|s| self.prices.get(s).map(|q| (s.clone(), q.clone())))
                .collect(),
        )
    }
}

/// Rate source that answers from a fixed `(from, to)` table
pub struct TableRateSource {
    rates: HashMap<(String, String), f64>,
    calls: AtomicUsize,
}

impl TableRateSource {
    pub fn new(rates: &[(&str, &str, f64)]) -> Self {
        Self {
            rates: rates
                .iter()
                .map(|(f, t, r)| (((*f).to_string(), (*t).to_string()), *r))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateSource for TableRateSource {
    async fn fetch_rate(&self, from: &str, to: &str, _api_key: &str) -> RateResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rates
            .get(&(from.to_string(), to.to_string()))
            .map_or(
                RateResponse::Rejected(crypto_teller::pricing::FxErrorKind::UnsupportedCode),
                |rate| RateResponse::Rate(*rate),
            )
    }
}

/// Rate source replaying a scripted sequence of responses
pub struct ScriptedRateSource {
    script: Mutex<VecDeque<RateResponse>>,
    keys_seen: Mutex<Vec<String>>,
}

impl ScriptedRateSource {
    pub fn new(script: Vec<RateResponse>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            keys_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn keys_seen(&self) -> Vec<String> {
        self.keys_seen.lock().map(|k| k.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RateSource for ScriptedRateSource {
    async fn fetch_rate(&self, _from: &str, _to: &str, api_key: &str) -> RateResponse {
        if let Ok(mut seen) = self.keys_seen.lock() {
            seen.push(api_key.to_string());
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| RateResponse::Transient("script exhausted".to_string()))
    }
}

/// Pair source returning a fixed search result
pub struct FixedPairSource {
    result: Mutex<Option<Result<Vec<DexPair>, SourceError>>>,
    calls: AtomicUsize,
}

impl FixedPairSource {
    pub fn ok(pairs: Vec<DexPair>) -> Self {
        Self {
            result: Mutex::new(Some(Ok(pairs))),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Mutex::new(Some(Err(SourceError::Network("connection reset".to_string())))),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PairSource for FixedPairSource {
    async fn search_pairs(&self, _query: &str) -> Result<Vec<DexPair>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result
            .lock()
            .ok()
            .and_then(|mut r| r.take())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub fn pair(chain: &str, symbol: &str, price: &str, liquidity: f64) -> DexPair {
    DexPair {
        chain_id: chain.to_string(),
        base_token: crypto_teller::pricing::token_info::DexToken {
            name: format!("{symbol} Token"),
            symbol: symbol.to_string(),
        },
        price_usd: Some(price.to_string()),
        liquidity: Some(crypto_teller::pricing::token_info::DexLiquidity {
            usd: Some(liquidity),
        }),
        ..DexPair::default()
    }
}
