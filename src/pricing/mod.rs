//! Price data layer
//!
//! Cached fetchers for crypto quotes and fiat rates with API-key rotation,
//! plus the single-shot token metadata lookup.

pub mod crypto;
pub mod fx;
pub mod http;
pub mod retry;
pub mod rotator;
pub mod token_info;

use thiserror::Error;

pub use crypto::{CoinMarketCapSource, CryptoPriceFetcher, Quote, QuoteResponse, QuoteSource};
pub use fx::{ExchangeRateApiSource, FxErrorKind, FxRateFetcher, RateResponse, RateSource};
pub use retry::RetryPolicy;
pub use rotator::KeyRotator;
pub use token_info::{
    DexPair, DexScreenerSource, LookupError, PairSelection, PairSource, TokenInfoLookup,
    TokenReport,
};

/// Failures raised inside provider sources before classification
#[derive(Debug, Error)]
pub enum SourceError {
    /// Error during network communication (connect, timeout, body read)
    #[error("Network error: {0}")]
    Network(String),
    /// Provider answered with a non-success status
    #[error("API error: {0}")]
    Api(String),
    /// Response body did not match the expected shape
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Json(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}
