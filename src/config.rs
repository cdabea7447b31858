//! Configuration and settings management
//!
//! Loads settings from environment variables and defines market constants.

use crate::pricing::token_info::PairSelection;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Comma-separated list of CoinMarketCap API keys
    #[serde(rename = "cmc_api_keys")]
    pub cmc_api_keys_str: Option<String>,

    /// Comma-separated list of ExchangeRate-API keys
    #[serde(rename = "exchange_rate_api_keys")]
    pub exchange_rate_api_keys_str: Option<String>,

    /// Chain identifier used to pick DexScreener pairs
    #[serde(default = "default_token_chain")]
    pub token_chain: String,

    /// Pair selection rule: `first` or `liquidity`
    pub pair_selection: Option<String>,
}

fn default_token_chain() -> String {
    DEFAULT_TOKEN_CHAIN.to_string()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use crypto_teller::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a credential list is empty.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Not checked into git
            .add_source(File::with_name("config/local").required(false))
            // Eg.. `APP__TOKEN_CHAIN=ton ./target/app`
            .add_source(Environment::with_prefix("APP").separator("__"))
            // UPPER_SNAKE_CASE env vars map onto snake_case fields
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let settings: Self = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects configurations the rotators cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` when a provider has no credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cmc_api_keys().is_empty() {
            return Err(ConfigError::Message(
                "CMC_API_KEYS must contain at least one key".to_string(),
            ));
        }
        if self.exchange_rate_api_keys().is_empty() {
            return Err(ConfigError::Message(
                "EXCHANGE_RATE_API_KEYS must contain at least one key".to_string(),
            ));
        }
        Ok(())
    }

    /// CoinMarketCap keys in rotation order
    #[must_use]
    pub fn cmc_api_keys(&self) -> Vec<String> {
        parse_key_list(self.cmc_api_keys_str.as_deref())
    }

    /// ExchangeRate-API keys in rotation order
    #[must_use]
    pub fn exchange_rate_api_keys(&self) -> Vec<String> {
        parse_key_list(self.exchange_rate_api_keys_str.as_deref())
    }

    /// Every configured secret, used to mask log output
    #[must_use]
    pub fn secrets(&self) -> Vec<String> {
        let mut secrets = vec![self.telegram_token.clone()];
        secrets.extend(self.cmc_api_keys());
        secrets.extend(self.exchange_rate_api_keys());
        secrets.retain(|s| !s.is_empty());
        secrets
    }

    /// Tie-break rule for token lookups
    #[must_use]
    pub fn pair_selection(&self) -> PairSelection {
        match self.pair_selection.as_deref().map(str::trim) {
            Some(rule) if rule.eq_ignore_ascii_case("liquidity") => PairSelection::HighestLiquidity,
            _ => PairSelection::FirstMatch,
        }
    }
}

fn parse_key_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .map(ToString::to_string)
            .collect()
    })
    .unwrap_or_default()
}

// Endpoints
/// CoinMarketCap latest quotes endpoint
pub const CMC_QUOTES_URL: &str = "https://pro-api.coinmarketcap.com/v1/cryptocurrency/quotes/latest";
/// ExchangeRate-API v6 base URL
pub const EXCHANGE_RATE_BASE_URL: &str = "https://v6.exchangerate-api.com/v6";
/// DexScreener search endpoint
pub const DEXSCREENER_SEARCH_URL: &str = "https://api.dexscreener.com/latest/dex/search";

/// Default chain for token lookups
pub const DEFAULT_TOKEN_CHAIN: &str = "ton";

// Currencies
/// Symbols shown by `/crypto`, one inner slice per page
pub const CURRENCY_PAGES: &[&[&str]] = &[
    &["TON", "BTC", "ETH", "SUI", "USDT", "SOL"],
    &["NOT", "PUNK", "ARBUZ", "DOGE", "SHIT", "DOGS"],
    &["REDO", "DUREV", "WALL", "STON", "GRAM", "RAFF"],
];

/// Codes accepted by inline conversions
pub const SUPPORTED_CURRENCIES: &[&str] = &[
    "USD", "RUB", "EUR", "GBP", "JPY", "KZT", "UAH", "TON", "BTC", "ETH", "DOGE", "DOGS", "NOT",
    "SOL", "STON", "GRAM", "SUI",
];

/// Supported codes priced through CoinMarketCap
pub const CRYPTO_SYMBOLS: &[&str] = &[
    "TON", "BTC", "ETH", "DOGE", "DOGS", "NOT", "SOL", "STON", "GRAM", "SUI",
];

/// Display names for the CoinMarketCap key slots
pub const KEY_NAMES: &[&str] = &[
    "ALPHA", "BRAVO", "CHARLIE", "DELTA", "ECHO", "FOXTROT", "GOLF",
];

/// Development blog link shared by `/devblog`
pub const DEVBLOG_URL: &str = "https://t.me/rgbdevelopment";

// Caching
/// Crypto quote time-to-live in seconds
pub const CRYPTO_CACHE_TTL_SECS: u64 = 300;
/// Fiat rate time-to-live in seconds
pub const FX_CACHE_TTL_SECS: u64 = 3600;
/// Upper bound for entries kept by each fetcher cache
pub const PRICE_CACHE_MAX_SIZE: u64 = 10_000;

// Retry schedule
/// Retries after a network or server failure
pub const TRANSIENT_MAX_RETRIES: u32 = 3;
/// First transient backoff step, doubled on each retry
pub const TRANSIENT_INITIAL_BACKOFF_MS: u64 = 1000;
/// Waits allowed after an explicit fx rate-limit answer
pub const RATE_LIMIT_MAX_WAITS: u32 = 3;
/// First fx rate-limit wait, doubled on each wait
pub const RATE_LIMIT_INITIAL_BACKOFF_MS: u64 = 2000;
/// Pause once every CoinMarketCap key has been rate limited
pub const KEY_EXHAUSTION_COOLDOWN_SECS: u64 = 60;
/// Full passes over the key set before a crypto fetch gives up
pub const KEY_EXHAUSTION_MAX_ROUNDS: u32 = 3;

// HTTP
/// Timeout for every provider request
pub const HTTP_TIMEOUT_SECS: u64 = 10;
/// Overall budget for one user-facing request (inline answer, board fetch)
pub const REQUEST_DEADLINE_SECS: u64 = 8;

// Telegram API retry configuration
/// Maximum attempts for Telegram sends
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// Initial backoff for Telegram sends
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff for Telegram sends
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;

// Command cooldown
/// Seconds between `/crypto` boards in the same chat
pub const CRYPTO_COMMAND_COOLDOWN_SECS: u64 = 10;
/// Maximum number of chats tracked by the cooldown cache
pub const COOLDOWN_CACHE_MAX_SIZE: u64 = 10_000;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Get provider HTTP timeout from env or default.
///
/// Environment variable: `HTTP_TIMEOUT_SECS`.
#[must_use]
pub fn get_http_timeout() -> Duration {
    Duration::from_secs(env_or("HTTP_TIMEOUT_SECS", HTTP_TIMEOUT_SECS))
}

/// Get the per-request deadline from env or default.
///
/// Environment variable: `REQUEST_DEADLINE_SECS`.
#[must_use]
pub fn get_request_deadline() -> Duration {
    Duration::from_secs(env_or("REQUEST_DEADLINE_SECS", REQUEST_DEADLINE_SECS))
}

/// Get crypto quote TTL from env or default.
///
/// Environment variable: `CRYPTO_CACHE_TTL_SECS`.
#[must_use]
pub fn get_crypto_cache_ttl() -> Duration {
    Duration::from_secs(env_or("CRYPTO_CACHE_TTL_SECS", CRYPTO_CACHE_TTL_SECS))
}

/// Get fiat rate TTL from env or default.
///
/// Environment variable: `FX_CACHE_TTL_SECS`.
#[must_use]
pub fn get_fx_cache_ttl() -> Duration {
    Duration::from_secs(env_or("FX_CACHE_TTL_SECS", FX_CACHE_TTL_SECS))
}

/// Get `/crypto` cooldown from env or default.
///
/// Environment variable: `CRYPTO_COMMAND_COOLDOWN_SECS`.
#[must_use]
pub fn get_crypto_command_cooldown() -> u64 {
    env_or("CRYPTO_COMMAND_COOLDOWN_SECS", CRYPTO_COMMAND_COOLDOWN_SECS)
}

/// Returns true when `code` is priced through CoinMarketCap
#[must_use]
pub fn is_crypto(code: &str) -> bool {
    CRYPTO_SYMBOLS.contains(&code)
}

/// Returns true when `code` may appear in a conversion
#[must_use]
pub fn is_supported(code: &str) -> bool {
    SUPPORTED_CURRENCIES.contains(&code)
}

/// Every symbol on every `/crypto` page, in display order
#[must_use]
pub fn all_board_symbols() -> Vec<String> {
    CURRENCY_PAGES
        .iter()
        .flat_map(|page| page.iter().map(ToString::to_string))
        .collect()
}
