//! Amount conversion between supported fiat and crypto currencies.
//!
//! Crypto legs are priced in USD through CoinMarketCap; fiat legs go through
//! the USD exchange rate, so every conversion pivots on USD.

use crate::config::{is_crypto, is_supported};
use crate::pricing::{CryptoPriceFetcher, FxRateFetcher};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

const PIVOT: &str = "USD";

/// User-facing conversion failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConversionError {
    /// Query is not `FROM TO` or `AMOUNT FROM TO`
    #[error("Invalid format. Use: amount currency1 currency2")]
    InvalidFormat,
    /// One of the codes is not in the supported list
    #[error("Unsupported currency: {0}")]
    Unsupported(String),
    /// Fiat rate could not be determined
    #[error("Unable to get exchange rate for {0}/{1}")]
    RateUnavailable(String, String),
    /// Crypto quote could not be determined
    #[error("Cryptocurrency data not found for {0}.")]
    PriceUnavailable(String),
    /// Providers did not answer within the request deadline
    #[error("Request timed out. Please try again.")]
    TimedOut,
}

/// Parsed conversion query
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    /// Amount of `from`
    pub amount: f64,
    /// Source currency code
    pub from: String,
    /// Target currency code
    pub to: String,
}

impl ConversionRequest {
    /// Parses `FROM TO` or `AMOUNT FROM TO` (case-insensitive).
    ///
    /// With three words and no leading number, the first two words are the
    /// currencies and the third is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::InvalidFormat`] for other shapes and
    /// [`ConversionError::Unsupported`] for unknown codes.
    pub fn parse(query: &str) -> Result<Self, ConversionError> {
        let upper = query.to_uppercase();
        let parts: Vec<&str> = upper.split_whitespace().collect();

        let (amount, from, to) = match parts.as_slice() {
            [from, to] => (1.0, *from, *to),
            [first, second, third] => match first.replace(',', ".").parse::<f64>() {
                Ok(amount) => (amount, *second, *third),
                Err(_) => (1.0, *first, *second),
            },
            _ => return Err(ConversionError::InvalidFormat),
        };

        if !amount.is_finite() || amount <= 0.0 {
            return Err(ConversionError::InvalidFormat);
        }
        for code in [from, to] {
            if !is_supported(code) {
                return Err(ConversionError::Unsupported(code.to_string()));
            }
        }

        Ok(Self {
            amount,
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Result of a successful conversion
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    /// What was asked
    pub request: ConversionRequest,
    /// Amount of `to` per unit of `from`
    pub rate: f64,
}

impl Conversion {
    /// Converted amount of the target currency
    #[must_use]
    pub fn converted(&self) -> f64 {
        self.request.amount * self.rate
    }

    /// One-line summary, e.g. `🪙 2.00 $TON = 💸 10.50 USD`
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} = {}",
            format_leg(self.request.amount, &self.request.from),
            format_leg(self.converted(), &self.request.to)
        )
    }
}

fn format_leg(amount: f64, code: &str) -> String {
    if is_crypto(code) {
        let precision = if amount.abs() < 1.0 { 6 } else { 2 };
        format!("🪙 {amount:.precision$} ${code}")
    } else {
        format!("💸 {amount:.2} {code}")
    }
}

/// Converts amounts using the shared fetchers
#[derive(Clone)]
pub struct Converter {
    prices: Arc<CryptoPriceFetcher>,
    rates: Arc<FxRateFetcher>,
}

impl Converter {
    /// Creates a converter over the given fetchers
    #[must_use]
    pub fn new(prices: Arc<CryptoPriceFetcher>, rates: Arc<FxRateFetcher>) -> Self {
        Self { prices, rates }
    }

    /// Computes the `from` → `to` rate for `request`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConversionError`] naming the leg that could not be priced.
    pub async fn convert(&self, request: ConversionRequest) -> Result<Conversion, ConversionError> {
        let rate = self.rate(&request.from, &request.to).await?;
        debug!(from = %request.from, to = %request.to, rate, "Conversion rate resolved");
        Ok(Conversion { request, rate })
    }

    async fn rate(&self, from: &str, to: &str) -> Result<f64, ConversionError> {
        if from == to {
            return Ok(1.0);
        }

        match (is_crypto(from), is_crypto(to)) {
            (false, false) => self
                .rates
                .get_rate(from, to)
                .await
                .ok_or_else(|| ConversionError::RateUnavailable(from.to_string(), to.to_string())),
            (true, false) => {
                let price = self.usd_price(from).await?;
                Ok(price * self.usd_rate(to).await?)
            }
            (false, true) => {
                let price = self.usd_price(to).await?;
                let usd_per_unit = 1.0 / self.usd_rate(from).await?;
                Ok(usd_per_unit / price)
            }
            (true, true) => {
                let mut quotes = self
                    .prices
                    .get_prices(&[from.to_string(), to.to_string()])
                    .await;
                let from_price = quotes
                    .remove(from)
                    .flatten()
                    .and_then(|q| q.price)
                    .ok_or_else(|| ConversionError::PriceUnavailable(from.to_string()))?;
                let to_price = positive(quotes.remove(to).flatten().and_then(|q| q.price))
                    .ok_or_else(|| ConversionError::PriceUnavailable(to.to_string()))?;
                Ok(from_price / to_price)
            }
        }
    }

    async fn usd_price(&self, symbol: &str) -> Result<f64, ConversionError> {
        positive(self.prices.get_price(symbol).await.and_then(|q| q.price))
            .ok_or_else(|| ConversionError::PriceUnavailable(symbol.to_string()))
    }

    /// Units of `fiat` per USD
    async fn usd_rate(&self, fiat: &str) -> Result<f64, ConversionError> {
        if fiat == PIVOT {
            return Ok(1.0);
        }
        positive(self.rates.get_rate(PIVOT, fiat).await)
            .ok_or_else(|| ConversionError::RateUnavailable(PIVOT.to_string(), fiat.to_string()))
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_codes() {
        assert_eq!(
            ConversionRequest::parse("usd eur"),
            Ok(ConversionRequest {
                amount: 1.0,
                from: "USD".to_string(),
                to: "EUR".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_amount_with_comma() {
        let request = ConversionRequest::parse("2,5 ton rub").ok();
        assert_eq!(request.map(|r| r.amount), Some(2.5));
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert_eq!(
            ConversionRequest::parse("ton"),
            Err(ConversionError::InvalidFormat)
        );
        assert_eq!(
            ConversionRequest::parse("usd eur rub ton"),
            Err(ConversionError::InvalidFormat)
        );
        assert_eq!(
            ConversionRequest::parse("-1 usd eur"),
            Err(ConversionError::InvalidFormat)
        );
        assert_eq!(
            ConversionRequest::parse("1 usd xyz"),
            Err(ConversionError::Unsupported("XYZ".to_string()))
        );
    }

    #[test]
    fn test_parse_three_words_without_amount() {
        assert_eq!(
            ConversionRequest::parse("ton usd please"),
            Ok(ConversionRequest {
                amount: 1.0,
                from: "TON".to_string(),
                to: "USD".to_string(),
            })
        );
        assert_eq!(
            ConversionRequest::parse("abc usd eur"),
            Err(ConversionError::Unsupported("ABC".to_string()))
        );
    }

    #[test]
    fn test_summary_formatting() {
        let conversion = Conversion {
            request: ConversionRequest {
                amount: 2.0,
                from: "TON".to_string(),
                to: "USD".to_string(),
            },
            rate: 5.25,
        };
        assert_eq!(conversion.summary(), "🪙 2.00 $TON = 💸 10.50 USD");

        let conversion = Conversion {
            request: ConversionRequest {
                amount: 100.0,
                from: "USD".to_string(),
                to: "BTC".to_string(),
            },
            rate: 0.000_016,
        };
        assert_eq!(conversion.summary(), "💸 100.00 USD = 🪙 0.001600 $BTC");
    }
}
