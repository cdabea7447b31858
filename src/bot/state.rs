//! Shared services handed to every handler

use super::CommandCooldown;
use crate::config::{get_request_deadline, PRICE_CACHE_MAX_SIZE};
use crate::conversion::{Conversion, ConversionError, ConversionRequest, Converter};
use crate::pricing::{CryptoPriceFetcher, FxRateFetcher, Quote, TokenInfoLookup};
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::MessageId;
use tokio::time::timeout;
use tracing::warn;

/// Everything the handlers need, built once at startup
pub struct AppState {
    /// Board and conversion quotes
    pub prices: Arc<CryptoPriceFetcher>,
    /// Contract address lookups
    pub tokens: TokenInfoLookup,
    /// `/crypto` rate limiting
    pub cooldown: CommandCooldown,
    converter: Converter,
    /// Upper bound on one user-facing fetch, retries and cooldowns included
    deadline: Duration,
    /// Last board message per chat
    boards: Cache<i64, MessageId>,
}

impl AppState {
    /// Wires the fetchers into handler state
    #[must_use]
    pub fn new(
        prices: Arc<CryptoPriceFetcher>,
        rates: Arc<FxRateFetcher>,
        tokens: TokenInfoLookup,
        cooldown: CommandCooldown,
    ) -> Self {
        Self {
            converter: Converter::new(prices.clone(), rates),
            prices,
            tokens,
            cooldown,
            deadline: get_request_deadline(),
            boards: Cache::new(PRICE_CACHE_MAX_SIZE),
        }
    }

    /// Replaces the per-request deadline
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Board quotes within the deadline; every symbol is `None` on expiry
    pub async fn board_quotes(&self, symbols: &[String]) -> HashMap<String, Option<Quote>> {
        match timeout(self.deadline, self.prices.get_prices(symbols)).await {
            Ok(quotes) => quotes,
            Err(_) => {
                warn!(
                    deadline_secs = self.deadline.as_secs(),
                    count = symbols.len(),
                    "Board quotes timed out"
                );
                symbols.iter().map(|symbol| (symbol.clone(), None)).collect()
            }
        }
    }

    /// Runs a conversion within the deadline.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::TimedOut`] on expiry, otherwise whatever
    /// the converter reports.
    pub async fn convert(&self, request: ConversionRequest) -> Result<Conversion, ConversionError> {
        timeout(self.deadline, self.converter.convert(request))
            .await
            .unwrap_or_else(|_| {
                warn!(deadline_secs = self.deadline.as_secs(), "Conversion timed out");
                Err(ConversionError::TimedOut)
            })
    }

    /// Records `msg_id` as the chat's board and returns the one it replaces
    pub async fn replace_board(&self, chat_id: i64, msg_id: MessageId) -> Option<MessageId> {
        let previous = self.boards.remove(&chat_id).await;
        self.boards.insert(chat_id, msg_id).await;
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::crypto::{MockQuoteSource, QuoteResponse};
    use crate::pricing::fx::MockRateSource;
    use crate::pricing::token_info::MockPairSource;
    use crate::pricing::KeyRotator;
    use tokio::time::Instant;

    fn state_with(quotes: MockQuoteSource, keys: usize) -> AppState {
        let ttl = Duration::from_secs(60);
        let prices = Arc::new(CryptoPriceFetcher::new(
            Arc::new(quotes),
            Arc::new(KeyRotator::new(
                "coinmarketcap",
                (0..keys).map(|i| format!("key-{i}")).collect(),
            )),
            ttl,
        ));
        let rates = Arc::new(FxRateFetcher::new(
            Arc::new(MockRateSource::new()),
            Arc::new(KeyRotator::new("exchangerate-api", vec!["k".to_string()])),
            ttl,
        ));
        let tokens = TokenInfoLookup::new(Arc::new(MockPairSource::new()), "ton");
        AppState::new(prices, rates, tokens, CommandCooldown::new(10, 100))
            .with_deadline(Duration::from_secs(8))
    }

    fn rate_limited_everywhere(calls: usize) -> MockQuoteSource {
        let mut mock = MockQuoteSource::new();
        mock.expect_fetch_quotes()
            .times(calls)
            .returning(|_, _| QuoteResponse::RateLimited);
        mock
    }

    #[tokio::test]
    async fn test_replace_board_returns_previous() {
        let state = state_with(MockQuoteSource::new(), 1);

        assert_eq!(state.replace_board(-1, MessageId(10)).await, None);
        assert_eq!(state.replace_board(-1, MessageId(11)).await, Some(MessageId(10)));
        assert_eq!(state.replace_board(-2, MessageId(12)).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_board_gives_up_at_deadline() {
        // both keys rate limited: the fetcher alone would cool down for minutes
        let state = state_with(rate_limited_everywhere(2), 2);
        let symbols = vec!["BTC".to_string(), "TON".to_string()];

        let started = Instant::now();
        let quotes = state.board_quotes(&symbols).await;

        assert!(started.elapsed() >= Duration::from_secs(8));
        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(quotes.len(), 2);
        assert!(quotes.values().all(Option::is_none));
    }

    #[tokio::test(start_paused = true)]
    async fn test_conversion_gives_up_at_deadline() {
        let state = state_with(rate_limited_everywhere(2), 2);
        let request = ConversionRequest {
            amount: 1.0,
            from: "TON".to_string(),
            to: "USD".to_string(),
        };

        let started = Instant::now();
        let result = state.convert(request).await;

        assert!(started.elapsed() >= Duration::from_secs(8));
        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(result, Err(ConversionError::TimedOut));
        assert_eq!(
            result.err().map(|e| e.to_string()),
            Some("Request timed out. Please try again.".to_string())
        );
    }
}
