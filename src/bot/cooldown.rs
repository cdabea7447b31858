//! Per-chat cooldown for the price board command
//!
//! Every `/crypto` call costs a CoinMarketCap request, so a chat may open a
//! new board only once per cooldown period.

use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Tracks when each chat last opened a price board
#[derive(Clone)]
pub struct CommandCooldown {
    /// chat_id -> time the cooldown started; entries expire with the cooldown
    cache: Cache<i64, Instant>,
    cooldown: Duration,
    /// Counter for rejected calls (for logging throttling)
    rejected_count: Arc<AtomicU64>,
}

impl CommandCooldown {
    /// Creates a cooldown tracker
    ///
    /// # Examples
    ///
    /// ```
    /// use crypto_teller::bot::CommandCooldown;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let cooldown = CommandCooldown::new(10, 10_000);
    /// assert!(cooldown.try_acquire(42).await.is_ok());
    /// assert!(cooldown.try_acquire(42).await.is_err());
    /// # }
    /// ```
    #[must_use]
    pub fn new(cooldown_secs: u64, max_capacity: u64) -> Self {
        Self::with_duration(Duration::from_secs(cooldown_secs), max_capacity)
    }

    /// Creates a tracker with a sub-second cooldown
    #[must_use]
    pub fn with_duration(cooldown: Duration, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(cooldown)
            .build();

        Self {
            cache,
            cooldown,
            rejected_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Starts the cooldown for `chat_id` unless one is already running.
    ///
    /// # Errors
    ///
    /// Returns the time left when the chat is still cooling down.
    pub async fn try_acquire(&self, chat_id: i64) -> Result<(), Duration> {
        let entry = self
            .cache
            .entry(chat_id)
            .or_insert_with(async { Instant::now() })
            .await;

        if entry.is_fresh() {
            return Ok(());
        }

        let remaining = self.cooldown.saturating_sub(entry.into_value().elapsed());
        if remaining.is_zero() {
            // Expired but not yet evicted
            self.cache.insert(chat_id, Instant::now()).await;
            return Ok(());
        }

        let count = self.rejected_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count.is_multiple_of(100) {
            debug!(count, chat_id, "Rejected board requests during cooldown");
        }

        Err(remaining)
    }

}
