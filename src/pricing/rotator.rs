//! Cyclic API key rotation.
//!
//! Each provider owns one [`KeyRotator`]. The cursor only moves forward on
//! failure signals and wraps around, so a provider-wide outage simply cycles
//! back to the first key.

use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Ordered credential set with a shared cursor
#[derive(Debug)]
pub struct KeyRotator {
    provider: &'static str,
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl KeyRotator {
    /// Creates a rotator positioned on the first key.
    ///
    /// `keys` is expected to be non-empty; [`crate::config::Settings::validate`]
    /// enforces that at startup.
    #[must_use]
    pub fn new(provider: &'static str, keys: Vec<String>) -> Self {
        Self {
            provider,
            keys,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Key the next request should use
    #[must_use]
    pub fn current(&self) -> String {
        self.keys
            .get(self.index())
            .cloned()
            .unwrap_or_default()
    }

    /// Moves the cursor to the next key, wrapping at the end.
    pub fn advance(&self) {
        let len = self.len().max(1);
        let previous = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % len))
            .unwrap_or_default();
        debug!(
            provider = self.provider,
            from = previous,
            to = (previous + 1) % len,
            "Rotated API key"
        );
    }

    /// Zero-based position of the current key
    #[must_use]
    pub fn index(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Number of keys in rotation
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when no key is configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("key-{i}")).collect()
    }

    #[test]
    fn test_starts_on_first_key() {
        let rotator = KeyRotator::new("test", keys(3));
        assert_eq!(rotator.index(), 0);
        assert_eq!(rotator.current(), "key-0");
    }

    #[test]
    fn test_advance_wraps() {
        let rotator = KeyRotator::new("test", keys(2));
        rotator.advance();
        assert_eq!(rotator.current(), "key-1");
        rotator.advance();
        assert_eq!(rotator.current(), "key-0");
    }

    #[test]
    fn test_single_key_stays_put() {
        let rotator = KeyRotator::new("test", keys(1));
        rotator.advance();
        assert_eq!(rotator.index(), 0);
        assert_eq!(rotator.current(), "key-0");
    }

    proptest! {
        #[test]
        fn prop_full_cycle_returns_to_start(len in 1usize..16, offset in 0usize..32) {
            let rotator = KeyRotator::new("test", keys(len));
            for _ in 0..offset {
                rotator.advance();
            }
            let start = rotator.index();
            for _ in 0..len {
                rotator.advance();
            }
            prop_assert_eq!(rotator.index(), start);
            prop_assert!(rotator.index() < len);
        }
    }
}
