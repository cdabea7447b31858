#![deny(missing_docs)]
//! CryptoTeller library.
//!
//! Price fetching with key rotation, fiat/crypto conversion, token lookups,
//! and the Telegram adapter built on top of them.

/// Telegram handlers, views, and helpers.
pub mod bot;
/// Configuration management.
pub mod config;
/// Currency conversion.
pub mod conversion;
/// Price providers and caches.
pub mod pricing;
/// Utility functions.
pub mod utils;
