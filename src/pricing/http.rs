//! HTTP utilities for price providers
//!
//! Shared client construction and error-body handling for the provider
//! sources.

use crate::config::get_http_timeout;
use reqwest::{Client as HttpClient, StatusCode};

/// Creates an HTTP client configured with the provider timeout.
///
/// Uses `HTTP_TIMEOUT_SECS` environment variable or 10s default so a slow
/// provider cannot stall a handler indefinitely.
#[must_use]
pub fn create_http_client() -> HttpClient {
    HttpClient::builder()
        .timeout(get_http_timeout())
        .user_agent(concat!("crypto-teller/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Turns an error response body into a short, log-friendly description.
#[must_use]
pub fn describe_error(status: StatusCode, error_text: &str) -> String {
    // Nginx/Cloudflare error pages
    let trimmed = error_text.trim_start();
    if trimmed.starts_with("<!DOCTYPE") || trimmed.starts_with("<html") || trimmed.starts_with("<HTML") {
        return format!("HTTP {status} (Server returned HTML error page)");
    }

    format!("HTTP {status} - {}", truncate(error_text, 300))
}

/// True for statuses worth retrying with the same request.
///
/// Only 5xx qualifies; 408 stays a terminal client error.
#[must_use]
pub fn is_transient(status: StatusCode) -> bool {
    status.is_server_error()
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((pos, _)) => format!("{}... (truncated)", &text[..pos]),
        None => text.to_string(),
    }
}
