//! Detection of TON contract addresses in chat messages.

// lazy_regex! uses once_cell internally
#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;

/// User-friendly (`EQ…`/`UQ…`) or 48-char base64url TON address
static RE_TON_ADDRESS: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"\b(?:(?:EQ|UQ)[A-Za-z0-9_\-]{46}|[A-Za-z0-9]{48})\b");

/// Returns the first TON address found in `text`.
///
/// # Examples
///
/// ```
/// use crypto_teller::bot::scanner::find_ton_address;
///
/// let text = "check EQBlqsm144Dq6SjbPI4jjZvA1hqTIP3CvHovbIfW_t-SCALE please";
/// assert_eq!(
///     find_ton_address(text),
///     Some("EQBlqsm144Dq6SjbPI4jjZvA1hqTIP3CvHovbIfW_t-SCALE")
/// );
/// ```
#[must_use]
pub fn find_ton_address(text: &str) -> Option<&str> {
    RE_TON_ADDRESS.find(text).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EQ_ADDRESS: &str = "EQBlqsm144Dq6SjbPI4jjZvA1hqTIP3CvHovbIfW_t-SCALE";

    #[test]
    fn test_finds_friendly_address() {
        let text = format!("what is {EQ_ADDRESS}?");
        assert_eq!(find_ton_address(&text), Some(EQ_ADDRESS));
    }

    #[test]
    fn test_finds_uq_address() {
        let address = EQ_ADDRESS.replacen("EQ", "UQ", 1);
        assert_eq!(find_ton_address(&address), Some(address.as_str()));
    }

    #[test]
    fn test_finds_raw_48_chars() {
        let raw = "A".repeat(48);
        assert_eq!(find_ton_address(&raw), Some(raw.as_str()));
    }

    #[test]
    fn test_ignores_plain_text() {
        assert_eq!(find_ton_address("ton to the moon"), None);
        assert_eq!(find_ton_address(&"A".repeat(47)), None);
        assert_eq!(find_ton_address(&"A".repeat(49)), None);
    }
}
