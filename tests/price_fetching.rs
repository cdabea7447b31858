mod common;

use common::{FixedPairSource, ScriptedRateSource, TableQuoteSource, TableRateSource};
use crypto_teller::pricing::{
    CryptoPriceFetcher, FxErrorKind, FxRateFetcher, KeyRotator, LookupError, RateResponse,
    RetryPolicy, TokenInfoLookup,
};
use std::sync::Arc;
use std::time::Duration;

fn rotator(provider: &'static str, n: usize) -> Arc<KeyRotator> {
    Arc::new(KeyRotator::new(
        provider,
        (0..n).map(|i| format!("key-{i}")).collect(),
    ))
}

fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}

fn crypto_fetcher(source: Arc<TableQuoteSource>, keys: usize) -> CryptoPriceFetcher {
    CryptoPriceFetcher::new(source, rotator("coinmarketcap", keys), Duration::from_secs(300))
        .with_policy(RetryPolicy::immediate())
}

#[tokio::test]
async fn test_cached_symbols_are_never_refetched() {
    let source = Arc::new(TableQuoteSource::new(&[
        ("TON", 5.0),
        ("BTC", 60_000.0),
        ("ETH", 3_000.0),
    ]));
    let fetcher = crypto_fetcher(source.clone(), 1);

    let first = fetcher.get_prices(&symbols(&["TON", "BTC"])).await;
    assert_eq!(first.len(), 2);

    let second = fetcher.get_prices(&symbols(&["TON", "BTC", "ETH"])).await;
    assert_eq!(second.len(), 3);
    assert!(second.values().all(Option::is_some));

    let requests = source.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].0, symbols(&["ETH"]));

    fetcher.get_prices(&symbols(&["ETH", "TON"])).await;
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn test_omitted_symbol_maps_to_none_and_stays_uncached() {
    let source = Arc::new(TableQuoteSource::new(&[("TON", 5.0), ("BTC", 60_000.0)]));
    let fetcher = crypto_fetcher(source.clone(), 1);

    let result = fetcher.get_prices(&symbols(&["TON", "BTC", "ETH"])).await;

    assert_eq!(result.len(), 3);
    assert!(result["TON"].is_some());
    assert!(result["BTC"].is_some());
    assert!(result["ETH"].is_none());

    fetcher.get_prices(&symbols(&["TON", "ETH"])).await;
    let requests = source.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].0, symbols(&["ETH"]));
}

#[tokio::test]
async fn test_rate_limited_keys_are_skipped_until_one_succeeds() {
    let source = Arc::new(
        TableQuoteSource::new(&[("TON", 5.0)]).rate_limiting(&["key-0", "key-1", "key-2"]),
    );
    let fetcher = crypto_fetcher(source.clone(), 4);

    let price = fetcher.get_price("TON").await.and_then(|q| q.price);

    assert_eq!(price, Some(5.0));
    assert_eq!(source.calls(), 4);
    assert_eq!(fetcher.rotator().index(), 3);
    let keys: Vec<String> = source.requests().into_iter().map(|(_, key)| key).collect();
    assert_eq!(keys, vec!["key-0", "key-1", "key-2", "key-3"]);
}

#[tokio::test]
async fn test_exhausted_keys_give_up_after_bounded_rounds() {
    let source =
        Arc::new(TableQuoteSource::new(&[("TON", 5.0)]).rate_limiting(&["key-0", "key-1"]));
    let fetcher = crypto_fetcher(source.clone(), 2);

    let result = fetcher.get_prices(&symbols(&["TON", "BTC"])).await;

    assert_eq!(result.len(), 2);
    assert!(result.values().all(Option::is_none));
    // One full pass per round: the initial round plus three cooldown rounds
    assert_eq!(source.calls(), 8);
}

#[tokio::test]
async fn test_fx_rate_is_cached() {
    let source = Arc::new(TableRateSource::new(&[("USD", "EUR", 0.92)]));
    let fetcher = FxRateFetcher::new(
        source.clone(),
        rotator("exchangerate-api", 1),
        Duration::from_secs(3600),
    );

    assert_eq!(fetcher.get_rate("USD", "EUR").await, Some(0.92));
    assert_eq!(fetcher.get_rate("USD", "EUR").await, Some(0.92));
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_fx_unsupported_code_is_none() {
    let source = Arc::new(TableRateSource::new(&[("USD", "EUR", 0.92)]));
    let fetcher = FxRateFetcher::new(
        source.clone(),
        rotator("exchangerate-api", 2),
        Duration::from_secs(3600),
    );

    assert_eq!(fetcher.get_rate("USD", "XYZ").await, None);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_fx_rotates_past_invalid_key() {
    let source = Arc::new(ScriptedRateSource::new(vec![
        RateResponse::Rejected(FxErrorKind::InvalidKey),
        RateResponse::Rate(91.5),
    ]));
    let fetcher = FxRateFetcher::new(
        source.clone(),
        rotator("exchangerate-api", 3),
        Duration::from_secs(3600),
    )
    .with_policy(RetryPolicy::immediate());

    assert_eq!(fetcher.get_rate("USD", "RUB").await, Some(91.5));
    assert_eq!(source.keys_seen(), vec!["key-0", "key-1"]);
    assert_eq!(fetcher.rotator().index(), 1);
}

#[tokio::test]
async fn test_lookup_prefers_configured_chain() {
    let source = Arc::new(FixedPairSource::ok(vec![
        common::pair("ethereum", "WETH", "3000", 9_000_000.0),
        common::pair("ton", "SCALE", "0.042", 120_000.0),
    ]));
    let lookup = TokenInfoLookup::new(source.clone(), "ton");

    let report = lookup.lookup("EQBlqsm144Dq6SjbPI4jjZvA1hqTIP3CvHovbIfW_t-SCALE").await;

    assert_eq!(report.as_ref().map(|r| r.symbol.as_str()), Ok("SCALE"));
    assert_eq!(
        report.ok().and_then(|r| r.price_usd),
        Some("0.042".to_string())
    );
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_lookup_without_chain_pair() {
    let source = Arc::new(FixedPairSource::ok(vec![common::pair(
        "ethereum", "WETH", "3000", 1.0,
    )]));
    let lookup = TokenInfoLookup::new(source, "ton");

    let err = lookup.lookup("EQ").await.err();

    assert_eq!(err, Some(LookupError::NoChainPair("ton".to_string())));
    assert_eq!(
        err.map(|e| e.to_string()),
        Some("No TON pair found.".to_string())
    );
}

#[tokio::test]
async fn test_lookup_failure_is_reported_not_raised() {
    let lookup = TokenInfoLookup::new(Arc::new(FixedPairSource::failing()), "ton");

    let err = lookup.lookup("EQ").await.err();

    assert_eq!(err, Some(LookupError::Unavailable));
}
