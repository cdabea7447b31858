//! View layer for bot UI components
//!
//! Message texts, the price board and its pagination keyboard.

use crate::config::{CURRENCY_PAGES, DEVBLOG_URL, KEY_NAMES};
use crate::pricing::Quote;
use crate::utils::format_remaining;
use std::collections::HashMap;
use std::time::Duration;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

/// Prefix of pagination callback data
pub const PAGE_CALLBACK_PREFIX: &str = "page:";

/// Greeting for private chats
pub const START_PRIVATE: &str =
    "<b>What's up!</b> Add me into a group to access my functionality";

/// Greeting for groups
pub const START_GROUP: &str = "<b>Greetings!</b> I'm CryptoTeller, your friend in the world of cryptocurrencies";

/// Sent when the board could not be delivered
pub const BOARD_ERROR: &str = "Error fetching prices. Please try again.";

/// `/crypto` outside a group
pub const GROUP_ONLY: &str = "The price board is available in groups only.";

/// Help text listing commands and the inline mode
#[must_use]
pub fn help_text() -> String {
    "<b>Currently I can only provide information about cryptocurrencies, \
     but nobody knows, how far this will get.</b>\n\
     Here are my available commands:\n\n\
     • <b>/start</b> - Starts a conversation with me.\n\
     • <b>/crypto</b> - Shows the prices of specific cryptocurrencies.\n\n\
     • <b>/help</b> - Displays this help message.\n\
     • <b>/api</b> - <b>[DEV ONLY]</b> Shows currently used API key.\n\
     • <b>/devblog</b> - Development channel.\n\n\
     <i>Inline: <code>@bot 10 TON USD</code> converts amounts. \
     Sending a TON contract address shows token details.</i>"
        .to_string()
}

/// `/devblog` reply
#[must_use]
pub fn devblog_text() -> String {
    format!("• <a href=\"{DEVBLOG_URL}\">ʀɢʙ.ᴅᴇᴠ</a> - Your key to knowledge.")
}

/// Cooldown notice for `/crypto`
#[must_use]
pub fn cooldown_text(remaining: Duration) -> String {
    format!(
        "<b>Command on cooldown.</b> Values will refresh in: {}",
        format_remaining(remaining)
    )
}

/// Display name of a CoinMarketCap key slot: ALPHA…GOLF, then `KEY n`
#[must_use]
pub fn key_display_name(index: usize) -> String {
    KEY_NAMES
        .get(index)
        .map_or_else(|| format!("KEY {}", index + 1), ToString::to_string)
}

/// `/api` reply for the key at `index`
#[must_use]
pub fn current_key_text(index: usize) -> String {
    format!(
        "<b>Current API Key:</b> {} (#{})",
        key_display_name(index),
        index + 1
    )
}

/// Number of board pages
#[must_use]
pub fn page_count() -> usize {
    CURRENCY_PAGES.len()
}

/// Symbols on `page`, clamped to the last page
#[must_use]
pub fn page_symbols(page: usize) -> &'static [&'static str] {
    CURRENCY_PAGES
        .get(page.min(page_count().saturating_sub(1)))
        .copied()
        .unwrap_or_default()
}

/// Renders one board page. Symbols without a usable quote show a placeholder.
#[must_use]
pub fn format_price_page(symbols: &[&str], quotes: &HashMap<String, Option<Quote>>) -> String {
    let lines: Vec<String> = symbols
        .iter()
        .map(|symbol| {
            let quote = quotes.get(*symbol).and_then(Option::as_ref);
            match quote.and_then(|q| q.price.zip(q.percent_change_24h)) {
                Some((price, change)) => {
                    format!("• <b>${symbol}</b>:  {price:.6}<i>$</i> <b>({change:.2}%)</b>")
                }
                None => format!("• <b>${symbol}</b>:  Data not available"),
            }
        })
        .collect();

    format!(
        "Current cryptocurrency prices:\n\n{}\n\n  ∟  Prices from: <b>CoinMarketCap</b>",
        lines.join("\n")
    )
}

/// ⬅️ n/N ➡️ keyboard for `page` (zero-based)
#[must_use]
pub fn pagination_keyboard(page: usize) -> InlineKeyboardMarkup {
    let total = page_count();
    let page = page.min(total.saturating_sub(1));
    let prev = page.saturating_sub(1);
    let next = (page + 1).min(total.saturating_sub(1));

    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("⬅️", format!("{PAGE_CALLBACK_PREFIX}{prev}")),
        InlineKeyboardButton::callback(
            format!("{}/{total}", page + 1),
            format!("{PAGE_CALLBACK_PREFIX}{page}"),
        ),
        InlineKeyboardButton::callback("➡️", format!("{PAGE_CALLBACK_PREFIX}{next}")),
    ]])
}

/// Parses `page:<n>` callback data, clamping to the last page
#[must_use]
pub fn parse_page_callback(data: &str) -> Option<usize> {
    let page = data.strip_prefix(PAGE_CALLBACK_PREFIX)?.parse::<usize>().ok()?;
    Some(page.min(page_count().saturating_sub(1)))
}
