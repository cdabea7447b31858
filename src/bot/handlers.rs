use super::resilient::{
    delete_message_quiet, edit_board_resilient, reply_html_resilient, send_html_resilient,
};
use super::scanner::find_ton_address;
use super::state::AppState;
use super::views::{
    cooldown_text, current_key_text, devblog_text, format_price_page, help_text, page_symbols,
    pagination_keyboard, parse_page_callback, BOARD_ERROR, GROUP_ONLY, START_GROUP,
    START_PRIVATE,
};
use crate::config::all_board_symbols;
use anyhow::Result;
use std::sync::Arc;
use teloxide::{prelude::*, types::CallbackQuery, utils::command::BotCommands};
use tracing::{error, info, warn};

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Supported commands for the bot
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Greeting
    #[command(description = "Starts a conversation with me.")]
    Start,
    /// Command list
    #[command(description = "Displays the help message.")]
    Help,
    /// Paged price board
    #[command(description = "Shows the prices of specific cryptocurrencies.")]
    Crypto,
    /// Current CoinMarketCap key slot
    #[command(description = "[DEV ONLY] Shows currently used API key.")]
    Api,
    /// Development channel link
    #[command(description = "Development channel.")]
    Devblog,
}

/// Start handler
///
/// # Errors
///
/// Returns an error if the greeting cannot be sent.
pub async fn start(bot: Bot, msg: Message) -> Result<()> {
    let text = if msg.chat.is_private() {
        START_PRIVATE
    } else {
        START_GROUP
    };
    info!(user_id = get_user_id_safe(&msg), chat_id = msg.chat.id.0, "/start");
    send_html_resilient(&bot, msg.chat.id, text, None).await?;
    Ok(())
}

/// Help handler
///
/// # Errors
///
/// Returns an error if the help text cannot be sent.
pub async fn help(bot: Bot, msg: Message) -> Result<()> {
    send_html_resilient(&bot, msg.chat.id, help_text(), None).await?;
    Ok(())
}

/// `/crypto`: fetch every board symbol in one batch and post page 1.
///
/// Group chats only, once per cooldown. The chat's previous board is
/// deleted after the new one is posted.
///
/// # Errors
///
/// Returns an error if neither the board nor the failure notice can be sent.
pub async fn crypto(bot: Bot, msg: Message, state: Arc<AppState>) -> Result<()> {
    let chat_id = msg.chat.id;

    if !(msg.chat.is_group() || msg.chat.is_supergroup()) {
        send_html_resilient(&bot, chat_id, GROUP_ONLY, None).await?;
        return Ok(());
    }

    if let Err(remaining) = state.cooldown.try_acquire(chat_id.0).await {
        send_html_resilient(&bot, chat_id, cooldown_text(remaining), None).await?;
        return Ok(());
    }

    let quotes = state.board_quotes(&all_board_symbols()).await;
    let text = format_price_page(page_symbols(0), &quotes);

    match send_html_resilient(&bot, chat_id, text, Some(pagination_keyboard(0))).await {
        Ok(sent) => {
            info!(chat_id = chat_id.0, "Price board posted");
            if let Some(previous) = state.replace_board(chat_id.0, sent.id).await {
                delete_message_quiet(&bot, chat_id, previous).await;
            }
        }
        Err(e) => {
            error!(chat_id = chat_id.0, error = %e, "Failed to post price board");
            bot.send_message(chat_id, BOARD_ERROR).await?;
        }
    }

    Ok(())
}

/// `/api`: name the CoinMarketCap key currently in use
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn api(bot: Bot, msg: Message, state: Arc<AppState>) -> Result<()> {
    let index = state.prices.rotator().index();
    send_html_resilient(&bot, msg.chat.id, current_key_text(index), None).await?;
    Ok(())
}

/// `/devblog`
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn devblog(bot: Bot, msg: Message) -> Result<()> {
    reply_html_resilient(&bot, msg.chat.id, msg.id, devblog_text()).await?;
    Ok(())
}

/// Pagination buttons under a board.
///
/// Quotes come from the fetcher cache filled by `/crypto`, so paging does
/// not cost provider calls while the entries are fresh.
///
/// # Errors
///
/// Returns an error if the callback message is missing its chat.
pub async fn handle_page_callback(bot: Bot, q: CallbackQuery, state: Arc<AppState>) -> Result<()> {
    let Some(page) = q.data.as_deref().and_then(parse_page_callback) else {
        return Ok(());
    };

    let _ = bot.answer_callback_query(q.id.clone()).await;

    let (chat_id, msg_id) = q
        .message
        .as_ref()
        .map(|msg| (msg.chat().id, msg.id()))
        .ok_or_else(|| anyhow::anyhow!("Callback message missing chat id"))?;

    let symbols: Vec<String> = page_symbols(page).iter().map(ToString::to_string).collect();
    let quotes = state.board_quotes(&symbols).await;
    let text = format_price_page(page_symbols(page), &quotes);

    edit_board_resilient(&bot, chat_id, msg_id, &text, pagination_keyboard(page)).await;
    Ok(())
}

/// Replies to a message containing a TON address with the token report.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn handle_address(bot: Bot, msg: Message, state: Arc<AppState>) -> Result<()> {
    let Some(address) = msg.text().and_then(find_ton_address) else {
        return Ok(());
    };

    info!(chat_id = msg.chat.id.0, address, "Token lookup requested");
    let text = match state.tokens.lookup(address).await {
        Ok(report) => report.to_html(),
        Err(e) => {
            warn!(address, error = %e, "Token lookup returned no report");
            e.to_string()
        }
    };

    reply_html_resilient(&bot, msg.chat.id, msg.id, text).await?;
    Ok(())
}
