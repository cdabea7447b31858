//! Telegram sends with automatic retry on transient failures.
//!
//! Wrappers around the Bot API calls the handlers make, retried through
//! [`crate::utils::retry_telegram_operation`].

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InlineKeyboardMarkup, Message, MessageId, ParseMode, ReplyParameters,
};
use tracing::{debug, warn};

const ERROR_NOT_MODIFIED: &str = "message is not modified";
const ERROR_NOT_FOUND: &str = "message to edit not found";
const ERROR_CANT_DELETE: &str = "message can't be deleted";
const ERROR_DELETE_NOT_FOUND: &str = "message to delete not found";

/// Send an HTML message with automatic retry on network failures.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn send_html_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    keyboard: Option<InlineKeyboardMarkup>,
) -> Result<Message> {
    let text = text.into();
    crate::utils::retry_telegram_operation(|| async {
        let mut req = bot
            .send_message(chat_id, text.clone())
            .parse_mode(ParseMode::Html);
        if let Some(kb) = keyboard.clone() {
            req = req.reply_markup(kb);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Reply to `reply_to` with an HTML message, retrying on network failures.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn reply_html_resilient(
    bot: &Bot,
    chat_id: ChatId,
    reply_to: MessageId,
    text: impl Into<String>,
) -> Result<Message> {
    let text = text.into();
    crate::utils::retry_telegram_operation(|| async {
        bot.send_message(chat_id, text.clone())
            .parse_mode(ParseMode::Html)
            .reply_parameters(ReplyParameters::new(reply_to))
            .await
            .map_err(|e| anyhow::anyhow!("Telegram reply error: {e}"))
    })
    .await
}

/// Re-render a board message in place.
///
/// Returns `false` when the edit was skipped (unchanged or gone) or failed
/// after retries.
pub async fn edit_board_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: &str,
    keyboard: InlineKeyboardMarkup,
) -> bool {
    let result = crate::utils::retry_telegram_operation(|| async {
        bot.edit_message_text(chat_id, msg_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard.clone())
            .await
            .map_err(|e| anyhow::anyhow!("Telegram edit error: {e}"))
    })
    .await;

    match result {
        Ok(_) => true,
        Err(e) => {
            let err_msg = e.to_string();
            if is_benign_edit_error(&err_msg) {
                debug!(chat_id = chat_id.0, "Board update skipped: {err_msg}");
            } else {
                warn!(chat_id = chat_id.0, error = %e, "Failed to edit board after retries");
            }
            false
        }
    }
}

/// Delete a message, ignoring messages that are already gone.
pub async fn delete_message_quiet(bot: &Bot, chat_id: ChatId, msg_id: MessageId) {
    if let Err(e) = bot.delete_message(chat_id, msg_id).await {
        let err_msg = e.to_string();
        if is_benign_delete_error(&err_msg) {
            debug!(chat_id = chat_id.0, "Previous board already gone: {err_msg}");
        } else {
            warn!(chat_id = chat_id.0, error = %e, "Failed to delete previous board");
        }
    }
}

fn is_benign_edit_error(err_msg: &str) -> bool {
    err_msg.contains(ERROR_NOT_MODIFIED) || err_msg.contains(ERROR_NOT_FOUND)
}

fn is_benign_delete_error(err_msg: &str) -> bool {
    err_msg.contains(ERROR_CANT_DELETE) || err_msg.contains(ERROR_DELETE_NOT_FOUND)
}
