//! Inline mode: `@bot [AMOUNT] FROM TO` conversions.

use super::state::AppState;
use crate::conversion::{Conversion, ConversionError, ConversionRequest};
use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{
    InlineQuery, InlineQueryResult, InlineQueryResultArticle, InputMessageContent,
    InputMessageContentText,
};
use tracing::{debug, info};
use uuid::Uuid;

/// Answers an inline query with exactly one article: the conversion or the reason it failed.
///
/// # Errors
///
/// Returns an error if the answer cannot be delivered to Telegram.
pub async fn handle_inline_query(bot: Bot, q: InlineQuery, state: Arc<AppState>) -> Result<()> {
    let query = q.query.trim();
    if query.is_empty() {
        return Ok(());
    }

    let article = match ConversionRequest::parse(query) {
        Ok(request) => {
            info!(from = %request.from, to = %request.to, amount = request.amount, "Inline conversion requested");
            match state.convert(request).await {
                Ok(conversion) => conversion_article(&conversion),
                Err(e) => error_article(&e),
            }
        }
        Err(e) => {
            debug!(query, error = %e, "Rejected inline query");
            error_article(&e)
        }
    };

    bot.answer_inline_query(q.id.clone(), vec![article]).await?;
    Ok(())
}

/// Article carrying a finished conversion
#[must_use]
pub fn conversion_article(conversion: &Conversion) -> InlineQueryResult {
    let summary = conversion.summary();
    let request = &conversion.request;
    let article = InlineQueryResultArticle::new(
        Uuid::new_v4().to_string(),
        summary.clone(),
        InputMessageContent::Text(InputMessageContentText::new(summary)),
    )
    .description(format!(
        "1 {} = {} {}",
        request.from, conversion.rate, request.to
    ));
    InlineQueryResult::Article(article)
}

/// Article explaining why the query could not be answered
#[must_use]
pub fn error_article(error: &ConversionError) -> InlineQueryResult {
    let message = error.to_string();
    let article = InlineQueryResultArticle::new(
        Uuid::new_v4().to_string(),
        "Error",
        InputMessageContent::Text(InputMessageContentText::new(message.clone())),
    )
    .description(message);
    InlineQueryResult::Article(article)
}
