use std::sync::Arc;

use teloxide::prelude::*;

use abot_core::{
    domain::{ChatId, UserId},
    security::is_authorized,
};

use crate::handlers::send_reply;
use crate::router::AppState;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let chat_id = q.message.as_ref().map(|m| m.chat.id.0);
    let data = q.data.clone().unwrap_or_default();

    // Always answer the query so the client stops its spinner.
    let (Some(chat_id), false) = (chat_id, data.is_empty()) else {
        let _ = bot.answer_callback_query(cb_id).await;
        return Ok(());
    };

    let user_id = UserId(q.from.id.0 as i64);
    if !is_authorized(Some(user_id), &state.cfg.telegram_allowed_users) {
        tracing::info!(user = user_id.0, "unauthorized callback");
        let _ = bot
            .answer_callback_query(cb_id)
            .text("Unauthorized".to_string())
            .await;
        return Ok(());
    }

    if let Err(e) = state.messenger.answer_callback_query(&cb_id, None).await {
        tracing::debug!(error = %e, "answer_callback_query failed");
    }

    let _guard = state.chat_locks.lock_chat(chat_id).await;
    let reply = state.dispatcher.handle_callback(user_id, &data).await;
    send_reply(&state, ChatId(chat_id), reply).await;
    Ok(())
}
