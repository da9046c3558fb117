//! Telegram update handlers.
//!
//! Each handler checks authorization, hands the update to the core
//! dispatcher and delivers the resulting reply.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use abot_core::{
    dispatch::{self, Reply},
    domain::{ChatId, UserId},
    security::is_authorized,
};

use crate::router::AppState;

mod callback;
mod commands;
mod text;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let user_id = msg.from().map(|u| UserId(u.id.0 as i64));

    if !is_authorized(user_id, &state.cfg.telegram_allowed_users) {
        tracing::info!(user = ?user_id, chat = msg.chat.id.0, "unauthorized message");
        let _ = bot
            .send_message(
                msg.chat.id,
                "Unauthorized. Contact the bot owner for access.",
            )
            .await;
        return Ok(());
    }

    let Some(text) = msg.text() else {
        let _ = bot
            .send_message(msg.chat.id, "Send a command such as /start or /help.")
            .await;
        return Ok(());
    };

    let _guard = state.chat_locks.lock_chat(msg.chat.id.0).await;
    if text.starts_with('/') {
        commands::handle_command(msg.clone(), state.clone()).await
    } else {
        text::handle_text(msg.clone(), state.clone()).await
    }
}

/// Deliver a dispatcher reply; transport failures are logged, not propagated.
pub(crate) async fn send_reply(state: &AppState, chat_id: ChatId, reply: Reply) {
    if let Err(e) = dispatch::deliver(
        state.messenger.as_ref(),
        chat_id,
        reply,
        state.cfg.telegram_safe_limit,
    )
    .await
    {
        tracing::error!(chat = chat_id.0, error = %e, "failed to deliver reply");
    }
}
