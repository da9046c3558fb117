use std::sync::Arc;

use teloxide::prelude::*;

use abot_core::domain::{ChatId, UserId};

use crate::handlers::send_reply;
use crate::router::AppState;

pub async fn handle_command(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let (Some(user), Some(text)) = (msg.from(), msg.text()) else {
        return Ok(());
    };
    let user_id = UserId(user.id.0 as i64);
    tracing::info!(user = user_id.0, command = %text.split_whitespace().next().unwrap_or(""), "command");

    let reply = state.dispatcher.handle_command(user_id, text).await;
    send_reply(&state, ChatId(msg.chat.id.0), reply).await;
    Ok(())
}
