use std::sync::Arc;

use teloxide::prelude::*;

use abot_core::domain::{ChatId, UserId};

use crate::handlers::send_reply;
use crate::router::AppState;

pub async fn handle_text(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let (Some(user), Some(text)) = (msg.from(), msg.text()) else {
        return Ok(());
    };
    let text = text.trim();
    if text.is_empty() {
        return Ok(());
    }

    let reply = state
        .dispatcher
        .handle_text(UserId(user.id.0 as i64), text)
        .await;
    send_reply(&state, ChatId(msg.chat.id.0), reply).await;
    Ok(())
}
