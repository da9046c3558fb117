use async_trait::async_trait;

use crate::{
    domain::ChatId,
    messaging::types::{Document, InlineKeyboard},
    Result,
};

/// Messaging port used by the background report and by reply delivery.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()>;

    async fn send_document(&self, chat_id: ChatId, document: Document) -> Result<()>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
