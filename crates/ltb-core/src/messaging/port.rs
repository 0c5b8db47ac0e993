use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::InlineKeyboard,
    Result,
};

/// Outbound chat port.
///
/// Telegram is the only implementation; handlers and the operator service talk
/// to the chat exclusively through this trait so they can run against fakes.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    /// Send a message that asks the client to open a reply to it.
    async fn send_force_reply(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()>;
    async fn edit_keyboard(&self, msg: MessageRef, keyboard: InlineKeyboard) -> Result<()>;
    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    async fn send_document(
        &self,
        chat_id: ChatId,
        file_name: &str,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<MessageRef>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
