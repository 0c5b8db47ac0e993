//! Telegram update handlers.
//!
//! Each handler runs the access gate through the core dispatch tables, calls the
//! operator or a report, and turns any error into a short chat reply.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};
use tracing::{debug, warn};

use ltb_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::port::MessagingPort,
};

use crate::router::AppState;

mod callback;
mod commands;
mod reply;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    if text.starts_with('/') {
        return commands::handle_command(bot, msg, state).await;
    }

    if msg.reply_to_message().is_some() {
        return reply::handle_reply(bot, msg, state).await;
    }

    // Free text that answers nothing is ignored.
    Ok(())
}

pub(crate) fn requester(user: Option<&teloxide::types::User>) -> Option<UserId> {
    user.map(|u| UserId(u.id.0 as i64))
}

pub(crate) fn chat_of(msg: &Message) -> ChatId {
    ChatId(msg.chat.id.0)
}

pub(crate) fn msg_ref(msg: &Message) -> MessageRef {
    MessageRef {
        chat_id: chat_of(msg),
        message_id: MessageId(msg.id.0),
    }
}

/// Report a failed operation to the chat.
///
/// Gate failures are expected noise from strangers and only logged at debug.
pub(crate) async fn report_error(state: &AppState, chat: ChatId, context: &str, err: &Error) {
    match err {
        Error::Unauthorized | Error::MissingOwner => {
            debug!(chat_id = chat.0, context, error = %err, "access denied")
        }
        Error::Validation(_) | Error::NotFound(_) => {
            debug!(chat_id = chat.0, context, error = %err, "request rejected")
        }
        _ => warn!(chat_id = chat.0, context, error = %err, "request failed"),
    }
    let text = ltb_core::formatting::escape_html(&err.user_message());
    send_or_warn(state.messenger.as_ref(), chat, &text).await;
}

/// Best-effort reply; a failed send is logged and otherwise dropped.
pub(crate) async fn send_or_warn(messenger: &dyn MessagingPort, chat: ChatId, html: &str) -> bool {
    match messenger.send_html(chat, html).await {
        Ok(_) => true,
        Err(e) => {
            warn!(chat_id = chat.0, error = %e, "failed to send reply");
            false
        }
    }
}
