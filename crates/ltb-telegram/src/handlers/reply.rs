use std::sync::Arc;

use teloxide::prelude::*;
use tracing::debug;

use ltb_core::access::ConnectFlow;

use crate::{restore_spacer, router::AppState};

use super::{chat_of, msg_ref, report_error, requester};

/// Answer to a force-reply question posted by the operator.
pub async fn handle_reply(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat = chat_of(&msg);
    let Some(user) = requester(msg.from()) else {
        return Ok(());
    };
    let (Some(question), Some(answer)) = (msg.reply_to_message(), msg.text()) else {
        return Ok(());
    };

    if let Err(e) = state.owner.check(user, ConnectFlow::Denied) {
        report_error(&state, chat, "reply", &e).await;
        return Ok(());
    }

    let question_text = restore_spacer(question.text().unwrap_or_default());
    match state
        .operator
        .apply_reply(chat, msg_ref(question), &question_text, msg_ref(&msg), answer)
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => debug!(chat_id = chat.0, "reply to an unrecognized message"),
        Err(e) => report_error(&state, chat, "reply", &e).await,
    }
    Ok(())
}
