use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{debug, info, warn};

use ltb_core::{
    dispatch::{dispatch_button, ButtonKind, ButtonPress, Dispatch},
    errors::Error,
    Result,
};

use crate::{restore_spacer, router::AppState};

use super::{chat_of, msg_ref, requester};

pub async fn handle_callback(
    _bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let data = q.data.clone().unwrap_or_default();
    let Some(user) = requester(Some(&q.from)) else {
        return Ok(());
    };

    let press = match dispatch_button(&state.owner, user, &data) {
        Ok(Dispatch::Handle(press)) => press,
        Ok(Dispatch::Unknown) => {
            debug!(data = %data, "unsupported button");
            answer(&state, &cb_id, Some("Unsupported button")).await;
            return Ok(());
        }
        Err(e) => {
            debug!(user_id = user.0, error = %e, "button denied");
            answer(&state, &cb_id, Some(&e.user_message())).await;
            return Ok(());
        }
    };

    let Some(message) = q.message.as_ref() else {
        answer(&state, &cb_id, Some("This message is no longer available.")).await;
        return Ok(());
    };

    info!(button = press.kind.data_prefix(), chat_id = message.chat.id.0, "button");
    match run_button(&state, message, &press).await {
        Ok(()) => answer(&state, &cb_id, None).await,
        Err(e) => {
            match &e {
                Error::Validation(_) | Error::NotFound(_) => debug!(error = %e, "button rejected"),
                _ => warn!(error = %e, "button failed"),
            }
            answer(&state, &cb_id, Some(&e.user_message())).await;
        }
    }
    Ok(())
}

async fn run_button(state: &AppState, message: &Message, press: &ButtonPress) -> Result<()> {
    let chat = chat_of(message);
    let target = msg_ref(message);
    let text = restore_spacer(message.text().unwrap_or_default());
    let op = &state.operator;

    match press.kind {
        ButtonKind::RemoveMessage => op.remove_message(target).await,
        ButtonKind::CancelInvoice => op.cancel_invoice(target, &text).await,
        ButtonKind::SetInvoiceNode => op.offer_invoice_nodes(target, &text).await,
        ButtonKind::MoveInvoiceNodeTo => op
            .move_invoice(chat, target, &text, &press.arg)
            .await
            .map(|_| ()),
        ButtonKind::CancelTrade => op.cancel_trade(target, &text).await,
        kind @ (ButtonKind::SetInvoiceDescription
        | ButtonKind::SetInvoiceTokens
        | ButtonKind::SetTradeDescription
        | ButtonKind::SetTradeExpiry) => op.ask(chat, target, &text, kind).await.map(|_| ()),
        ButtonKind::StopBot => {
            state.messenger.edit_html(target, "🛑 Stopping.").await?;
            state.shutdown.cancel();
            Ok(())
        }
    }
}

async fn answer(state: &AppState, cb_id: &str, text: Option<&str>) {
    if let Err(e) = state.messenger.answer_callback_query(cb_id, text).await {
        warn!(error = %e, "failed to answer callback query");
    }
}
