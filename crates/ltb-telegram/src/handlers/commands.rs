use std::sync::Arc;

use teloxide::prelude::*;
use tracing::info;

use ltb_core::{
    access::ConnectOutcome,
    dispatch::{dispatch_command, help_text, ButtonKind, Command, Dispatch},
    domain::{ChatId, UserId},
    messaging::types::InlineKeyboard,
    operator::{parse_invoice_args, parse_trade_args},
    reports, Result,
};

use crate::router::AppState;

use super::{chat_of, report_error, requester, send_or_warn};

pub async fn handle_command(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat = chat_of(&msg);
    let Some(user) = requester(msg.from()) else {
        return Ok(());
    };
    let text = msg.text().unwrap_or_default();

    let (command, arg) = match dispatch_command(&state.owner, user, text) {
        Ok(Dispatch::Handle(found)) => found,
        Ok(Dispatch::Unknown) => {
            send_or_warn(
                state.messenger.as_ref(),
                chat,
                "Unknown command. Send /help for the list.",
            )
            .await;
            return Ok(());
        }
        Err(e) => {
            report_error(&state, chat, "command", &e).await;
            return Ok(());
        }
    };

    info!(command = command.name(), chat_id = chat.0, "command");
    if let Err(e) = run_command(&state, chat, user, command, &arg).await {
        report_error(&state, chat, command.name(), &e).await;
    }
    Ok(())
}

async fn run_command(
    state: &AppState,
    chat: ChatId,
    user: UserId,
    command: Command,
    arg: &str,
) -> Result<()> {
    match command {
        Command::Start | Command::Help => {
            state.messenger.send_html(chat, &help_text()).await?;
        }
        Command::Connect => {
            let text = match state.owner.connect(user, arg)? {
                ConnectOutcome::Connected(_) => {
                    info!(user_id = user.0, "owner connected");
                    "✅ Connected. This chat now controls the node."
                }
                ConnectOutcome::AlreadyConnected => "Already connected.",
            };
            state.messenger.send_html(chat, text).await?;
        }
        Command::Info => {
            let report = reports::info_report(state.nodes()).await;
            state.send_long_html(chat, &report).await?;
        }
        Command::Invoice => {
            let (tokens, description) = parse_invoice_args(arg);
            state
                .operator
                .create_invoice(chat, tokens, &description)
                .await?;
        }
        Command::Balance => {
            let report = reports::balance_report(state.nodes()).await;
            state.send_long_html(chat, &report).await?;
        }
        Command::Liquidity => {
            let report = reports::liquidity_report(state.nodes(), arg).await;
            state.send_long_html(chat, &report).await?;
        }
        Command::Graph => {
            let report = reports::graph_report(state.nodes(), arg).await?;
            state.send_long_html(chat, &report).await?;
        }
        Command::Pending => {
            let report = reports::pending_report(state.nodes()).await;
            state.send_long_html(chat, &report).await?;
        }
        Command::Trade => {
            let (price, description) = parse_trade_args(arg)?;
            state.operator.create_trade(chat, price, &description).await?;
        }
        Command::BlockNumber => {
            let report = reports::block_report(state.nodes()).await;
            state.send_long_html(chat, &report).await?;
        }
        Command::Backup => {
            if state.operator.send_backups(chat).await? == 0 {
                state
                    .messenger
                    .send_html(chat, "No channel backup could be fetched.")
                    .await?;
            }
        }
        Command::Version => {
            state
                .messenger
                .send_html(chat, &reports::version_text())
                .await?;
        }
        Command::Stop => {
            let keyboard = InlineKeyboard::new(vec![vec![
                ButtonKind::StopBot.button("🛑 Stop the bot"),
                ButtonKind::RemoveMessage.button("Keep running"),
            ]]);
            state
                .messenger
                .send_inline_keyboard(chat, "Stop the bot process?", keyboard)
                .await?;
        }
    }
    Ok(())
}
