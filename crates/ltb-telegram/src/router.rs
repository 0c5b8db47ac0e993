use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ltb_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use ltb_core::{
    access::OwnerSession,
    config::Config,
    domain::ChatId,
    formatting::split_lines,
    lightning::Nodes,
    messaging::port::MessagingPort,
    notifier::Notifier,
    operator::{Operator, OperatorSettings},
    Result,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub owner: Arc<OwnerSession>,
    pub messenger: Arc<dyn MessagingPort>,
    pub operator: Arc<Operator>,
    /// Cancelled by the stop button; ends polling and the notifier.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn nodes(&self) -> &Nodes {
        self.operator.nodes()
    }

    /// Send HTML that may exceed one Telegram message, split on line boundaries.
    pub async fn send_long_html(&self, chat: ChatId, html: &str) -> Result<()> {
        for chunk in split_lines(html, self.cfg.telegram_safe_limit) {
            self.messenger.send_html(chat, &chunk).await?;
        }
        Ok(())
    }
}

pub async fn run_polling(
    cfg: Arc<Config>,
    nodes: Nodes,
    owner: Arc<OwnerSession>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!(bot = %me.username(), nodes = nodes.len(), "bot started"),
        Err(e) => warn!(error = %e, "get_me failed"),
    }

    // Notification bursts go through the same throttle as replies; 429s are
    // still retried inside the Telegram adapter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let operator = Arc::new(Operator::new(
        nodes.clone(),
        messenger.clone(),
        OperatorSettings {
            invoice_expiry_secs: cfg.invoice_expiry_secs,
            trade_expiry_hours: cfg.trade_expiry_hours,
        },
    ));

    let shutdown = CancellationToken::new();

    let notifier = if cfg.notify_enabled {
        let n = Notifier::new(nodes, messenger.clone(), owner.clone(), cfg.notify_interval);
        Some(tokio::spawn(n.run(shutdown.child_token())))
    } else {
        None
    };

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        owner,
        messenger,
        operator,
        shutdown: shutdown.clone(),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build();

    let token = dispatcher.shutdown_token();
    let stop = shutdown.clone();
    tokio::spawn(async move {
        stop.cancelled().await;
        info!("stop requested");
        if let Ok(done) = token.shutdown() {
            done.await;
        }
    });

    dispatcher.dispatch().await;

    shutdown.cancel();
    if let Some(task) = notifier {
        let _ = task.await;
    }
    info!("bot stopped");
    Ok(())
}
