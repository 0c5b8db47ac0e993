//! Node event notifications.
//!
//! Polls every node on a fixed interval and posts what changed since the last
//! poll: channels opened or closed, invoices received, payments forwarded. The
//! first poll of a node only records a baseline.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    access::OwnerSession,
    dispatch::ButtonKind,
    domain::ChatId,
    formatting::{escape_html, format_tokens, short_key},
    lightning::{Channel, Forward, NodeHandle, Nodes},
    messaging::{port::MessagingPort, types::InlineKeyboard},
    Result,
};

#[derive(Debug, Default)]
struct Cursor {
    channels: Option<HashMap<String, Channel>>,
    settle_index: Option<u64>,
    forwards_since: Option<i64>,
    /// Forwards already posted whose timestamp equals `forwards_since`.
    forwards_seen: HashSet<Forward>,
}

pub struct Notifier {
    nodes: Nodes,
    messenger: Arc<dyn MessagingPort>,
    owner: Arc<OwnerSession>,
    interval: Duration,
    cursors: Vec<Cursor>,
}

impl Notifier {
    pub fn new(
        nodes: Nodes,
        messenger: Arc<dyn MessagingPort>,
        owner: Arc<OwnerSession>,
        interval: Duration,
    ) -> Self {
        let cursors = nodes.all().iter().map(|_| Cursor::default()).collect();
        Self {
            nodes,
            messenger,
            owner,
            interval,
            cursors,
        }
    }

    /// Poll until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "notifier started");
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    let posted = self.poll_once().await;
                    if posted > 0 {
                        info!(posted, "notifications posted");
                    }
                }
            }
        }
        info!("notifier stopped");
    }

    /// Poll every node once and post the resulting events. Returns the number
    /// of notifications posted.
    pub async fn poll_once(&mut self) -> usize {
        let mut events = Vec::new();
        let multi = self.nodes.len() > 1;
        for (node, cursor) in self.nodes.all().iter().zip(self.cursors.iter_mut()) {
            for event in poll_node(node, cursor).await {
                events.push(if multi {
                    format!("<b>{}</b>: {event}", escape_html(node.label()))
                } else {
                    event
                });
            }
        }

        // Events seen before pairing are dropped; the cursors still advance.
        let Some(owner) = self.owner.owner() else {
            return 0;
        };
        let chat = ChatId::from(owner);
        let mut posted = 0;
        for event in events {
            match self.post(chat, &event).await {
                Ok(()) => posted += 1,
                Err(e) => warn!(error = %e, "failed to post notification"),
            }
        }
        posted
    }

    async fn post(&self, chat: ChatId, html: &str) -> Result<()> {
        let keyboard =
            InlineKeyboard::one_per_row(vec![ButtonKind::RemoveMessage.button("🗑 Dismiss")]);
        self.messenger
            .send_inline_keyboard(chat, html, keyboard)
            .await
            .map(|_| ())
    }
}

async fn poll_node(node: &NodeHandle, cursor: &mut Cursor) -> Vec<String> {
    let mut events = Vec::new();

    match node.client.get_channels().await {
        Ok(channels) => {
            let current: HashMap<String, Channel> =
                channels.into_iter().map(|c| (c.id.clone(), c)).collect();
            if let Some(previous) = cursor.channels.as_ref() {
                events.extend(channel_events(previous, &current));
            }
            cursor.channels = Some(current);
        }
        Err(e) => warn!(node = %node.name, error = %e, "channel poll failed"),
    }

    let after_index = cursor.settle_index.unwrap_or(0);
    match node.client.get_settled_invoices(after_index).await {
        Ok(settled) => {
            let max = settled.iter().map(|s| s.settle_index).max();
            if cursor.settle_index.is_some() {
                for s in &settled {
                    let memo = if s.description.is_empty() {
                        String::new()
                    } else {
                        format!(" for <i>{}</i>", escape_html(&s.description))
                    };
                    events.push(format!("💵 Received {}{memo}", format_tokens(s.received)));
                }
            }
            cursor.settle_index = Some(max.unwrap_or(after_index).max(after_index));
        }
        Err(e) => warn!(node = %node.name, error = %e, "invoice poll failed"),
    }

    match cursor.forwards_since {
        None => cursor.forwards_since = Some(chrono::Utc::now().timestamp()),
        Some(since) => match node.client.get_forwards(since).await {
            Ok(forwards) => {
                let fresh: Vec<Forward> = forwards
                    .into_iter()
                    .filter(|f| !cursor.forwards_seen.contains(f))
                    .collect();
                for f in &fresh {
                    events.push(format!(
                        "💸 Forwarded {}, earned {} msat",
                        format_tokens(f.tokens),
                        f.fee_mtokens
                    ));
                }
                if let Some(latest) = fresh.iter().map(|f| f.at).max().filter(|l| *l > since) {
                    cursor.forwards_since = Some(latest);
                    cursor.forwards_seen.clear();
                }
                let boundary = cursor.forwards_since.unwrap_or(since);
                cursor
                    .forwards_seen
                    .extend(fresh.into_iter().filter(|f| f.at == boundary));
            }
            Err(e) => warn!(node = %node.name, error = %e, "forward poll failed"),
        },
    }

    events
}

fn channel_events(
    previous: &HashMap<String, Channel>,
    current: &HashMap<String, Channel>,
) -> Vec<String> {
    let before: HashSet<&String> = previous.keys().collect();
    let after: HashSet<&String> = current.keys().collect();

    let mut opened: Vec<&Channel> = after.difference(&before).map(|id| &current[*id]).collect();
    let mut closed: Vec<&Channel> = before.difference(&after).map(|id| &previous[*id]).collect();
    opened.sort_by(|a, b| a.id.cmp(&b.id));
    closed.sort_by(|a, b| a.id.cmp(&b.id));

    let opened = opened.into_iter().map(|c| {
        format!(
            "🌱 Channel opened with <code>{}</code> ({})",
            short_key(&c.partner_public_key),
            format_tokens(c.capacity)
        )
    });
    let closed = closed.into_iter().map(|c| {
        format!(
            "🥀 Channel closed with <code>{}</code> ({})",
            short_key(&c.partner_public_key),
            format_tokens(c.capacity)
        )
    });
    opened.chain(closed).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::UserId,
        lightning::{Forward, SettledInvoice},
        testing::{handle, key_for, FakeMessenger, FakeNode},
    };

    fn channel(id: &str, partner: u8) -> Channel {
        Channel {
            id: id.to_string(),
            partner_public_key: key_for(partner),
            capacity: 100_000,
            local_balance: 50_000,
            remote_balance: 50_000,
            is_active: true,
        }
    }

    fn setup(owner: Option<UserId>) -> (Arc<FakeNode>, Arc<FakeMessenger>, Notifier) {
        let node = FakeNode::new(1);
        let nodes = Nodes::new(vec![handle("a", node.clone())]).unwrap();
        let chat = FakeMessenger::new();
        let session = Arc::new(OwnerSession::new(owner, None));
        let notifier = Notifier::new(nodes, chat.clone(), session, Duration::from_secs(30));
        (node, chat, notifier)
    }

    #[tokio::test]
    async fn first_poll_is_a_baseline() {
        let (node, chat, mut notifier) = setup(Some(UserId(9)));
        node.set(|s| {
            s.channels = vec![channel("c1", 5)];
            s.settled = vec![SettledInvoice {
                id: crate::domain::PaymentHash::parse(&"11".repeat(32)).unwrap(),
                description: "old".to_string(),
                received: 10,
                settle_index: 3,
            }];
        });
        assert_eq!(notifier.poll_once().await, 0);
        assert!(chat.sent().is_empty());
    }

    #[tokio::test]
    async fn reports_changes_since_last_poll() {
        let (node, chat, mut notifier) = setup(Some(UserId(9)));
        node.set(|s| s.channels = vec![channel("c1", 5)]);
        notifier.poll_once().await;

        node.set(|s| {
            s.channels = vec![channel("c2", 6)];
            s.settled = vec![SettledInvoice {
                id: crate::domain::PaymentHash::parse(&"22".repeat(32)).unwrap(),
                description: "coffee".to_string(),
                received: 2_500,
                settle_index: 1,
            }];
            s.forwards = vec![Forward {
                at: i64::MAX - 1,
                incoming_channel: "c2".to_string(),
                outgoing_channel: "c3".to_string(),
                tokens: 1_000,
                fee_mtokens: 1_500,
            }];
        });

        assert_eq!(notifier.poll_once().await, 4);
        let texts: Vec<String> = chat.sent().into_iter().map(|s| s.html).collect();
        assert!(texts[0].starts_with("🌱 Channel opened"));
        assert!(texts[1].starts_with("🥀 Channel closed"));
        assert!(texts[2].contains("0.00002500 for <i>coffee</i>"));
        assert!(texts[3].contains("earned 1500 msat"));
        assert!(chat.sent().iter().all(|s| s.msg.chat_id == ChatId(9)));

        // Nothing new on the next poll.
        assert_eq!(notifier.poll_once().await, 0);
    }

    #[tokio::test]
    async fn forwards_in_the_same_second_are_each_posted_once() {
        let (node, chat, mut notifier) = setup(Some(UserId(9)));
        notifier.poll_once().await;

        let at = i64::MAX - 10;
        let forward = |fee: u64| Forward {
            at,
            incoming_channel: "c1".to_string(),
            outgoing_channel: "c2".to_string(),
            tokens: 100,
            fee_mtokens: fee,
        };
        node.set(|s| s.forwards = vec![forward(1)]);
        assert_eq!(notifier.poll_once().await, 1);

        // A second forward lands in the same second after the poll.
        node.set(|s| s.forwards.push(forward(2)));
        assert_eq!(notifier.poll_once().await, 1);
        assert!(chat.last().html.contains("earned 2 msat"));

        assert_eq!(notifier.poll_once().await, 0);
    }

    #[tokio::test]
    async fn unpaired_bot_posts_nothing() {
        let (node, chat, mut notifier) = setup(None);
        notifier.poll_once().await;
        node.set(|s| s.channels = vec![channel("c1", 5)]);
        assert_eq!(notifier.poll_once().await, 0);
        assert!(chat.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_cancel() {
        let (_node, _chat, notifier) = setup(None);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(notifier.run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(95)).await;
        cancel.cancel();
        task.await.unwrap();
    }
}
