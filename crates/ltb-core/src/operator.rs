//! Operator service: the edit flows behind commands, buttons and replies.
//!
//! All pending state lives in the chat. Every operation re-reads the encoded
//! message, then re-reads the live invoice or trade from the node, so a stale
//! message fails with `NotFound` instead of acting on old data.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    classifier::{classify_message, Action, Target},
    codec::{
        decode, encode, EncodedMessage, InvoiceShape, Recognized, TradeShape,
        INVOICE_TITLE_PREFIX, PROMPT_DESCRIPTION, PROMPT_EXPIRY, PROMPT_TOKENS,
        TRADE_TITLE_PREFIX,
    },
    dispatch::{move_invoice_button, ButtonKind},
    domain::{ChatId, MessageRef},
    errors::Error,
    formatting::{escape_html, format_tokens, parse_expiry_hours, parse_tokens},
    lightning::{CreateInvoice, Invoice, NodeHandle, Nodes, PaymentRequest},
    messaging::{
        port::MessagingPort,
        types::{InlineButton, InlineKeyboard},
    },
    trades::{
        cancel_anchored_trade, create_anchored_trade, encode_trade, get_anchored_trade,
        AnchoredTrade, CreateTrade, TradeDescriptor,
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct OperatorSettings {
    pub invoice_expiry_secs: u64,
    pub trade_expiry_hours: u32,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            invoice_expiry_secs: 86_400,
            trade_expiry_hours: 24,
        }
    }
}

/// Parse `/invoice [amount] [description]`.
pub fn parse_invoice_args(arg: &str) -> (u64, String) {
    let arg = arg.trim();
    let (first, rest) = arg.split_once(char::is_whitespace).unwrap_or((arg, ""));
    match parse_tokens(first) {
        Ok(tokens) if !first.is_empty() => (tokens, rest.trim().to_string()),
        _ => (0, arg.to_string()),
    }
}

/// Parse `/trade price description`.
pub fn parse_trade_args(arg: &str) -> Result<(u64, String)> {
    let usage = || Error::validation("Usage: /trade <price> <description>");
    let (price, description) = arg.trim().split_once(char::is_whitespace).ok_or_else(usage)?;
    let description = description.trim();
    if description.is_empty() {
        return Err(usage());
    }
    Ok((parse_tokens(price)?, description.to_string()))
}

pub fn invoice_title(tokens: u64, description: &str) -> String {
    let amount = if tokens == 0 {
        "any amount".to_string()
    } else {
        format_tokens(tokens)
    };
    if description.trim().is_empty() {
        format!("{INVOICE_TITLE_PREFIX}{amount}")
    } else {
        format!("{INVOICE_TITLE_PREFIX}{amount} · {}", description.trim())
    }
}

pub fn trade_title(trade: &AnchoredTrade) -> String {
    let expires = chrono::DateTime::from_timestamp(trade.expires_at, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "{TRADE_TITLE_PREFIX}{} · {} · expires {expires}",
        trade.description.trim(),
        format_tokens(trade.price),
    )
}

pub struct Operator {
    nodes: Nodes,
    messenger: Arc<dyn MessagingPort>,
    settings: OperatorSettings,
}

impl Operator {
    pub fn new(nodes: Nodes, messenger: Arc<dyn MessagingPort>, settings: OperatorSettings) -> Self {
        Self {
            nodes,
            messenger,
            settings,
        }
    }

    pub fn nodes(&self) -> &Nodes {
        &self.nodes
    }

    // ============== Keyboards ==============

    fn invoice_keyboard(&self) -> InlineKeyboard {
        let mut rows = vec![vec![
            ButtonKind::SetInvoiceDescription.button("✏️ Description"),
            ButtonKind::SetInvoiceTokens.button("💰 Amount"),
        ]];
        if self.nodes.len() > 1 {
            rows.push(vec![ButtonKind::SetInvoiceNode.button("🔀 Node")]);
        }
        rows.push(vec![ButtonKind::CancelInvoice.button("❌ Cancel")]);
        InlineKeyboard::new(rows)
    }

    fn trade_keyboard() -> InlineKeyboard {
        InlineKeyboard::new(vec![
            vec![
                ButtonKind::SetTradeDescription.button("✏️ Description"),
                ButtonKind::SetTradeExpiry.button("⏱ Expiry"),
            ],
            vec![ButtonKind::CancelTrade.button("❌ Cancel")],
        ])
    }

    // ============== Invoices ==============

    pub async fn create_invoice(
        &self,
        chat: ChatId,
        tokens: u64,
        description: &str,
    ) -> Result<MessageRef> {
        self.post_invoice(chat, self.nodes.default_node(), tokens, description)
            .await
    }

    async fn post_invoice(
        &self,
        chat: ChatId,
        node: &NodeHandle,
        tokens: u64,
        description: &str,
    ) -> Result<MessageRef> {
        let created = node
            .client
            .create_invoice(CreateInvoice {
                tokens,
                description: description.trim().to_string(),
                expiry_secs: self.settings.invoice_expiry_secs,
            })
            .await?;
        info!(node = %node.name, invoice = %created.id, tokens, "invoice created");

        let msg = EncodedMessage::new(invoice_title(tokens, description), created.request);
        self.messenger
            .send_inline_keyboard(chat, &escape_html(&encode(&msg)), self.invoice_keyboard())
            .await
    }

    fn decode_invoice(&self, text: &str) -> Result<Recognized<PaymentRequest>> {
        decode(text, &InvoiceShape)
            .recognized()
            .ok_or_else(|| Error::validation("This message is not an invoice."))
    }

    async fn live_invoice(&self, pr: &PaymentRequest) -> Result<(&NodeHandle, Invoice)> {
        let node = self
            .nodes
            .by_key(&pr.destination)
            .ok_or_else(|| Error::not_found("The invoice node is not connected."))?;
        let invoice = node
            .client
            .get_invoice(&pr.id)
            .await?
            .filter(Invoice::is_open)
            .ok_or_else(|| Error::not_found("Invoice not found."))?;
        Ok((node, invoice))
    }

    /// Replace an open invoice by a new one, then drop the old one.
    ///
    /// Once the replacement is posted a failed cancel is only logged; the old
    /// invoice then stays open until it expires.
    async fn replace_invoice(
        &self,
        chat: ChatId,
        old_node: &NodeHandle,
        old: &Invoice,
        new_node: &NodeHandle,
        tokens: u64,
        description: &str,
    ) -> Result<MessageRef> {
        let posted = self.post_invoice(chat, new_node, tokens, description).await?;
        if let Err(e) = old_node.client.cancel_invoice(&old.id).await {
            warn!(
                node = %old_node.name,
                invoice = %old.id,
                error = %e,
                "failed to cancel replaced invoice"
            );
        }
        Ok(posted)
    }

    pub async fn cancel_invoice(&self, message: MessageRef, text: &str) -> Result<()> {
        let msg = self.decode_invoice(text)?;
        let (node, invoice) = self.live_invoice(&msg.parsed).await?;
        node.client.cancel_invoice(&invoice.id).await?;
        info!(node = %node.name, invoice = %invoice.id, "invoice canceled");
        self.messenger
            .edit_html(message, &format!("❌ <s>{}</s>", escape_html(&msg.title)))
            .await
    }

    /// Swap the invoice keyboard for one button per other node.
    pub async fn offer_invoice_nodes(&self, message: MessageRef, text: &str) -> Result<()> {
        let msg = self.decode_invoice(text)?;
        let (node, _) = self.live_invoice(&msg.parsed).await?;
        let buttons: Vec<InlineButton> = self
            .nodes
            .others(&node.public_key)
            .map(|n| move_invoice_button(format!("➡️ {}", n.label()), &n.public_key))
            .collect();
        if buttons.is_empty() {
            return Err(Error::validation("There is no other node to move to."));
        }
        self.messenger
            .edit_keyboard(message, InlineKeyboard::one_per_row(buttons))
            .await
    }

    pub async fn move_invoice(
        &self,
        chat: ChatId,
        message: MessageRef,
        text: &str,
        key_prefix: &str,
    ) -> Result<MessageRef> {
        let target = self
            .nodes
            .by_key_prefix(key_prefix)
            .ok_or_else(|| Error::not_found("Target node not found."))?;
        let msg = self.decode_invoice(text)?;
        let (source, invoice) = self.live_invoice(&msg.parsed).await?;
        if source.public_key == target.public_key {
            return Err(Error::validation("The invoice is already on that node."));
        }

        let posted = self
            .replace_invoice(chat, source, &invoice, target, invoice.tokens, &invoice.description)
            .await?;
        info!(from = %source.name, to = %target.name, "invoice moved");
        self.delete_quietly(message).await;
        Ok(posted)
    }

    // ============== Trades ==============

    pub async fn create_trade(
        &self,
        chat: ChatId,
        price: u64,
        description: &str,
    ) -> Result<MessageRef> {
        let node = self.nodes.default_node();
        self.post_trade(chat, node, description, price, self.settings.trade_expiry_hours)
            .await
    }

    async fn post_trade(
        &self,
        chat: ChatId,
        node: &NodeHandle,
        description: &str,
        price: u64,
        expiry_hours: u32,
    ) -> Result<MessageRef> {
        let trade = create_anchored_trade(
            node.client.as_ref(),
            CreateTrade {
                description: description.trim().to_string(),
                price,
                expiry_hours,
            },
        )
        .await?;
        info!(node = %node.name, trade = %trade.id, price, "trade created");

        let payload = encode_trade(&TradeDescriptor {
            id: trade.id.clone(),
            network: node.network.clone(),
            node: node.public_key.clone(),
        })?;
        let msg = EncodedMessage::new(trade_title(&trade), payload);
        self.messenger
            .send_inline_keyboard(chat, &escape_html(&encode(&msg)), Self::trade_keyboard())
            .await
    }

    fn decode_trade_message(&self, text: &str) -> Result<Recognized<TradeDescriptor>> {
        decode(text, &TradeShape)
            .recognized()
            .ok_or_else(|| Error::validation("This message is not a trade."))
    }

    async fn live_trade(&self, d: &TradeDescriptor) -> Result<(&NodeHandle, AnchoredTrade)> {
        let node = self
            .nodes
            .by_key(&d.node)
            .ok_or_else(|| Error::not_found("The trade node is not connected."))?;
        let trade = get_anchored_trade(node.client.as_ref(), &d.id).await?;
        Ok((node, trade))
    }

    pub async fn cancel_trade(&self, message: MessageRef, text: &str) -> Result<()> {
        let msg = self.decode_trade_message(text)?;
        let (node, trade) = self.live_trade(&msg.parsed).await?;
        cancel_anchored_trade(node.client.as_ref(), &trade.id).await?;
        info!(node = %node.name, trade = %trade.id, "trade canceled");
        self.messenger
            .edit_html(message, &format!("❌ <s>{}</s>", escape_html(&msg.title)))
            .await
    }

    // ============== Questions and replies ==============

    /// Re-post an encoded message as a force-reply question and delete the original.
    pub async fn ask(
        &self,
        chat: ChatId,
        message: MessageRef,
        text: &str,
        button: ButtonKind,
    ) -> Result<MessageRef> {
        let question = match button {
            ButtonKind::SetInvoiceDescription | ButtonKind::SetInvoiceTokens => {
                let msg = self.decode_invoice(text)?;
                self.live_invoice(&msg.parsed).await?;
                let prompt = if button == ButtonKind::SetInvoiceTokens {
                    PROMPT_TOKENS
                } else {
                    PROMPT_DESCRIPTION
                };
                msg.reprompt(Some(prompt))
            }
            ButtonKind::SetTradeDescription | ButtonKind::SetTradeExpiry => {
                let msg = self.decode_trade_message(text)?;
                self.live_trade(&msg.parsed).await?;
                let prompt = if button == ButtonKind::SetTradeExpiry {
                    PROMPT_EXPIRY
                } else {
                    PROMPT_DESCRIPTION
                };
                msg.reprompt(Some(prompt))
            }
            other => {
                return Err(Error::validation(format!(
                    "{} does not ask a question.",
                    other.data_prefix()
                )))
            }
        };

        let posted = self
            .messenger
            .send_force_reply(chat, &escape_html(&encode(&question)))
            .await?;
        self.delete_quietly(message).await;
        Ok(posted)
    }

    /// Apply a reply to a question message.
    ///
    /// Returns `Ok(None)` when the replied-to message is not a question this bot
    /// understands. Input is validated before any node call.
    pub async fn apply_reply(
        &self,
        chat: ChatId,
        question: MessageRef,
        question_text: &str,
        reply: MessageRef,
        reply_text: &str,
    ) -> Result<Option<MessageRef>> {
        let Some(classified) = classify_message(question_text, &self.nodes.public_keys()) else {
            return Ok(None);
        };
        let answer = reply_text.trim();

        let posted = match (classified.action, classified.target) {
            (Action::None, _) => return Ok(None),
            (Action::SetInvoiceDescription, Target::Invoice(msg)) => {
                let (node, invoice) = self.live_invoice(&msg.parsed).await?;
                self.replace_invoice(chat, node, &invoice, node, invoice.tokens, answer)
                    .await?
            }
            (Action::SetInvoiceTokens, Target::Invoice(msg)) => {
                let tokens = parse_tokens(answer)?;
                let (node, invoice) = self.live_invoice(&msg.parsed).await?;
                self.replace_invoice(chat, node, &invoice, node, tokens, &invoice.description)
                    .await?
            }
            (Action::SetTradeDescription, Target::Trade(msg)) => {
                if answer.is_empty() {
                    return Err(Error::validation("A trade needs a description."));
                }
                let (node, trade) = self.live_trade(&msg.parsed).await?;
                let hours = remaining_hours(&trade, chrono::Utc::now().timestamp());
                self.replace_trade(chat, node, &trade, answer, hours).await?
            }
            (Action::SetTradeExpiry, Target::Trade(msg)) => {
                let hours = parse_expiry_hours(answer)?;
                let (node, trade) = self.live_trade(&msg.parsed).await?;
                let description = trade.description.clone();
                self.replace_trade(chat, node, &trade, &description, hours)
                    .await?
            }
            (action, _) => {
                warn!(action = action.as_str(), "action does not match its message");
                return Ok(None);
            }
        };

        info!(action = classified.action.as_str(), "reply applied");
        self.delete_quietly(question).await;
        self.delete_quietly(reply).await;
        Ok(Some(posted))
    }

    async fn replace_trade(
        &self,
        chat: ChatId,
        node: &NodeHandle,
        old: &AnchoredTrade,
        description: &str,
        expiry_hours: u32,
    ) -> Result<MessageRef> {
        let posted = self
            .post_trade(chat, node, description, old.price, expiry_hours)
            .await?;
        if let Err(e) = cancel_anchored_trade(node.client.as_ref(), &old.id).await {
            warn!(
                node = %node.name,
                trade = %old.id,
                error = %e,
                "failed to cancel replaced trade"
            );
        }
        Ok(posted)
    }

    // ============== Misc ==============

    pub async fn remove_message(&self, message: MessageRef) -> Result<()> {
        self.messenger.delete_message(message).await
    }

    /// Send every node's multi-channel backup as a document.
    pub async fn send_backups(&self, chat: ChatId) -> Result<usize> {
        let mut sent = 0;
        for node in self.nodes.all() {
            let bytes = match node.client.get_channel_backup().await {
                Ok(b) => b,
                Err(e) => {
                    warn!(node = %node.name, error = %e, "channel backup failed");
                    self.messenger
                        .send_html(
                            chat,
                            &format!(
                                "⚠️ Backup of <b>{}</b> failed: {}",
                                escape_html(node.label()),
                                escape_html(&e.to_string())
                            ),
                        )
                        .await?;
                    continue;
                }
            };
            let file_name = format!("{}-channels.backup", node.name);
            let caption = format!("Channel backup for {}", node.label());
            self.messenger
                .send_document(chat, &file_name, bytes, Some(&caption))
                .await?;
            sent += 1;
        }
        Ok(sent)
    }

    async fn delete_quietly(&self, message: MessageRef) {
        if let Err(e) = self.messenger.delete_message(message).await {
            warn!(message_id = message.message_id.0, error = %e, "failed to delete message");
        }
    }
}

/// Whole hours left on a trade, rounded down so an edit never extends it.
/// At least one.
fn remaining_hours(trade: &AnchoredTrade, now: i64) -> u32 {
    let left = (trade.expires_at - now).max(0) / 3600;
    u32::try_from(left).unwrap_or(u32::MAX).max(1)
}
