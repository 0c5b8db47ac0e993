//! Shared fakes for unit tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bitcoin::{
    hashes::{sha256, Hash},
    hex::FromHex,
    secp256k1::{PublicKey, Secp256k1, SecretKey},
};
use lightning_invoice::{Currency, InvoiceBuilder, PaymentSecret};

use crate::{
    domain::{ChatId, MessageId, MessageRef, NodeId, PaymentHash},
    errors::Error,
    lightning::{
        Balances, Channel, CreateHodlInvoice, CreateInvoice, CreatedInvoice, Forward, GraphNode,
        Invoice, InvoiceState, LightningNode, NodeHandle, NodeInfo, PendingChannel,
        SettledInvoice,
    },
    messaging::{
        port::MessagingPort,
        types::InlineKeyboard,
    },
    trades::{encode_trade, TradeDescriptor},
    Result,
};

pub(crate) fn secret(b: u8) -> SecretKey {
    SecretKey::from_slice(&[b; 32]).unwrap()
}

pub(crate) fn key_for(b: u8) -> NodeId {
    let pk = PublicKey::from_secret_key(&Secp256k1::new(), &secret(b));
    NodeId::parse(&pk.to_string()).unwrap()
}

/// A signed mainnet BOLT11 request from node `b` with the given hash and amount.
pub(crate) fn sample_request(b: u8, hash: [u8; 32], msat: u64) -> String {
    request_with(b, hash, msat, "test")
}

pub(crate) fn request_with(b: u8, hash: [u8; 32], msat: u64, description: &str) -> String {
    let builder = InvoiceBuilder::new(Currency::Bitcoin)
        .description(description.to_string())
        .payment_hash(sha256::Hash::from_byte_array(hash))
        .payment_secret(PaymentSecret([42u8; 32]))
        .current_timestamp()
        .min_final_cltv_expiry_delta(144);
    let builder = if msat > 0 {
        builder.amount_milli_satoshis(msat)
    } else {
        builder
    };
    builder
        .build_signed(|m| Secp256k1::new().sign_ecdsa_recoverable(m, &secret(b)))
        .unwrap()
        .to_string()
}

pub(crate) fn sample_trade(b: u8, id: [u8; 32]) -> String {
    encode_trade(&TradeDescriptor {
        id: PaymentHash::parse(&hex32(id)).unwrap(),
        network: "mainnet".to_string(),
        node: key_for(b),
    })
    .unwrap()
}

fn hex32(bytes: [u8; 32]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub(crate) fn handle(name: &str, node: Arc<FakeNode>) -> NodeHandle {
    NodeHandle {
        name: name.to_string(),
        public_key: node.key.clone(),
        alias: "fake".to_string(),
        network: "mainnet".to_string(),
        client: node,
    }
}

// ============== Fake node ==============

#[derive(Default)]
pub(crate) struct FakeNodeState {
    pub invoices: Vec<Invoice>,
    pub channels: Vec<Channel>,
    pub pending: Vec<PendingChannel>,
    pub graph: HashMap<NodeId, GraphNode>,
    pub balances: Balances,
    pub settled: Vec<SettledInvoice>,
    pub forwards: Vec<Forward>,
    pub backup: Vec<u8>,
    /// When set, every call fails with an upstream error.
    pub fail: Option<String>,
    /// When set, only invoice cancellation fails.
    pub fail_cancel: bool,
    pub canceled: Vec<PaymentHash>,
    next_hash: u8,
}

pub(crate) struct FakeNode {
    pub key: NodeId,
    secret_byte: u8,
    pub state: Mutex<FakeNodeState>,
}

impl FakeNode {
    pub(crate) fn new(secret_byte: u8) -> Arc<Self> {
        Arc::new(Self {
            key: key_for(secret_byte),
            secret_byte,
            state: Mutex::new(FakeNodeState {
                next_hash: 1,
                backup: vec![secret_byte; 4],
                ..Default::default()
            }),
        })
    }

    pub(crate) fn set(&self, f: impl FnOnce(&mut FakeNodeState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub(crate) fn invoices(&self) -> Vec<Invoice> {
        self.state.lock().unwrap().invoices.clone()
    }

    pub(crate) fn open_invoices(&self) -> Vec<Invoice> {
        self.invoices().into_iter().filter(Invoice::is_open).collect()
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, FakeNodeState>> {
        let st = self.state.lock().unwrap();
        if let Some(msg) = st.fail.clone() {
            return Err(Error::upstream(14, msg));
        }
        Ok(st)
    }

    fn store(
        &self,
        st: &mut FakeNodeState,
        hash: [u8; 32],
        tokens: u64,
        description: &str,
        expiry_secs: u64,
    ) -> CreatedInvoice {
        let request = request_with(self.secret_byte, hash, tokens * 1000, description);
        let id = PaymentHash::parse(&hex32(hash)).unwrap();
        st.invoices.push(Invoice {
            id: id.clone(),
            request: request.clone(),
            description: description.to_string(),
            tokens,
            state: InvoiceState::Open,
            created_at: chrono::Utc::now().timestamp(),
            expiry_secs,
        });
        CreatedInvoice { id, request }
    }
}

#[async_trait]
impl LightningNode for FakeNode {
    async fn get_info(&self) -> Result<NodeInfo> {
        let st = self.guard()?;
        Ok(NodeInfo {
            public_key: self.key.clone(),
            alias: "fake".to_string(),
            block_height: 800_000,
            synced_to_chain: true,
            active_channels: st.channels.iter().filter(|c| c.is_active).count() as u32,
            pending_channels: st.pending.len() as u32,
            peers: 2,
            version: "0.18.0-beta".to_string(),
            network: "mainnet".to_string(),
        })
    }

    async fn create_invoice(&self, req: CreateInvoice) -> Result<CreatedInvoice> {
        let mut st = self.guard()?;
        let hash = [st.next_hash; 32];
        st.next_hash = st.next_hash.wrapping_add(1);
        Ok(self.store(&mut st, hash, req.tokens, &req.description, req.expiry_secs))
    }

    async fn create_hodl_invoice(&self, req: CreateHodlInvoice) -> Result<CreatedInvoice> {
        let mut st = self.guard()?;
        let bytes = Vec::<u8>::from_hex(req.id.as_str()).unwrap();
        let hash: [u8; 32] = bytes.try_into().unwrap();
        Ok(self.store(&mut st, hash, req.tokens, &req.description, req.expiry_secs))
    }

    async fn get_invoice(&self, id: &PaymentHash) -> Result<Option<Invoice>> {
        let st = self.guard()?;
        Ok(st.invoices.iter().find(|i| &i.id == id).cloned())
    }

    async fn cancel_invoice(&self, id: &PaymentHash) -> Result<()> {
        let mut st = self.guard()?;
        if st.fail_cancel {
            return Err(Error::upstream(14, "cancel unavailable"));
        }
        let Some(inv) = st.invoices.iter_mut().find(|i| &i.id == id) else {
            return Err(Error::upstream(5, "unable to locate invoice"));
        };
        inv.state = InvoiceState::Canceled;
        st.canceled.push(id.clone());
        Ok(())
    }

    async fn get_balances(&self) -> Result<Balances> {
        Ok(self.guard()?.balances)
    }

    async fn get_channels(&self) -> Result<Vec<Channel>> {
        Ok(self.guard()?.channels.clone())
    }

    async fn get_pending(&self) -> Result<Vec<PendingChannel>> {
        Ok(self.guard()?.pending.clone())
    }

    async fn get_graph_node(&self, key: &NodeId) -> Result<Option<GraphNode>> {
        Ok(self.guard()?.graph.get(key).cloned())
    }

    async fn get_settled_invoices(&self, after_index: u64) -> Result<Vec<SettledInvoice>> {
        let st = self.guard()?;
        Ok(st
            .settled
            .iter()
            .filter(|s| s.settle_index > after_index)
            .cloned()
            .collect())
    }

    async fn get_forwards(&self, since: i64) -> Result<Vec<Forward>> {
        let st = self.guard()?;
        Ok(st.forwards.iter().filter(|f| f.at >= since).cloned().collect())
    }

    async fn get_channel_backup(&self) -> Result<Vec<u8>> {
        Ok(self.guard()?.backup.clone())
    }
}

// ============== Fake messenger ==============

#[derive(Clone, Debug)]
pub(crate) struct Sent {
    pub msg: MessageRef,
    pub html: String,
    pub keyboard: Option<InlineKeyboard>,
    pub force_reply: bool,
}

#[derive(Default)]
pub(crate) struct FakeMessenger {
    next_id: Mutex<i32>,
    pub sent: Mutex<Vec<Sent>>,
    pub edits: Mutex<Vec<(MessageRef, String)>>,
    pub deleted: Mutex<Vec<MessageRef>>,
    pub documents: Mutex<Vec<(ChatId, String, Vec<u8>)>>,
    pub answered: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeMessenger {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: Mutex::new(100),
            ..Default::default()
        })
    }

    pub(crate) fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn last(&self) -> Sent {
        self.sent().last().cloned().unwrap()
    }

    pub(crate) fn deleted(&self) -> Vec<MessageRef> {
        self.deleted.lock().unwrap().clone()
    }

    fn push(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: Option<InlineKeyboard>,
        force_reply: bool,
    ) -> MessageRef {
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        let msg = MessageRef {
            chat_id,
            message_id: MessageId(*id),
        };
        self.sent.lock().unwrap().push(Sent {
            msg,
            html: html.to_string(),
            keyboard,
            force_reply,
        });
        msg
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        Ok(self.push(chat_id, html, None, false))
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        Ok(self.push(chat_id, html, Some(keyboard), false))
    }

    async fn send_force_reply(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        Ok(self.push(chat_id, html, None, true))
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.edits.lock().unwrap().push((msg, html.to_string()));
        Ok(())
    }

    async fn edit_keyboard(&self, _msg: MessageRef, _keyboard: InlineKeyboard) -> Result<()> {
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.deleted.lock().unwrap().push(msg);
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        file_name: &str,
        bytes: Vec<u8>,
        _caption: Option<&str>,
    ) -> Result<MessageRef> {
        self.documents
            .lock()
            .unwrap()
            .push((chat_id, file_name.to_string(), bytes));
        Ok(self.push(chat_id, file_name, None, false))
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.answered
            .lock()
            .unwrap()
            .push((callback_id.to_string(), text.map(str::to_string)));
        Ok(())
    }
}
