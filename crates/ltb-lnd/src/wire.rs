//! LND REST payloads.
//!
//! The REST gateway renders 64-bit integers as JSON strings and omits some
//! zero-valued fields, so every numeric field accepts both forms and defaults.

use bitcoin::base64::{engine::general_purpose::STANDARD, Engine as _};
use bitcoin::hex::DisplayHex;
use serde::{de, Deserialize, Deserializer, Serialize};

use ltb_core::{
    domain::{NodeId, PaymentHash},
    errors::Error,
    lightning::{
        Channel, Forward, GraphNode, Invoice, InvoiceState, NodeInfo, PendingChannel, PendingKind,
        SettledInvoice,
    },
    Result,
};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrStr {
    Num(u64),
    Str(String),
}

fn num<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    match NumOrStr::deserialize(d)? {
        NumOrStr::Num(n) => Ok(n),
        NumOrStr::Str(s) if s.is_empty() => Ok(0),
        NumOrStr::Str(s) => s.parse().map_err(de::Error::custom),
    }
}

/// Base64 bytes (as LND sends hashes) to lowercase hex.
pub fn b64_to_hex(b64: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(b64)
        .map_err(|e| Error::upstream(502, format!("bad base64 from node: {e}")))?;
    Ok(bytes.to_lower_hex_string())
}

pub fn hash_to_b64(id: &PaymentHash) -> Result<String> {
    use bitcoin::hex::FromHex;
    let bytes = Vec::<u8>::from_hex(id.as_str())
        .map_err(|e| Error::validation(format!("bad payment hash: {e}")))?;
    Ok(STANDARD.encode(bytes))
}

fn node_id(key: &str) -> Result<NodeId> {
    NodeId::parse(key).ok_or_else(|| Error::upstream(502, format!("bad node key from node: {key}")))
}

fn payment_hash(b64: &str) -> Result<PaymentHash> {
    let hex = b64_to_hex(b64)?;
    PaymentHash::parse(&hex).ok_or_else(|| Error::upstream(502, "bad payment hash from node"))
}

// ============== Errors ==============

#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: i64,
    #[serde(default, alias = "error")]
    pub message: String,
}

/// Map a non-success response into `Error::Upstream`.
pub fn upstream_error(status: u16, body: &str) -> Error {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = if parsed.message.trim().is_empty() {
        let snippet: String = body.chars().take(200).collect();
        format!("HTTP {status}: {snippet}")
    } else {
        parsed.message
    };
    Error::upstream(status, message)
}

/// LND reports a missing invoice or graph node either as 404 or as a generic
/// RPC failure carrying one of these messages.
pub fn is_not_found(err: &Error) -> bool {
    match err {
        Error::Upstream { code, message } => {
            *code == 404
                || message.contains("unable to locate invoice")
                || message.contains("unable to find node")
                || message.contains("there are no existing invoices")
        }
        _ => false,
    }
}

// ============== Info ==============

#[derive(Debug, Deserialize)]
pub struct Chain {
    #[serde(default)]
    pub network: String,
}

#[derive(Debug, Deserialize)]
pub struct GetInfo {
    pub identity_pubkey: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default, deserialize_with = "num")]
    pub block_height: u64,
    #[serde(default)]
    pub synced_to_chain: bool,
    #[serde(default, deserialize_with = "num")]
    pub num_active_channels: u64,
    #[serde(default, deserialize_with = "num")]
    pub num_pending_channels: u64,
    #[serde(default, deserialize_with = "num")]
    pub num_peers: u64,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub chains: Vec<Chain>,
}

impl GetInfo {
    pub fn into_info(self) -> Result<NodeInfo> {
        Ok(NodeInfo {
            public_key: node_id(&self.identity_pubkey)?,
            alias: self.alias,
            block_height: self.block_height as u32,
            synced_to_chain: self.synced_to_chain,
            active_channels: self.num_active_channels as u32,
            pending_channels: self.num_pending_channels as u32,
            peers: self.num_peers as u32,
            version: self.version,
            network: self
                .chains
                .into_iter()
                .next()
                .map(|c| c.network)
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "mainnet".to_string()),
        })
    }
}

// ============== Invoices ==============

#[derive(Debug, Serialize)]
pub struct AddInvoice<'a> {
    pub value: String,
    pub memo: &'a str,
    pub expiry: String,
}

#[derive(Debug, Serialize)]
pub struct AddHodlInvoice<'a> {
    pub hash: String,
    pub value: String,
    pub memo: &'a str,
    pub expiry: String,
}

#[derive(Debug, Deserialize)]
pub struct AddInvoiceResponse {
    #[serde(default)]
    pub r_hash: String,
    pub payment_request: String,
}

#[derive(Debug, Serialize)]
pub struct CancelInvoice {
    pub payment_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct LndInvoice {
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub r_hash: String,
    #[serde(default)]
    pub payment_request: String,
    #[serde(default, deserialize_with = "num")]
    pub value: u64,
    #[serde(default, deserialize_with = "num")]
    pub creation_date: u64,
    #[serde(default, deserialize_with = "num")]
    pub expiry: u64,
    #[serde(default)]
    pub state: String,
    #[serde(default, deserialize_with = "num")]
    pub settle_index: u64,
    #[serde(default, deserialize_with = "num")]
    pub amt_paid_sat: u64,
}

impl LndInvoice {
    fn invoice_state(&self) -> InvoiceState {
        match self.state.as_str() {
            "SETTLED" => InvoiceState::Settled,
            "CANCELED" => InvoiceState::Canceled,
            "ACCEPTED" => InvoiceState::Accepted,
            _ => InvoiceState::Open,
        }
    }

    pub fn into_invoice(self) -> Result<Invoice> {
        Ok(Invoice {
            id: payment_hash(&self.r_hash)?,
            state: self.invoice_state(),
            request: self.payment_request,
            description: self.memo,
            tokens: self.value,
            created_at: self.creation_date as i64,
            expiry_secs: self.expiry,
        })
    }

    pub fn into_settled(self) -> Result<SettledInvoice> {
        Ok(SettledInvoice {
            id: payment_hash(&self.r_hash)?,
            description: self.memo,
            received: self.amt_paid_sat,
            settle_index: self.settle_index,
        })
    }

    pub fn is_settled(&self) -> bool {
        self.invoice_state() == InvoiceState::Settled
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListInvoices {
    #[serde(default)]
    pub invoices: Vec<LndInvoice>,
}

// ============== Balances ==============

#[derive(Debug, Default, Deserialize)]
pub struct WalletBalance {
    #[serde(default, deserialize_with = "num")]
    pub confirmed_balance: u64,
    #[serde(default, deserialize_with = "num")]
    pub unconfirmed_balance: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct Amount {
    #[serde(default, deserialize_with = "num")]
    pub sat: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChannelBalance {
    #[serde(default)]
    pub local_balance: Amount,
    #[serde(default)]
    pub remote_balance: Amount,
    #[serde(default)]
    pub pending_open_local_balance: Amount,
}

// ============== Channels ==============

#[derive(Debug, Deserialize)]
pub struct LndChannel {
    #[serde(default)]
    pub chan_id: String,
    pub remote_pubkey: String,
    #[serde(default, deserialize_with = "num")]
    pub capacity: u64,
    #[serde(default, deserialize_with = "num")]
    pub local_balance: u64,
    #[serde(default, deserialize_with = "num")]
    pub remote_balance: u64,
    #[serde(default)]
    pub active: bool,
}

impl LndChannel {
    pub fn into_channel(self) -> Result<Channel> {
        Ok(Channel {
            partner_public_key: node_id(&self.remote_pubkey)?,
            id: self.chan_id,
            capacity: self.capacity,
            local_balance: self.local_balance,
            remote_balance: self.remote_balance,
            is_active: self.active,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListChannels {
    #[serde(default)]
    pub channels: Vec<LndChannel>,
}

#[derive(Debug, Deserialize)]
pub struct PendingDetail {
    pub remote_node_pub: String,
    #[serde(default, deserialize_with = "num")]
    pub capacity: u64,
    #[serde(default, deserialize_with = "num")]
    pub local_balance: u64,
}

#[derive(Debug, Deserialize)]
pub struct PendingEntry {
    pub channel: PendingDetail,
}

#[derive(Debug, Default, Deserialize)]
pub struct PendingChannels {
    #[serde(default)]
    pub pending_open_channels: Vec<PendingEntry>,
    #[serde(default)]
    pub waiting_close_channels: Vec<PendingEntry>,
    #[serde(default)]
    pub pending_force_closing_channels: Vec<PendingEntry>,
}

impl PendingChannels {
    pub fn into_pending(self) -> Result<Vec<PendingChannel>> {
        let tagged = self
            .pending_open_channels
            .into_iter()
            .map(|e| (PendingKind::Opening, e))
            .chain(
                self.waiting_close_channels
                    .into_iter()
                    .map(|e| (PendingKind::Closing, e)),
            )
            .chain(
                self.pending_force_closing_channels
                    .into_iter()
                    .map(|e| (PendingKind::ForceClosing, e)),
            );
        tagged
            .map(|(kind, e)| {
                Ok(PendingChannel {
                    kind,
                    partner_public_key: node_id(&e.channel.remote_node_pub)?,
                    capacity: e.channel.capacity,
                    local_balance: e.channel.local_balance,
                })
            })
            .collect()
    }
}

// ============== Graph ==============

#[derive(Debug, Deserialize)]
pub struct LightningNodeAnnouncement {
    pub pub_key: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default, deserialize_with = "num")]
    pub last_update: u64,
}

#[derive(Debug, Deserialize)]
pub struct NodeInfoResponse {
    pub node: LightningNodeAnnouncement,
    #[serde(default, deserialize_with = "num")]
    pub num_channels: u64,
    #[serde(default, deserialize_with = "num")]
    pub total_capacity: u64,
}

impl NodeInfoResponse {
    pub fn into_graph_node(self) -> Result<GraphNode> {
        Ok(GraphNode {
            public_key: node_id(&self.node.pub_key)?,
            alias: self.node.alias,
            channel_count: self.num_channels as u32,
            capacity: self.total_capacity,
            updated_at: (self.node.last_update > 0).then_some(self.node.last_update as i64),
        })
    }
}

// ============== Forwards ==============

#[derive(Debug, Serialize)]
pub struct ForwardingHistoryRequest {
    pub start_time: String,
    pub end_time: String,
    pub num_max_events: u32,
}

#[derive(Debug, Deserialize)]
pub struct ForwardingEvent {
    #[serde(default, deserialize_with = "num")]
    pub timestamp: u64,
    #[serde(default)]
    pub chan_id_in: String,
    #[serde(default)]
    pub chan_id_out: String,
    #[serde(default, deserialize_with = "num")]
    pub amt_out: u64,
    #[serde(default, deserialize_with = "num")]
    pub fee_msat: u64,
}

impl From<ForwardingEvent> for Forward {
    fn from(e: ForwardingEvent) -> Self {
        Forward {
            at: e.timestamp as i64,
            incoming_channel: e.chan_id_in,
            outgoing_channel: e.chan_id_out,
            tokens: e.amt_out,
            fee_mtokens: e.fee_msat,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ForwardingHistory {
    #[serde(default)]
    pub forwarding_events: Vec<ForwardingEvent>,
}

// ============== Backups ==============

#[derive(Debug, Default, Deserialize)]
pub struct MultiChanBackup {
    #[serde(default)]
    pub multi_chan_backup: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChanBackupSnapshot {
    #[serde(default)]
    pub multi_chan_backup: Option<MultiChanBackup>,
}

impl ChanBackupSnapshot {
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        let b64 = self
            .multi_chan_backup
            .map(|m| m.multi_chan_backup)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::not_found("Node has no channel backup."))?;
        STANDARD
            .decode(b64)
            .map_err(|e| Error::upstream(502, format!("bad backup encoding: {e}")))
    }
}
