//! Lightning node port.
//!
//! The RPC protocol itself lives in an adapter crate; the core only sees this
//! request/response surface. Every call may fail with `Error::Upstream`.

use async_trait::async_trait;

use crate::{
    domain::{NodeId, PaymentHash},
    Result,
};

pub mod nodes;
pub mod payment_request;

pub use nodes::{NodeHandle, Nodes};
pub use payment_request::{parse_payment_request, PaymentRequest};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    pub public_key: NodeId,
    pub alias: String,
    pub block_height: u32,
    pub synced_to_chain: bool,
    pub active_channels: u32,
    pub pending_channels: u32,
    pub peers: u32,
    pub version: String,
    /// Chain network name (`mainnet`, `testnet`, `signet`, `regtest`).
    pub network: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateInvoice {
    pub tokens: u64,
    pub description: String,
    pub expiry_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateHodlInvoice {
    pub id: PaymentHash,
    pub tokens: u64,
    pub description: String,
    pub expiry_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedInvoice {
    pub id: PaymentHash,
    pub request: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvoiceState {
    Open,
    Accepted,
    Settled,
    Canceled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invoice {
    pub id: PaymentHash,
    pub request: String,
    pub description: String,
    pub tokens: u64,
    pub state: InvoiceState,
    pub created_at: i64,
    pub expiry_secs: u64,
}

impl Invoice {
    pub fn expires_at(&self) -> i64 {
        self.created_at
            .saturating_add(i64::try_from(self.expiry_secs).unwrap_or(i64::MAX))
    }

    pub fn is_open(&self) -> bool {
        self.state == InvoiceState::Open
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Balances {
    pub chain_confirmed: u64,
    pub chain_unconfirmed: u64,
    pub channel_local: u64,
    pub channel_remote: u64,
    pub pending_local: u64,
}

impl Balances {
    pub fn total(&self) -> u64 {
        self.chain_confirmed + self.chain_unconfirmed + self.channel_local + self.pending_local
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub partner_public_key: NodeId,
    pub capacity: u64,
    pub local_balance: u64,
    pub remote_balance: u64,
    pub is_active: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingKind {
    Opening,
    Closing,
    ForceClosing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingChannel {
    pub kind: PendingKind,
    pub partner_public_key: NodeId,
    pub capacity: u64,
    pub local_balance: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphNode {
    pub public_key: NodeId,
    pub alias: String,
    pub channel_count: u32,
    pub capacity: u64,
    pub updated_at: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettledInvoice {
    pub id: PaymentHash,
    pub description: String,
    pub received: u64,
    pub settle_index: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Forward {
    pub at: i64,
    pub incoming_channel: String,
    pub outgoing_channel: String,
    pub tokens: u64,
    pub fee_mtokens: u64,
}

/// Hexagonal port for a single Lightning node.
#[async_trait]
pub trait LightningNode: Send + Sync {
    async fn get_info(&self) -> Result<NodeInfo>;

    async fn create_invoice(&self, req: CreateInvoice) -> Result<CreatedInvoice>;
    async fn create_hodl_invoice(&self, req: CreateHodlInvoice) -> Result<CreatedInvoice>;
    /// `Ok(None)` when the node does not know the invoice.
    async fn get_invoice(&self, id: &PaymentHash) -> Result<Option<Invoice>>;
    async fn cancel_invoice(&self, id: &PaymentHash) -> Result<()>;

    async fn get_balances(&self) -> Result<Balances>;
    async fn get_channels(&self) -> Result<Vec<Channel>>;
    async fn get_pending(&self) -> Result<Vec<PendingChannel>>;
    /// `Ok(None)` when the node is not in this node's graph view.
    async fn get_graph_node(&self, key: &NodeId) -> Result<Option<GraphNode>>;

    /// Invoices settled with a settle index strictly greater than `after_index`.
    async fn get_settled_invoices(&self, after_index: u64) -> Result<Vec<SettledInvoice>>;
    /// Forwards at or after the unix time `since`. Timestamps are whole
    /// seconds, so callers dedupe events at the boundary second.
    async fn get_forwards(&self, since: i64) -> Result<Vec<Forward>>;

    async fn get_channel_backup(&self) -> Result<Vec<u8>>;
}
