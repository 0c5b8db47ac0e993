//! Trade secrets anchored on the node.
//!
//! A trade lives on the node as an open hodl invoice: the invoice hash is the
//! trade id, its value is the price and its expiry is the trade expiry. The chat
//! message only carries a `TradeDescriptor` pointing at it.

use bitcoin::hex::{DisplayHex, FromHex};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{
    domain::{NodeId, PaymentHash, TradeId},
    errors::Error,
    lightning::{CreateHodlInvoice, InvoiceState, LightningNode},
    Result,
};

const MAGIC: &[u8] = b"ltb";
const TYPE_NETWORK: u8 = 0;
const TYPE_NODE: u8 = 1;
const TYPE_ID: u8 = 2;

/// Memo prefix that marks a hodl invoice as a trade anchor.
pub const ANCHOR_MEMO_PREFIX: &str = "ltb-trade:";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TradeDescriptor {
    pub id: TradeId,
    pub network: String,
    pub node: NodeId,
}

// ============== Descriptor codec ==============

pub fn encode_trade(trade: &TradeDescriptor) -> Result<String> {
    let node = Vec::<u8>::from_hex(trade.node.as_str())
        .map_err(|_| Error::validation("trade node is not hex"))?;
    let id = Vec::<u8>::from_hex(trade.id.as_str())
        .map_err(|_| Error::validation("trade id is not hex"))?;

    let mut out = MAGIC.to_vec();
    push_record(&mut out, TYPE_NETWORK, trade.network.as_bytes())?;
    push_record(&mut out, TYPE_NODE, &node)?;
    push_record(&mut out, TYPE_ID, &id)?;
    Ok(out.to_lower_hex_string())
}

/// Records carry a one-byte length.
fn push_record(out: &mut Vec<u8>, kind: u8, value: &[u8]) -> Result<()> {
    let len = u8::try_from(value.len())
        .map_err(|_| Error::validation(format!("trade record {kind} is too long")))?;
    out.push(kind);
    out.push(len);
    out.extend_from_slice(value);
    Ok(())
}

pub fn decode_trade(encoded: &str) -> Result<TradeDescriptor> {
    let bytes = Vec::<u8>::from_hex(encoded.trim())
        .map_err(|_| Error::validation("trade is not hex encoded"))?;
    let mut rest = bytes
        .strip_prefix(MAGIC)
        .ok_or_else(|| Error::validation("not a trade"))?;

    let (mut network, mut node, mut id) = (None, None, None);
    while !rest.is_empty() {
        let [kind, len, tail @ ..] = rest else {
            return Err(Error::validation("truncated trade record"));
        };
        let len = *len as usize;
        if tail.len() < len {
            return Err(Error::validation("truncated trade record"));
        }
        let (value, tail) = tail.split_at(len);
        match *kind {
            TYPE_NETWORK => {
                network = Some(
                    String::from_utf8(value.to_vec())
                        .map_err(|_| Error::validation("invalid trade network"))?,
                )
            }
            TYPE_NODE => node = NodeId::parse(&value.to_lower_hex_string()),
            TYPE_ID => id = PaymentHash::parse(&value.to_lower_hex_string()),
            // Unknown records are skipped.
            _ => {}
        }
        rest = tail;
    }

    match (id, network, node) {
        (Some(id), Some(network), Some(node)) => Ok(TradeDescriptor { id, network, node }),
        _ => Err(Error::validation("trade is missing a required record")),
    }
}

// ============== Anchored trades ==============

#[derive(Serialize, Deserialize)]
struct AnchorMemo {
    description: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnchoredTrade {
    pub id: TradeId,
    pub description: String,
    pub price: u64,
    pub created_at: i64,
    pub expires_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateTrade {
    pub description: String,
    pub price: u64,
    pub expiry_hours: u32,
}

pub async fn create_anchored_trade(
    node: &dyn LightningNode,
    req: CreateTrade,
) -> Result<AnchoredTrade> {
    if req.description.trim().is_empty() {
        return Err(Error::validation("A trade needs a description."));
    }
    if req.expiry_hours == 0 {
        return Err(Error::validation("Trade expiry must be at least one hour."));
    }

    let mut preimage = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut preimage);
    let hash = Sha256::digest(preimage);
    let id = PaymentHash::parse(&hash.as_slice().to_lower_hex_string())
        .ok_or_else(|| Error::External("sha256 produced an invalid hash".to_string()))?;

    let memo = serde_json::to_string(&AnchorMemo {
        description: req.description.clone(),
    })?;
    let expiry_secs = u64::from(req.expiry_hours) * 3600;
    node.create_hodl_invoice(CreateHodlInvoice {
        id: id.clone(),
        tokens: req.price,
        description: format!("{ANCHOR_MEMO_PREFIX}{memo}"),
        expiry_secs,
    })
    .await?;
    debug!(trade = %id, "anchored trade created");

    get_anchored_trade(node, &id).await
}

/// Look up an open anchored trade. Canceled or settled anchors are gone.
pub async fn get_anchored_trade(node: &dyn LightningNode, id: &TradeId) -> Result<AnchoredTrade> {
    let invoice = node
        .get_invoice(id)
        .await?
        .filter(|i| matches!(i.state, InvoiceState::Open | InvoiceState::Accepted))
        .ok_or_else(|| Error::not_found("Trade not found."))?;

    let memo = invoice
        .description
        .strip_prefix(ANCHOR_MEMO_PREFIX)
        .and_then(|m| serde_json::from_str::<AnchorMemo>(m).ok())
        .ok_or_else(|| Error::not_found("Trade not found."))?;

    Ok(AnchoredTrade {
        id: invoice.id.clone(),
        description: memo.description,
        price: invoice.tokens,
        created_at: invoice.created_at,
        expires_at: invoice.expires_at(),
    })
}

pub async fn cancel_anchored_trade(node: &dyn LightningNode, id: &TradeId) -> Result<()> {
    get_anchored_trade(node, id).await?;
    node.cancel_invoice(id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{key_for, FakeNode};

    fn descriptor() -> TradeDescriptor {
        TradeDescriptor {
            id: PaymentHash::parse(&"ab".repeat(32)).unwrap(),
            network: "regtest".to_string(),
            node: key_for(4),
        }
    }

    #[test]
    fn descriptor_round_trips() {
        let encoded = encode_trade(&descriptor()).unwrap();
        assert!(encoded.starts_with("6c7462"));
        assert_eq!(decode_trade(&encoded).unwrap(), descriptor());
    }

    #[test]
    fn decode_rejects_foreign_hex() {
        assert!(decode_trade("deadbeef").is_err());
        assert!(decode_trade("not hex").is_err());
        // Magic only, no records.
        assert!(decode_trade("6c7462").is_err());
        let encoded = encode_trade(&descriptor()).unwrap();
        assert!(decode_trade(&encoded[..encoded.len() - 2]).is_err());
    }

    #[test]
    fn oversized_record_is_rejected() {
        let trade = TradeDescriptor {
            network: "n".repeat(256),
            ..descriptor()
        };
        assert_eq!(encode_trade(&trade).unwrap_err().code(), 400);

        let trade = TradeDescriptor {
            network: "n".repeat(255),
            ..descriptor()
        };
        let encoded = encode_trade(&trade).unwrap();
        assert_eq!(decode_trade(&encoded).unwrap(), trade);
    }

    #[test]
    fn decode_skips_unknown_records() {
        let encoded = format!("{}0902beef", encode_trade(&descriptor()).unwrap());
        assert_eq!(decode_trade(&encoded).unwrap(), descriptor());
    }

    #[tokio::test]
    async fn anchored_trade_lifecycle() {
        let node = FakeNode::new(4);
        let trade = create_anchored_trade(
            node.as_ref(),
            CreateTrade {
                description: "the secret recipe".to_string(),
                price: 2_100,
                expiry_hours: 2,
            },
        )
        .await
        .unwrap();
        assert_eq!(trade.price, 2_100);
        assert_eq!(trade.description, "the secret recipe");
        assert_eq!(trade.expires_at - trade.created_at, 7_200);
        assert!(node.invoices()[0].description.starts_with(ANCHOR_MEMO_PREFIX));

        cancel_anchored_trade(node.as_ref(), &trade.id).await.unwrap();
        let err = get_anchored_trade(node.as_ref(), &trade.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), 404);
    }

    #[tokio::test]
    async fn plain_invoices_are_not_trades() {
        let node = FakeNode::new(4);
        let created = node
            .create_invoice(crate::lightning::CreateInvoice {
                tokens: 10,
                description: "coffee".to_string(),
                expiry_secs: 60,
            })
            .await
            .unwrap();
        let err = get_anchored_trade(node.as_ref(), &created.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
