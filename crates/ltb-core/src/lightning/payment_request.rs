use std::str::FromStr;

use lightning_invoice::Bolt11Invoice;

use crate::{
    domain::{NodeId, PaymentHash},
    errors::Error,
    Result,
};

/// The parts of a BOLT11 payment request the bot correlates with node state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentRequest {
    pub request: String,
    pub destination: NodeId,
    pub id: PaymentHash,
    pub tokens: Option<u64>,
}

pub fn parse_payment_request(raw: &str) -> Result<PaymentRequest> {
    let request = raw.trim();
    let invoice = Bolt11Invoice::from_str(request)
        .map_err(|e| Error::validation(format!("invalid payment request: {e:?}")))?;

    let destination = NodeId::parse(&invoice.get_payee_pub_key().to_string())
        .ok_or_else(|| Error::validation("payment request has no usable destination"))?;
    let id = PaymentHash::parse(&invoice.payment_hash().to_string())
        .ok_or_else(|| Error::validation("payment request has no usable payment hash"))?;

    Ok(PaymentRequest {
        request: request.to_string(),
        destination,
        id,
        tokens: invoice.amount_milli_satoshis().map(|m| m / 1000),
    })
}
