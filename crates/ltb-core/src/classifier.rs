//! Action classifier: which edit does a replied-to message ask for?
//!
//! Matchers run in table order and the first recognised shape wins, so invoice
//! messages take precedence over trade messages should their prefixes ever
//! overlap.

use crate::{
    codec::{
        decode, InvoiceShape, Recognized, TradeShape, PROMPT_DESCRIPTION, PROMPT_EXPIRY,
        PROMPT_TOKENS,
    },
    domain::NodeId,
    lightning::PaymentRequest,
    trades::TradeDescriptor,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    SetInvoiceDescription,
    SetInvoiceTokens,
    SetTradeDescription,
    SetTradeExpiry,
    None,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::SetInvoiceDescription => "set-invoice-description",
            Action::SetInvoiceTokens => "set-invoice-tokens",
            Action::SetTradeDescription => "set-trade-description",
            Action::SetTradeExpiry => "set-trade-expiry",
            Action::None => "none",
        }
    }
}

/// The recognised message behind an action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Invoice(Recognized<PaymentRequest>),
    Trade(Recognized<TradeDescriptor>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classified {
    pub action: Action,
    pub target: Target,
}

type Matcher = fn(&str, &[NodeId]) -> Option<Classified>;

const MATCHERS: &[(&str, Matcher)] = &[("invoice", match_invoice), ("trade", match_trade)];

fn match_invoice(text: &str, known: &[NodeId]) -> Option<Classified> {
    let msg = decode(text, &InvoiceShape).recognized()?;
    if !known.contains(&msg.parsed.destination) {
        return None;
    }
    let action = match msg.prompt.as_deref() {
        Some(PROMPT_DESCRIPTION) => Action::SetInvoiceDescription,
        Some(PROMPT_TOKENS) => Action::SetInvoiceTokens,
        _ => Action::None,
    };
    Some(Classified {
        action,
        target: Target::Invoice(msg),
    })
}

fn match_trade(text: &str, _known: &[NodeId]) -> Option<Classified> {
    let msg = decode(text, &TradeShape).recognized()?;
    let action = match msg.prompt.as_deref() {
        Some(PROMPT_DESCRIPTION) => Action::SetTradeDescription,
        Some(PROMPT_EXPIRY) => Action::SetTradeExpiry,
        _ => Action::None,
    };
    Some(Classified {
        action,
        target: Target::Trade(msg),
    })
}

/// Classify and keep the decoded message. `None` when no shape recognises the
/// text; a recognised message without a prompt carries `Action::None`.
pub fn classify_message(text: &str, known: &[NodeId]) -> Option<Classified> {
    MATCHERS.iter().find_map(|(_, matcher)| matcher(text, known))
}

pub fn classify(text: &str, known: &[NodeId]) -> Action {
    classify_message(text, known)
        .map(|c| c.action)
        .unwrap_or(Action::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{key_for, sample_request, sample_trade};

    fn invoice_text(prompt: &str) -> String {
        format!(
            "Invoice: 0.00000001\n{}\n\n{prompt}",
            sample_request(0x31, [1u8; 32], 1_000)
        )
    }

    #[test]
    fn known_invoice_description_prompt() {
        let text = invoice_text("Set the description?");
        assert_eq!(classify(&text, &[key_for(0x31)]), Action::SetInvoiceDescription);
        assert_eq!(classify(&text, &[key_for(0x32), key_for(0x31)]), Action::SetInvoiceDescription);
    }

    #[test]
    fn known_invoice_amount_prompt() {
        let text = invoice_text(PROMPT_TOKENS);
        assert_eq!(classify(&text, &[key_for(0x31)]), Action::SetInvoiceTokens);
    }

    #[test]
    fn foreign_invoice_is_none() {
        let text = invoice_text("Set the description?");
        assert_eq!(classify(&text, &[key_for(0x32)]), Action::None);
        assert_eq!(classify(&text, &[]), Action::None);
        assert!(classify_message(&text, &[]).is_none());
    }

    #[test]
    fn trade_prompts() {
        let trade = sample_trade(0x31, [2u8; 32]);
        let text = format!("Trade: recipe\n{trade}\n\n{PROMPT_DESCRIPTION}");
        assert_eq!(classify(&text, &[]), Action::SetTradeDescription);
        let text = format!("Trade: recipe\n{trade}\n\n{PROMPT_EXPIRY}");
        let c = classify_message(&text, &[]).unwrap();
        assert_eq!(c.action, Action::SetTradeExpiry);
        assert!(matches!(c.target, Target::Trade(ref r) if r.id == "02".repeat(32)));
    }

    #[test]
    fn unprompted_message_is_recognised_without_action() {
        let text = format!(
            "Invoice: 0.00000001\n{}\n",
            sample_request(0x31, [1u8; 32], 1_000)
        );
        let c = classify_message(&text, &[key_for(0x31)]).unwrap();
        assert_eq!(c.action, Action::None);
        assert!(matches!(c.target, Target::Invoice(_)));
    }

    #[test]
    fn unrelated_text_is_none() {
        assert_eq!(classify("hello there", &[key_for(1)]), Action::None);
        assert_eq!(classify("", &[]), Action::None);
    }

    #[test]
    fn matchers_run_invoice_first() {
        assert_eq!(MATCHERS[0].0, "invoice");
        assert_eq!(MATCHERS[1].0, "trade");
    }
}
