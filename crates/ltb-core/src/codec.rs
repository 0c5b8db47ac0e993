//! Message state codec.
//!
//! Chat messages are the only place pending operation state lives. A message
//! carries its state in its visible text:
//!
//! ```text
//! <title>        line 1, starts with a shape-specific prefix
//! <payload>      line 2, payment request or encoded trade
//!                line 3, always empty
//! <prompt>       line 4, only when the message asks for a reply
//! ```
//!
//! Decoding is speculative: callers try text that may not be theirs, so every
//! failure collapses into `Decoded::Unrecognized` instead of an error.

use crate::{
    lightning::{parse_payment_request, PaymentRequest},
    trades::{decode_trade, TradeDescriptor},
};

pub const INVOICE_TITLE_PREFIX: &str = "Invoice: ";
pub const TRADE_TITLE_PREFIX: &str = "Trade: ";

pub const PROMPT_DESCRIPTION: &str = "Set the description?";
pub const PROMPT_TOKENS: &str = "Set the amount?";
pub const PROMPT_EXPIRY: &str = "Set the expiry hours?";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedMessage {
    pub title: String,
    pub payload: String,
    pub prompt: Option<String>,
}

impl EncodedMessage {
    pub fn new(title: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            payload: payload.into(),
            prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = Some(prompt.to_string());
        self
    }
}

/// Render the message text. The prompt line is omitted entirely when absent.
pub fn encode(msg: &EncodedMessage) -> String {
    let title = single_line(&msg.title);
    let mut lines = vec![title.as_str(), msg.payload.as_str(), ""];
    if let Some(prompt) = msg.prompt.as_deref() {
        lines.push(prompt);
    }
    lines.join("\n")
}

fn single_line(s: &str) -> String {
    s.split(['\n', '\r'])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Describes one kind of encoded message.
pub trait PayloadShape {
    type Parsed;

    fn title_prefix(&self) -> &'static str;
    fn prompts(&self) -> &'static [&'static str];
    /// Parse the payload line; `None` makes the whole message unrecognized.
    fn parse(&self, payload: &str) -> Option<Self::Parsed>;
    /// Stable identifier used to correlate with live node state.
    fn id(&self, parsed: &Self::Parsed) -> String;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recognized<T> {
    pub id: String,
    pub title: String,
    pub payload: String,
    pub parsed: T,
    pub prompt: Option<String>,
}

impl<T> Recognized<T> {
    /// The same message, re-encoded with a different prompt.
    pub fn reprompt(&self, prompt: Option<&str>) -> EncodedMessage {
        EncodedMessage {
            title: self.title.clone(),
            payload: self.payload.clone(),
            prompt: prompt.map(str::to_string),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoded<T> {
    Recognized(Recognized<T>),
    Unrecognized,
}

impl<T> Decoded<T> {
    pub fn recognized(self) -> Option<Recognized<T>> {
        match self {
            Decoded::Recognized(r) => Some(r),
            Decoded::Unrecognized => None,
        }
    }

    pub fn is_recognized(&self) -> bool {
        matches!(self, Decoded::Recognized(_))
    }
}

pub fn decode<S: PayloadShape>(text: &str, shape: &S) -> Decoded<S::Parsed> {
    let lines: Vec<&str> = text.split('\n').collect();
    let [title, payload, spacer, rest @ ..] = lines.as_slice() else {
        return Decoded::Unrecognized;
    };

    if !title.starts_with(shape.title_prefix()) || payload.is_empty() || !spacer.is_empty() {
        return Decoded::Unrecognized;
    }

    let prompt = match rest {
        [] => None,
        [prompt] if shape.prompts().contains(prompt) => Some(prompt.to_string()),
        _ => return Decoded::Unrecognized,
    };

    let Some(parsed) = shape.parse(payload) else {
        return Decoded::Unrecognized;
    };

    Decoded::Recognized(Recognized {
        id: shape.id(&parsed),
        title: title.to_string(),
        payload: payload.to_string(),
        parsed,
        prompt,
    })
}

// ============== Shapes ==============

/// Invoice messages: BOLT11 payload, identified by the destination node key.
#[derive(Clone, Copy, Debug, Default)]
pub struct InvoiceShape;

impl PayloadShape for InvoiceShape {
    type Parsed = PaymentRequest;

    fn title_prefix(&self) -> &'static str {
        INVOICE_TITLE_PREFIX
    }

    fn prompts(&self) -> &'static [&'static str] {
        &[PROMPT_DESCRIPTION, PROMPT_TOKENS]
    }

    fn parse(&self, payload: &str) -> Option<PaymentRequest> {
        parse_payment_request(payload).ok()
    }

    fn id(&self, parsed: &PaymentRequest) -> String {
        parsed.destination.to_string()
    }
}

/// Trade messages: encoded trade descriptor payload, identified by trade id.
#[derive(Clone, Copy, Debug, Default)]
pub struct TradeShape;

impl PayloadShape for TradeShape {
    type Parsed = TradeDescriptor;

    fn title_prefix(&self) -> &'static str {
        TRADE_TITLE_PREFIX
    }

    fn prompts(&self) -> &'static [&'static str] {
        &[PROMPT_DESCRIPTION, PROMPT_EXPIRY]
    }

    fn parse(&self, payload: &str) -> Option<TradeDescriptor> {
        decode_trade(payload).ok()
    }

    fn id(&self, parsed: &TradeDescriptor) -> String {
        parsed.id.to_string()
    }
}
