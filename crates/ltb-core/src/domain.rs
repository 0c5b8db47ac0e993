use std::fmt;

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

impl From<UserId> for ChatId {
    /// Private chats share the id of the user.
    fn from(u: UserId) -> Self {
        ChatId(u.0)
    }
}

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Lightning node identity: compressed secp256k1 public key, lowercase hex.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    /// Accepts 66 hex chars (33 bytes), normalising to lowercase.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() != 66 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        if !(s.starts_with("02") || s.starts_with("03")) {
            return None;
        }
        Some(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `n` hex characters (used for button data and compact display).
    pub fn prefix(&self, n: usize) -> &str {
        &self.0[..n.min(self.0.len())]
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Invoice payment hash, lowercase hex (32 bytes).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PaymentHash(String);

impl PaymentHash {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Anchored trade id; equal to the payment hash of the anchoring hodl invoice.
pub type TradeId = PaymentHash;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_requires_compressed_key() {
        let key = format!("02{}", "ab".repeat(32));
        assert_eq!(NodeId::parse(&key).unwrap().as_str(), key);
        assert!(NodeId::parse(&format!("04{}", "ab".repeat(32))).is_none());
        assert!(NodeId::parse("02abcd").is_none());
    }

    #[test]
    fn node_id_normalises_case() {
        let key = format!("03{}", "AB".repeat(32));
        assert_eq!(NodeId::parse(&key).unwrap().prefix(6), "03abab");
    }
}
