//! Access gate: one physical chat, one authorized owner.
//!
//! The owner is bound once, either from config or through the `/connect`
//! handshake, and never changes for the lifetime of the process.

use std::sync::OnceLock;

use rand::Rng;

use crate::{domain::UserId, errors::Error, Result};

/// Character set for connect codes (no ambiguous characters: I, O, 0, 1).
const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;

/// Whether the calling context may run while the bot is still unpaired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectFlow {
    Allowed,
    Denied,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessRequest {
    pub owner_id: Option<UserId>,
    pub requester_id: UserId,
}

// ============== Gate ==============

/// Pure predicate run before every command and button handler.
pub fn check_access(req: AccessRequest, flow: ConnectFlow) -> Result<()> {
    match req.owner_id {
        None if flow == ConnectFlow::Allowed => Ok(()),
        None => Err(Error::MissingOwner),
        Some(owner) if owner == req.requester_id => Ok(()),
        Some(_) => Err(Error::Unauthorized),
    }
}

// ============== Owner Session ==============

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected(UserId),
    AlreadyConnected,
}

#[derive(Debug)]
pub struct OwnerSession {
    owner: OnceLock<UserId>,
    connect_code: String,
}

impl OwnerSession {
    pub fn new(owner: Option<UserId>, connect_code: Option<String>) -> Self {
        let cell = OnceLock::new();
        if let Some(owner) = owner {
            let _ = cell.set(owner);
        }
        Self {
            owner: cell,
            connect_code: connect_code
                .map(|c| c.trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(generate_code),
        }
    }

    pub fn owner(&self) -> Option<UserId> {
        self.owner.get().copied()
    }

    pub fn is_paired(&self) -> bool {
        self.owner.get().is_some()
    }

    pub fn connect_code(&self) -> &str {
        &self.connect_code
    }

    pub fn check(&self, requester_id: UserId, flow: ConnectFlow) -> Result<()> {
        check_access(
            AccessRequest {
                owner_id: self.owner(),
                requester_id,
            },
            flow,
        )
    }

    /// Bind the owner if the code matches. The first successful connect wins.
    pub fn connect(&self, requester_id: UserId, code: &str) -> Result<ConnectOutcome> {
        if let Some(owner) = self.owner() {
            return if owner == requester_id {
                Ok(ConnectOutcome::AlreadyConnected)
            } else {
                Err(Error::Unauthorized)
            };
        }

        if !code.trim().eq_ignore_ascii_case(&self.connect_code) {
            return Err(Error::validation("Connect code does not match."));
        }

        match self.owner.set(requester_id) {
            Ok(()) => Ok(ConnectOutcome::Connected(requester_id)),
            // Lost a race against a concurrent connect.
            Err(_) if self.owner() == Some(requester_id) => Ok(ConnectOutcome::AlreadyConnected),
            Err(_) => Err(Error::Unauthorized),
        }
    }
}

/// Generate a random connect code.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}
