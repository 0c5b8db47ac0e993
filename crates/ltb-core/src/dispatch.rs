//! Command and button dispatch tables.
//!
//! Both tables are ordered `(name, target)` pairs. The access gate runs before
//! a table is consulted; unknown input is a dead end, not an error.

use crate::{
    access::{ConnectFlow, OwnerSession},
    domain::{NodeId, UserId},
    messaging::types::InlineButton,
    Result,
};

/// Hex characters of a node key carried in node-move button data.
pub const NODE_KEY_PREFIX_LEN: usize = 40;

// ============== Commands ==============

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Connect,
    Info,
    Invoice,
    Balance,
    Liquidity,
    Graph,
    Pending,
    Trade,
    BlockNumber,
    Backup,
    Version,
    Stop,
}

const COMMANDS: &[(&str, Command, &str)] = &[
    ("start", Command::Start, "Show this help message"),
    ("help", Command::Help, "Show this help message"),
    ("connect", Command::Connect, "<code>code</code> - Pair this chat with the bot"),
    ("info", Command::Info, "Node identity and sync status"),
    (
        "invoice",
        Command::Invoice,
        "<code>[amount] [description]</code> - Create an invoice",
    ),
    ("balance", Command::Balance, "Wallet and channel balances"),
    (
        "liquidity",
        Command::Liquidity,
        "<code>[peer]</code> - Inbound and outbound liquidity",
    ),
    ("graph", Command::Graph, "<code>key</code> - Look up a node in the graph"),
    ("pending", Command::Pending, "Pending channel opens and closes"),
    (
        "trade",
        Command::Trade,
        "<code>price description</code> - Offer a trade secret",
    ),
    ("blocknumber", Command::BlockNumber, "Current block height"),
    ("backup", Command::Backup, "Send channel backups"),
    ("version", Command::Version, "Bot version"),
    ("stop", Command::Stop, "Stop the bot"),
];

impl Command {
    pub fn name(&self) -> &'static str {
        COMMANDS
            .iter()
            .find(|(_, c, _)| c == self)
            .map(|(n, _, _)| *n)
            .unwrap_or("")
    }

    /// Only `/connect` may run before the bot is paired.
    pub fn connect_flow(&self) -> ConnectFlow {
        match self {
            Command::Connect => ConnectFlow::Allowed,
            _ => ConnectFlow::Denied,
        }
    }
}

/// Split `/cmd@botname args` into a lowercase command name and its argument text.
pub fn parse_command(text: &str) -> (String, String) {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub fn lookup_command(name: &str) -> Option<Command> {
    COMMANDS
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, c, _)| *c)
}

pub fn help_text() -> String {
    let mut lines = vec!["⚡️ <b>Lightning Telegram Bot</b>".to_string(), String::new()];
    lines.push("<b>Commands:</b>".to_string());
    for (name, command, about) in COMMANDS {
        if *command == Command::Help {
            continue;
        }
        lines.push(format!("/{name} {about}"));
    }
    lines.push(String::new());
    lines.push("Reply to a question message to answer it.".to_string());
    lines.join("\n")
}

// ============== Buttons ==============

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonKind {
    RemoveMessage,
    CancelInvoice,
    SetInvoiceDescription,
    SetInvoiceTokens,
    SetInvoiceNode,
    MoveInvoiceNodeTo,
    CancelTrade,
    SetTradeDescription,
    SetTradeExpiry,
    StopBot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Match {
    Exact,
    Prefix,
}

const BUTTONS: &[(&str, ButtonKind, Match)] = &[
    ("remove-message", ButtonKind::RemoveMessage, Match::Exact),
    ("cancel-invoice", ButtonKind::CancelInvoice, Match::Exact),
    ("set-invoice-description", ButtonKind::SetInvoiceDescription, Match::Exact),
    ("set-invoice-tokens", ButtonKind::SetInvoiceTokens, Match::Exact),
    ("set-invoice-node", ButtonKind::SetInvoiceNode, Match::Exact),
    ("move-invoice-node-to", ButtonKind::MoveInvoiceNodeTo, Match::Prefix),
    ("cancel-trade", ButtonKind::CancelTrade, Match::Exact),
    ("set-trade-description", ButtonKind::SetTradeDescription, Match::Exact),
    ("set-trade-expiry", ButtonKind::SetTradeExpiry, Match::Exact),
    ("stop-bot", ButtonKind::StopBot, Match::Exact),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ButtonPress {
    pub kind: ButtonKind,
    /// Variable suffix of prefixed button data; empty for exact buttons.
    pub arg: String,
}

impl ButtonKind {
    pub fn data_prefix(&self) -> &'static str {
        BUTTONS
            .iter()
            .find(|(_, k, _)| k == self)
            .map(|(n, _, _)| *n)
            .unwrap_or("")
    }

    pub fn button(&self, label: impl Into<String>) -> InlineButton {
        InlineButton::new(label, self.data_prefix())
    }
}

/// Button that moves an invoice onto `node`.
pub fn move_invoice_button(label: impl Into<String>, node: &NodeId) -> InlineButton {
    InlineButton::new(
        label,
        format!(
            "{}{}",
            ButtonKind::MoveInvoiceNodeTo.data_prefix(),
            node.prefix(NODE_KEY_PREFIX_LEN)
        ),
    )
}

pub fn route_button(data: &str) -> Option<ButtonPress> {
    if let Some((_, kind, _)) = BUTTONS
        .iter()
        .find(|(name, _, m)| *m == Match::Exact && *name == data)
    {
        return Some(ButtonPress {
            kind: *kind,
            arg: String::new(),
        });
    }

    BUTTONS
        .iter()
        .filter(|(name, _, m)| *m == Match::Prefix && data.starts_with(name))
        .max_by_key(|(name, _, _)| name.len())
        .map(|(name, kind, _)| ButtonPress {
            kind: *kind,
            arg: data[name.len()..].to_string(),
        })
}

// ============== Gated dispatch ==============

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch<T> {
    Handle(T),
    Unknown,
}

/// Run the access gate, then resolve a slash command.
pub fn dispatch_command(
    session: &OwnerSession,
    requester: UserId,
    text: &str,
) -> Result<Dispatch<(Command, String)>> {
    let (name, arg) = parse_command(text);
    let command = lookup_command(&name);
    let flow = command.map_or(ConnectFlow::Denied, |c| c.connect_flow());
    session.check(requester, flow)?;

    Ok(match command {
        Some(command) => Dispatch::Handle((command, arg)),
        None => Dispatch::Unknown,
    })
}

/// Run the access gate, then resolve button callback data.
pub fn dispatch_button(
    session: &OwnerSession,
    requester: UserId,
    data: &str,
) -> Result<Dispatch<ButtonPress>> {
    session.check(requester, ConnectFlow::Denied)?;
    Ok(match route_button(data) {
        Some(press) => Dispatch::Handle(press),
        None => Dispatch::Unknown,
    })
}
