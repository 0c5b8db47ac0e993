//! Read-only node reports rendered as Telegram HTML.
//!
//! Multi-node reports keep going when a single node fails; the failure is shown
//! in place of that node's section.

use tracing::warn;

use crate::{
    domain::NodeId,
    errors::Error,
    formatting::{escape_html, format_tokens, short_key},
    lightning::{NodeHandle, Nodes, PendingKind},
    Result,
};

fn header(node: &NodeHandle) -> String {
    format!("<b>{}</b>", escape_html(node.label()))
}

fn failed(node: &NodeHandle, err: &Error) -> String {
    warn!(node = %node.name, error = %err, "node query failed");
    format!("{}\n⚠️ {}", header(node), escape_html(&err.to_string()))
}

pub fn version_text() -> String {
    format!(
        "⚡️ <b>ltb</b> v{}",
        escape_html(env!("CARGO_PKG_VERSION"))
    )
}

pub async fn info_report(nodes: &Nodes) -> String {
    let mut sections = Vec::with_capacity(nodes.len());
    for node in nodes.all() {
        let section = match node.client.get_info().await {
            Ok(info) => format!(
                "{}\n<code>{}</code>\nNetwork: {}\nBlock: {} {}\nChannels: {} active, {} pending\nPeers: {}\nVersion: {}",
                header(node),
                info.public_key,
                escape_html(&info.network),
                info.block_height,
                if info.synced_to_chain { "✅ synced" } else { "⏳ syncing" },
                info.active_channels,
                info.pending_channels,
                info.peers,
                escape_html(&info.version),
            ),
            Err(e) => failed(node, &e),
        };
        sections.push(section);
    }
    sections.join("\n\n")
}

pub async fn block_report(nodes: &Nodes) -> String {
    let mut lines = Vec::with_capacity(nodes.len());
    for node in nodes.all() {
        lines.push(match node.client.get_info().await {
            Ok(info) => format!("{}: <code>{}</code>", header(node), info.block_height),
            Err(e) => failed(node, &e),
        });
    }
    lines.join("\n")
}

pub async fn balance_report(nodes: &Nodes) -> String {
    let mut sections = Vec::with_capacity(nodes.len() + 1);
    let mut grand_total = 0u64;
    for node in nodes.all() {
        let section = match node.client.get_balances().await {
            Ok(b) => {
                grand_total += b.total();
                let mut lines = vec![
                    header(node),
                    format!("Chain: {}", format_tokens(b.chain_confirmed)),
                ];
                if b.chain_unconfirmed > 0 {
                    lines.push(format!("Unconfirmed: {}", format_tokens(b.chain_unconfirmed)));
                }
                lines.push(format!("Channels: {}", format_tokens(b.channel_local)));
                if b.pending_local > 0 {
                    lines.push(format!("Pending: {}", format_tokens(b.pending_local)));
                }
                lines.push(format!("Total: <b>{}</b>", format_tokens(b.total())));
                lines.join("\n")
            }
            Err(e) => failed(node, &e),
        };
        sections.push(section);
    }
    if nodes.len() > 1 {
        sections.push(format!("Grand total: <b>{}</b>", format_tokens(grand_total)));
    }
    sections.join("\n\n")
}

/// Inbound and outbound channel liquidity, optionally narrowed to one peer by
/// key prefix or alias.
pub async fn liquidity_report(nodes: &Nodes, peer: &str) -> String {
    let peer = peer.trim().to_lowercase();
    let by_key = !peer.is_empty() && peer.chars().all(|c| c.is_ascii_hexdigit());

    let mut sections = Vec::with_capacity(nodes.len());
    for node in nodes.all() {
        let channels = match node.client.get_channels().await {
            Ok(c) => c,
            Err(e) => {
                sections.push(failed(node, &e));
                continue;
            }
        };

        let (mut inbound, mut outbound, mut count) = (0u64, 0u64, 0usize);
        for ch in &channels {
            let matched = if peer.is_empty() {
                true
            } else if by_key {
                ch.partner_public_key.as_str().starts_with(&peer)
            } else {
                match node.client.get_graph_node(&ch.partner_public_key).await {
                    Ok(Some(g)) => g.alias.to_lowercase().contains(&peer),
                    _ => false,
                }
            };
            if matched {
                inbound += ch.remote_balance;
                outbound += ch.local_balance;
                count += 1;
            }
        }

        sections.push(format!(
            "{}\nChannels: {count}\nInbound: {}\nOutbound: {}",
            header(node),
            format_tokens(inbound),
            format_tokens(outbound),
        ));
    }
    sections.join("\n\n")
}

/// Look a node up in every operated node's graph view.
pub async fn graph_report(nodes: &Nodes, key: &str) -> Result<String> {
    let key = NodeId::parse(key)
        .ok_or_else(|| Error::validation("Usage: /graph <node public key>"))?;

    let mut sections = Vec::new();
    for node in nodes.all() {
        match node.client.get_graph_node(&key).await {
            Ok(Some(g)) => {
                let updated = g
                    .updated_at
                    .and_then(|t| chrono::DateTime::from_timestamp(t, 0))
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                sections.push(format!(
                    "Seen by {}\nAlias: {}\nChannels: {}\nCapacity: {}\nUpdated: {updated}",
                    header(node),
                    escape_html(&g.alias),
                    g.channel_count,
                    format_tokens(g.capacity),
                ));
            }
            Ok(None) => {}
            Err(e) => sections.push(failed(node, &e)),
        }
    }

    if sections.is_empty() {
        return Err(Error::not_found(format!(
            "{} is not in the graph.",
            short_key(&key)
        )));
    }
    Ok(format!("<code>{key}</code>\n\n{}", sections.join("\n\n")))
}

pub async fn pending_report(nodes: &Nodes) -> String {
    let mut sections = Vec::with_capacity(nodes.len());
    for node in nodes.all() {
        let pending = match node.client.get_pending().await {
            Ok(p) => p,
            Err(e) => {
                sections.push(failed(node, &e));
                continue;
            }
        };
        if pending.is_empty() {
            sections.push(format!("{}\nNo pending channels.", header(node)));
            continue;
        }
        let mut lines = vec![header(node)];
        for p in &pending {
            let kind = match p.kind {
                PendingKind::Opening => "⏳ Opening",
                PendingKind::Closing => "🔒 Closing",
                PendingKind::ForceClosing => "💥 Force closing",
            };
            lines.push(format!(
                "{kind} with <code>{}</code>: {} (local {})",
                short_key(&p.partner_public_key),
                format_tokens(p.capacity),
                format_tokens(p.local_balance),
            ));
        }
        sections.push(lines.join("\n"));
    }
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lightning::{Balances, Channel, GraphNode, PendingChannel},
        testing::{handle, key_for, FakeNode},
    };

    fn channel(partner: u8, local: u64, remote: u64) -> Channel {
        Channel {
            id: format!("chan-{partner}"),
            partner_public_key: key_for(partner),
            capacity: local + remote,
            local_balance: local,
            remote_balance: remote,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn balance_adds_grand_total_for_many_nodes() {
        let a = FakeNode::new(1);
        let b = FakeNode::new(2);
        a.set(|s| {
            s.balances = Balances {
                chain_confirmed: 100,
                channel_local: 50,
                ..Default::default()
            }
        });
        b.set(|s| s.balances.chain_confirmed = 1);
        let nodes = Nodes::new(vec![handle("a", a), handle("b", b)]).unwrap();

        let report = balance_report(&nodes).await;
        assert!(report.contains("Total: <b>0.00000150</b>"));
        assert!(report.contains("Grand total: <b>0.00000151</b>"));
    }

    #[tokio::test]
    async fn failing_node_does_not_hide_the_others() {
        let a = FakeNode::new(1);
        let b = FakeNode::new(2);
        a.set(|s| s.fail = Some("connection refused".to_string()));
        let nodes = Nodes::new(vec![handle("a", a), handle("b", b)]).unwrap();

        let report = block_report(&nodes).await;
        assert!(report.contains("connection refused"));
        assert!(report.contains("800000"));
    }

    #[tokio::test]
    async fn liquidity_filters_by_key_prefix_and_alias() {
        let a = FakeNode::new(1);
        a.set(|s| {
            s.channels = vec![channel(5, 10, 20), channel(6, 1, 2)];
            s.graph.insert(
                key_for(6),
                GraphNode {
                    public_key: key_for(6),
                    alias: "Bitrefill".to_string(),
                    channel_count: 1000,
                    capacity: 1,
                    updated_at: None,
                },
            );
        });
        let nodes = Nodes::new(vec![handle("a", a)]).unwrap();

        let all = liquidity_report(&nodes, "").await;
        assert!(all.contains("Inbound: 0.00000022"));

        let by_key = liquidity_report(&nodes, key_for(5).prefix(12)).await;
        assert!(by_key.contains("Inbound: 0.00000020"));
        assert!(by_key.contains("Outbound: 0.00000010"));

        let by_alias = liquidity_report(&nodes, "bitref").await;
        assert!(by_alias.contains("Inbound: 0.00000002"));
    }

    #[tokio::test]
    async fn graph_lookup_validates_and_reports_not_found() {
        let nodes = Nodes::new(vec![handle("a", FakeNode::new(1))]).unwrap();
        assert_eq!(graph_report(&nodes, "xyz").await.unwrap_err().code(), 400);
        assert_eq!(
            graph_report(&nodes, key_for(9).as_str())
                .await
                .unwrap_err()
                .code(),
            404
        );
    }

    #[tokio::test]
    async fn pending_lists_each_kind() {
        let a = FakeNode::new(1);
        a.set(|s| {
            s.pending = vec![PendingChannel {
                kind: PendingKind::ForceClosing,
                partner_public_key: key_for(3),
                capacity: 1_000,
                local_balance: 400,
            }]
        });
        let nodes = Nodes::new(vec![handle("a", a)]).unwrap();
        let report = pending_report(&nodes).await;
        assert!(report.contains("Force closing"));
        assert!(report.contains(&short_key(&key_for(3))));
    }
}
