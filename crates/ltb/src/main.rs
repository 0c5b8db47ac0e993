use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use ltb_core::{access::OwnerSession, config::Config, lightning::LightningNode, lightning::Nodes};
use ltb_lnd::LndClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ltb_core::logging::init("ltb")?;

    let cfg = Arc::new(Config::load().context("loading configuration")?);

    let mut clients: Vec<(String, Arc<dyn LightningNode>)> = Vec::with_capacity(cfg.nodes.len());
    for node in &cfg.nodes {
        let client = LndClient::from_config(node, cfg.request_timeout)
            .await
            .with_context(|| format!("configuring node {}", node.name))?;
        clients.push((node.name.clone(), Arc::new(client)));
    }
    let nodes = Nodes::connect(clients)
        .await
        .context("connecting to lightning nodes")?;

    let owner = Arc::new(OwnerSession::new(cfg.owner_id, cfg.connect_code.clone()));
    match owner.owner() {
        Some(id) => info!(owner_id = id.0, "owner configured"),
        None => warn!(
            code = owner.connect_code(),
            "bot is not paired; send /connect <code> from the owner account"
        ),
    }

    ltb_telegram::router::run_polling(cfg, nodes, owner)
        .await
        .context("telegram bot failed")?;

    Ok(())
}
