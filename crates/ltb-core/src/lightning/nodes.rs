use std::sync::Arc;

use tracing::info;

use crate::{domain::NodeId, errors::Error, Result};

use super::LightningNode;

/// A connected node together with the identity fetched at startup.
#[derive(Clone)]
pub struct NodeHandle {
    pub name: String,
    pub public_key: NodeId,
    pub alias: String,
    pub network: String,
    pub client: Arc<dyn LightningNode>,
}

impl NodeHandle {
    /// Human label: alias when the node has one, otherwise the configured name.
    pub fn label(&self) -> &str {
        if self.alias.trim().is_empty() {
            &self.name
        } else {
            &self.alias
        }
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("name", &self.name)
            .field("public_key", &self.public_key)
            .field("alias", &self.alias)
            .field("network", &self.network)
            .finish()
    }
}

/// Registry of every node the bot operates. The first node is the default.
#[derive(Clone, Debug)]
pub struct Nodes {
    nodes: Vec<NodeHandle>,
}

impl Nodes {
    pub fn new(nodes: Vec<NodeHandle>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::Config("at least one node is required".to_string()));
        }
        Ok(Self { nodes })
    }

    /// Query each client for its identity and build the registry.
    pub async fn connect(clients: Vec<(String, Arc<dyn LightningNode>)>) -> Result<Self> {
        let mut nodes = Vec::with_capacity(clients.len());
        for (name, client) in clients {
            let info = client.get_info().await?;
            info!(node = %name, alias = %info.alias, key = %info.public_key, "connected to node");
            nodes.push(NodeHandle {
                name,
                public_key: info.public_key,
                alias: info.alias,
                network: info.network,
                client,
            });
        }
        Self::new(nodes)
    }

    pub fn default_node(&self) -> &NodeHandle {
        &self.nodes[0]
    }

    pub fn all(&self) -> &[NodeHandle] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn public_keys(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.public_key.clone()).collect()
    }

    pub fn by_key(&self, key: &NodeId) -> Option<&NodeHandle> {
        self.nodes.iter().find(|n| &n.public_key == key)
    }

    /// Resolve a (possibly truncated) hex key; ambiguous prefixes resolve to nothing.
    pub fn by_key_prefix(&self, prefix: &str) -> Option<&NodeHandle> {
        let prefix = prefix.trim().to_ascii_lowercase();
        if prefix.is_empty() {
            return None;
        }
        let mut matches = self
            .nodes
            .iter()
            .filter(|n| n.public_key.as_str().starts_with(&prefix));
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first)
    }

    pub fn others(&self, key: &NodeId) -> impl Iterator<Item = &NodeHandle> + '_ {
        let key = key.clone();
        self.nodes.iter().filter(move |n| n.public_key != key)
    }
}
