use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use tracing::debug;

use crate::{domain::UserId, errors::Error, formatting::MAX_EXPIRY_HOURS, Result};

/// One Lightning node the bot operates, reached over the LND REST API.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct NodeConfig {
    pub name: String,
    pub rest_url: String,
    pub macaroon_path: PathBuf,
    #[serde(default)]
    pub tls_cert_path: Option<PathBuf>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

/// Typed, immutable runtime configuration.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub owner_id: Option<UserId>,
    pub connect_code: Option<String>,
    pub telegram_safe_limit: usize,

    // Nodes
    pub nodes: Vec<NodeConfig>,
    /// `None` means node calls never time out.
    pub request_timeout: Option<Duration>,

    // Invoices and trades
    pub invoice_expiry_secs: u64,
    pub trade_expiry_hours: u32,

    // Notifications
    pub notify_enabled: bool,
    pub notify_interval: Duration,
}

impl Config {
    /// Load from the process environment, after merging a `.env` file if present.
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(Error::Config(format!("invalid .env file: {e}"))),
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let telegram_bot_token = var("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;

        let owner_id = match var("TELEGRAM_OWNER_ID") {
            Some(v) => Some(UserId(v.parse::<i64>().map_err(|_| {
                Error::Config(format!("TELEGRAM_OWNER_ID is not a user id: {v}"))
            })?)),
            None => None,
        };
        let connect_code = var("TELEGRAM_CONNECT_CODE");

        let nodes_file = var("LTB_NODES_FILE")
            .map(PathBuf::from)
            .or_else(|| var("HOME").map(|h| PathBuf::from(h).join(".ltb/nodes.json")));
        let nodes = match nodes_file.as_deref().filter(|p| p.is_file()) {
            Some(path) => load_nodes_file(path)?,
            None => single_node_from(&var).into_iter().collect(),
        };
        if nodes.is_empty() {
            return Err(Error::Config(
                "no nodes configured: create LTB_NODES_FILE or set LND_REST_URL and LND_MACAROON_PATH"
                    .to_string(),
            ));
        }

        let request_timeout = parse_num::<u64>(&var, "LND_REQUEST_TIMEOUT_SECS")?
            .filter(|s| *s > 0)
            .map(Duration::from_secs);

        let trade_expiry_hours = parse_num::<u32>(&var, "TRADE_EXPIRY_HOURS")?.unwrap_or(24);
        if !(1..=MAX_EXPIRY_HOURS).contains(&trade_expiry_hours) {
            return Err(Error::Config(format!(
                "TRADE_EXPIRY_HOURS must be between 1 and {MAX_EXPIRY_HOURS}"
            )));
        }

        Ok(Self {
            telegram_bot_token,
            owner_id,
            connect_code,
            telegram_safe_limit: parse_num(&var, "TELEGRAM_SAFE_LIMIT")?
                .unwrap_or(4000usize)
                .clamp(200, 4096),
            nodes,
            request_timeout,
            invoice_expiry_secs: parse_num(&var, "INVOICE_EXPIRY_SECS")?.unwrap_or(86_400),
            trade_expiry_hours,
            notify_enabled: parse_bool(&var, "NOTIFY_ENABLED").unwrap_or(true),
            notify_interval: Duration::from_secs(
                parse_num::<u64>(&var, "NOTIFY_INTERVAL_SECS")?
                    .unwrap_or(30)
                    .max(1),
            ),
        })
    }
}

fn load_nodes_file(path: &Path) -> Result<Vec<NodeConfig>> {
    let raw = fs::read_to_string(path)?;
    let nodes: Vec<NodeConfig> = serde_json::from_str(&raw)
        .map_err(|e| Error::Config(format!("invalid nodes file {}: {e}", path.display())))?;
    if let Some(dup) = nodes
        .iter()
        .enumerate()
        .find(|(i, n)| nodes[..*i].iter().any(|o| o.name == n.name))
    {
        return Err(Error::Config(format!("duplicate node name: {}", dup.1.name)));
    }
    Ok(nodes)
}

fn single_node_from(var: &impl Fn(&str) -> Option<String>) -> Option<NodeConfig> {
    Some(NodeConfig {
        name: var("LND_NODE_NAME").unwrap_or_else(|| "lnd".to_string()),
        rest_url: var("LND_REST_URL")?,
        macaroon_path: PathBuf::from(var("LND_MACAROON_PATH")?),
        tls_cert_path: var("LND_TLS_CERT_PATH").map(PathBuf::from),
        accept_invalid_certs: parse_bool(var, "LND_ACCEPT_INVALID_CERTS").unwrap_or(false),
    })
}

fn parse_bool(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    var(key).map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn parse_num<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    var(key)
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| Error::Config(format!("{key} is not a valid number: {v}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    const SINGLE: &[(&str, &str)] = &[
        ("TELEGRAM_BOT_TOKEN", "123:abc"),
        ("LTB_NODES_FILE", "/nonexistent/nodes.json"),
        ("LND_REST_URL", "https://localhost:8080"),
        ("LND_MACAROON_PATH", "/tmp/admin.macaroon"),
    ];

    #[test]
    fn single_node_defaults() {
        let cfg = Config::from_lookup(lookup(SINGLE)).unwrap();
        assert_eq!(cfg.nodes.len(), 1);
        assert_eq!(cfg.nodes[0].name, "lnd");
        assert!(!cfg.nodes[0].accept_invalid_certs);
        assert_eq!(cfg.owner_id, None);
        assert_eq!(cfg.request_timeout, None);
        assert_eq!(cfg.invoice_expiry_secs, 86_400);
        assert_eq!(cfg.trade_expiry_hours, 24);
        assert!(cfg.notify_enabled);
        assert_eq!(cfg.notify_interval, Duration::from_secs(30));
        assert_eq!(cfg.telegram_safe_limit, 4000);
    }

    #[test]
    fn missing_token_or_nodes_is_a_config_error() {
        let err = Config::from_lookup(lookup(&SINGLE[1..])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = Config::from_lookup(lookup(&SINGLE[..2])).unwrap_err();
        assert!(err.to_string().contains("no nodes configured"));
    }

    #[test]
    fn owner_and_timeout_are_parsed() {
        let mut pairs = SINGLE.to_vec();
        pairs.push(("TELEGRAM_OWNER_ID", "42"));
        pairs.push(("LND_REQUEST_TIMEOUT_SECS", "15"));
        pairs.push(("NOTIFY_ENABLED", "off"));
        let cfg = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(cfg.owner_id, Some(UserId(42)));
        assert_eq!(cfg.request_timeout, Some(Duration::from_secs(15)));
        assert!(!cfg.notify_enabled);

        let mut bad = SINGLE.to_vec();
        bad.push(("TELEGRAM_OWNER_ID", "me"));
        assert!(Config::from_lookup(lookup(&bad)).is_err());
    }

    #[test]
    fn trade_expiry_is_range_checked() {
        for hours in ["0", "8761"] {
            let mut pairs = SINGLE.to_vec();
            pairs.push(("TRADE_EXPIRY_HOURS", hours));
            let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(err.to_string().contains("TRADE_EXPIRY_HOURS"), "{hours}");
        }

        let mut pairs = SINGLE.to_vec();
        pairs.push(("TRADE_EXPIRY_HOURS", "8760"));
        assert_eq!(Config::from_lookup(lookup(&pairs)).unwrap().trade_expiry_hours, 8_760);
    }

    #[test]
    fn nodes_file_wins_over_single_node_vars() {
        let dir = env::temp_dir().join(format!("ltb-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("nodes.json");
        fs::write(
            &path,
            r#"[
                {"name": "alpha", "rest_url": "https://a:8080", "macaroon_path": "/a.macaroon"},
                {"name": "beta", "rest_url": "https://b:8080", "macaroon_path": "/b.macaroon",
                 "tls_cert_path": "/b.cert", "accept_invalid_certs": true}
            ]"#,
        )
        .unwrap();

        let path_str = path.display().to_string();
        let pairs = [
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("LTB_NODES_FILE", path_str.as_str()),
            ("LND_REST_URL", "https://localhost:8080"),
            ("LND_MACAROON_PATH", "/tmp/admin.macaroon"),
        ];
        let cfg = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(cfg.nodes.len(), 2);
        assert_eq!(cfg.nodes[1].tls_cert_path, Some(PathBuf::from("/b.cert")));
        assert!(cfg.nodes[1].accept_invalid_certs);

        fs::remove_dir_all(&dir).unwrap();
    }
}
