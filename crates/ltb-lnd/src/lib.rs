//! LND adapter (REST gateway).
//!
//! Implements the `ltb-core` LightningNode port against LND's REST API,
//! authenticating with a hex macaroon header over TLS.

use async_trait::async_trait;
use bitcoin::hex::DisplayHex;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use ltb_core::{
    config::NodeConfig,
    domain::{NodeId, PaymentHash},
    errors::Error,
    lightning::{
        Balances, Channel, CreateHodlInvoice, CreateInvoice, CreatedInvoice, Forward, GraphNode,
        Invoice, LightningNode, NodeInfo, PendingChannel, SettledInvoice,
    },
    Result,
};

pub mod wire;

use wire::{is_not_found, upstream_error};

const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";
/// Most recent invoices scanned when looking for new settlements.
const SETTLED_SCAN: u32 = 1_000;
const FORWARDS_MAX: u32 = 1_000;

#[derive(Clone, Debug)]
pub struct LndClient {
    name: String,
    base_url: String,
    http: reqwest::Client,
}

impl LndClient {
    /// Read the macaroon (and TLS certificate, if configured) and build the client.
    pub async fn from_config(
        node: &NodeConfig,
        timeout: Option<std::time::Duration>,
    ) -> Result<Self> {
        let macaroon = tokio::fs::read(&node.macaroon_path).await.map_err(|e| {
            Error::Config(format!(
                "cannot read macaroon {}: {e}",
                node.macaroon_path.display()
            ))
        })?;

        let mut value = HeaderValue::from_str(&macaroon.to_lower_hex_string())
            .map_err(|e| Error::Config(format!("bad macaroon header: {e}")))?;
        value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(MACAROON_HEADER, value);

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(node.accept_invalid_certs);
        if let Some(path) = &node.tls_cert_path {
            let pem = tokio::fs::read(path).await.map_err(|e| {
                Error::Config(format!("cannot read TLS cert {}: {e}", path.display()))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| Error::Config(format!("bad TLS cert {}: {e}", path.display())))?;
            builder = builder.add_root_certificate(cert);
        }
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let http = builder
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;

        Ok(Self {
            name: node.name.clone(),
            base_url: node.rest_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        debug!(node = %self.name, %method, %path, "lnd request");
        let mut req = self.http.request(method, &url);
        if let Some(b) = body {
            req = req.json(&b);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| Error::upstream(503, format!("{}: {e}", self.name)))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::upstream(503, format!("{}: {e}", self.name)))?;
        if !status.is_success() {
            return Err(upstream_error(status.as_u16(), &text));
        }
        serde_json::from_str(&text)
            .map_err(|e| Error::upstream(502, format!("unexpected response from {path}: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.call(Method::GET, path, None).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &(impl Serialize + Sync)) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.call(Method::POST, path, Some(body)).await
    }
}

#[async_trait]
impl LightningNode for LndClient {
    async fn get_info(&self) -> Result<NodeInfo> {
        self.get::<wire::GetInfo>("/v1/getinfo").await?.into_info()
    }

    async fn create_invoice(&self, req: CreateInvoice) -> Result<CreatedInvoice> {
        let resp: wire::AddInvoiceResponse = self
            .post(
                "/v1/invoices",
                &wire::AddInvoice {
                    value: req.tokens.to_string(),
                    memo: &req.description,
                    expiry: req.expiry_secs.to_string(),
                },
            )
            .await?;
        let id = PaymentHash::parse(&wire::b64_to_hex(&resp.r_hash)?)
            .ok_or_else(|| Error::upstream(502, "node returned no payment hash"))?;
        Ok(CreatedInvoice {
            id,
            request: resp.payment_request,
        })
    }

    async fn create_hodl_invoice(&self, req: CreateHodlInvoice) -> Result<CreatedInvoice> {
        let resp: wire::AddInvoiceResponse = self
            .post(
                "/v2/invoices/hodl",
                &wire::AddHodlInvoice {
                    hash: wire::hash_to_b64(&req.id)?,
                    value: req.tokens.to_string(),
                    memo: &req.description,
                    expiry: req.expiry_secs.to_string(),
                },
            )
            .await?;
        Ok(CreatedInvoice {
            id: req.id,
            request: resp.payment_request,
        })
    }

    async fn get_invoice(&self, id: &PaymentHash) -> Result<Option<Invoice>> {
        match self
            .get::<wire::LndInvoice>(&format!("/v1/invoice/{id}"))
            .await
        {
            Ok(inv) => inv.into_invoice().map(Some),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn cancel_invoice(&self, id: &PaymentHash) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                "/v2/invoices/cancel",
                &wire::CancelInvoice {
                    payment_hash: wire::hash_to_b64(id)?,
                },
            )
            .await?;
        Ok(())
    }

    async fn get_balances(&self) -> Result<Balances> {
        let chain: wire::WalletBalance = self.get("/v1/balance/blockchain").await?;
        let channels: wire::ChannelBalance = self.get("/v1/balance/channels").await?;
        Ok(Balances {
            chain_confirmed: chain.confirmed_balance,
            chain_unconfirmed: chain.unconfirmed_balance,
            channel_local: channels.local_balance.sat,
            channel_remote: channels.remote_balance.sat,
            pending_local: channels.pending_open_local_balance.sat,
        })
    }

    async fn get_channels(&self) -> Result<Vec<Channel>> {
        let list: wire::ListChannels = self.get("/v1/channels").await?;
        list.channels.into_iter().map(|c| c.into_channel()).collect()
    }

    async fn get_pending(&self) -> Result<Vec<PendingChannel>> {
        self.get::<wire::PendingChannels>("/v1/channels/pending")
            .await?
            .into_pending()
    }

    async fn get_graph_node(&self, key: &NodeId) -> Result<Option<GraphNode>> {
        match self
            .get::<wire::NodeInfoResponse>(&format!(
                "/v1/graph/node/{key}?include_channels=false"
            ))
            .await
        {
            Ok(node) => node.into_graph_node().map(Some),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_settled_invoices(&self, after_index: u64) -> Result<Vec<SettledInvoice>> {
        let list: wire::ListInvoices = match self
            .get(&format!(
                "/v1/invoices?reversed=true&num_max_invoices={SETTLED_SCAN}"
            ))
            .await
        {
            Ok(list) => list,
            Err(e) if is_not_found(&e) => wire::ListInvoices::default(),
            Err(e) => return Err(e),
        };
        let mut settled = list
            .invoices
            .into_iter()
            .filter(|i| i.is_settled() && i.settle_index > after_index)
            .map(|i| i.into_settled())
            .collect::<Result<Vec<_>>>()?;
        settled.sort_by_key(|s| s.settle_index);
        Ok(settled)
    }

    async fn get_forwards(&self, since: i64) -> Result<Vec<Forward>> {
        let history: wire::ForwardingHistory = self
            .post(
                "/v1/switch",
                &wire::ForwardingHistoryRequest {
                    start_time: since.max(0).to_string(),
                    end_time: chrono::Utc::now().timestamp().to_string(),
                    num_max_events: FORWARDS_MAX,
                },
            )
            .await?;
        Ok(history
            .forwarding_events
            .into_iter()
            .map(Forward::from)
            .filter(|f| f.at >= since)
            .collect())
    }

    async fn get_channel_backup(&self) -> Result<Vec<u8>> {
        self.get::<wire::ChanBackupSnapshot>("/v1/channels/backup")
            .await?
            .into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn node_config(macaroon: PathBuf) -> NodeConfig {
        NodeConfig {
            name: "alpha".to_string(),
            rest_url: "https://127.0.0.1:8080/".to_string(),
            macaroon_path: macaroon,
            tls_cert_path: None,
            accept_invalid_certs: true,
        }
    }

    #[tokio::test]
    async fn builds_from_config_and_trims_url() {
        let dir = std::env::temp_dir().join(format!("ltb-lnd-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("admin.macaroon");
        tokio::fs::write(&path, [0x02, 0x01, 0xff]).await.unwrap();

        let client = LndClient::from_config(&node_config(path), None)
            .await
            .unwrap();
        assert_eq!(client.name, "alpha");
        assert_eq!(client.base_url, "https://127.0.0.1:8080");
    }

    #[tokio::test]
    async fn missing_macaroon_is_a_config_error() {
        let err = LndClient::from_config(&node_config(PathBuf::from("/nonexistent/x.macaroon")), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
