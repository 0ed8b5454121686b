//! HTTP client for the Signum node API.
//!
//! Uses the read-only `GET {node}/api?requestType=...` endpoints:
//!
//! | Call                          | requestType                 |
//! |-------------------------------|-----------------------------|
//! | block by height / chain tip   | `getBlock`                  |
//! | unconfirmed transactions      | `getUnconfirmedTransactions`|
//!
//! The node answers application errors with HTTP 200 and an `errorCode`
//! field. For a height lookup any such error means the block does not exist yet.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use chainwalker_core::error::WalkerError;
use chainwalker_core::ledger::LedgerClient;
use chainwalker_core::types::{Block, Transaction};

/// [`LedgerClient`] talking to a Signum node over HTTP.
pub struct SignumClient {
    node_host: String,
    api_url: String,
    http: reqwest::Client,
}

impl SignumClient {
    /// Create a client for `node_host`, e.g. `http://localhost:8125`.
    pub fn new(node_host: impl Into<String>, timeout: Duration) -> Result<Self, WalkerError> {
        let node_host = node_host.into();
        if node_host.trim().is_empty() {
            return Err(WalkerError::Configuration("node host is empty".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WalkerError::Configuration(format!("failed to build HTTP client: {e}")))?;
        let api_url = format!("{}/api", node_host.trim_end_matches('/'));
        Ok(Self {
            node_host,
            api_url,
            http,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn request(&self, params: &[(&str, String)]) -> Result<Value, WalkerError> {
        tracing::trace!(url = %self.api_url, ?params, "node request");
        let response = self
            .http
            .get(&self.api_url)
            .query(params)
            .send()
            .await
            .map_err(|e| WalkerError::Ledger(format!("request to {} failed: {e}", self.node_host)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WalkerError::Ledger(format!("HTTP {status}: {body}")));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| WalkerError::Ledger(format!("invalid JSON from {}: {e}", self.node_host)))
    }
}

#[async_trait]
impl LedgerClient for SignumClient {
    async fn get_block_by_height(
        &self,
        height: Option<u64>,
        include_transactions: bool,
    ) -> Result<Block, WalkerError> {
        let mut params = vec![
            ("requestType", "getBlock".to_string()),
            ("includeTransactions", include_transactions.to_string()),
        ];
        if let Some(h) = height {
            params.push(("height", h.to_string()));
        }
        let body = self.request(&params).await?;
        decode_block(body, height, include_transactions)
    }

    async fn get_unconfirmed_transactions(&self) -> Result<Vec<Transaction>, WalkerError> {
        let body = self
            .request(&[("requestType", "getUnconfirmedTransactions".to_string())])
            .await?;
        decode_unconfirmed(body)
    }

    fn endpoint(&self) -> &str {
        &self.node_host
    }
}

/// Decode a `getBlock` response.
///
/// Without `include_transactions` the node reports transaction ids only; those
/// are dropped so the block carries an empty transaction list.
pub fn decode_block(
    mut body: Value,
    height: Option<u64>,
    include_transactions: bool,
) -> Result<Block, WalkerError> {
    if let Some(message) = api_error(&body) {
        return Err(match height {
            Some(height) => {
                tracing::trace!(height, %message, "block not available");
                WalkerError::BlockNotFound { height }
            }
            None => WalkerError::Ledger(message),
        });
    }
    if !include_transactions {
        if let Some(obj) = body.as_object_mut() {
            obj.remove("transactions");
        }
    }
    serde_json::from_value(body)
        .map_err(|e| WalkerError::Ledger(format!("unexpected getBlock response: {e}")))
}

/// Decode a `getUnconfirmedTransactions` response.
pub fn decode_unconfirmed(body: Value) -> Result<Vec<Transaction>, WalkerError> {
    if let Some(message) = api_error(&body) {
        return Err(WalkerError::Ledger(message));
    }
    match body.get("unconfirmedTransactions") {
        Some(list) => serde_json::from_value(list.clone()).map_err(|e| {
            WalkerError::Ledger(format!("unexpected getUnconfirmedTransactions response: {e}"))
        }),
        None => Ok(Vec::new()),
    }
}

fn api_error(body: &Value) -> Option<String> {
    let code = body.get("errorCode")?;
    let description = body
        .get("errorDescription")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    Some(format!("node error {code}: {description}"))
}
