//! JSON-RPC over HTTP

use super::abi;
use super::signer::{LegacyTransaction, LocalSigner};
use super::{Eip1193Provider, ProviderError};
use crate::types::parse_address;
use crate::{PaymentError, Result};
use async_trait::async_trait;
use ethereum_types::{Address, U256};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default request timeout for public endpoints
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// A node endpoint, optionally signing transactions with a local key
#[derive(Debug)]
pub struct HttpProvider {
    url: String,
    client: Client,
    next_id: AtomicU64,
    signer: Option<LocalSigner>,
}

impl HttpProvider {
    /// Create a provider for an endpoint
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_RPC_TIMEOUT)
    }

    /// Create a provider with a custom request timeout
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        url::Url::parse(&url)
            .map_err(|e| PaymentError::config(format!("Invalid RPC URL '{}': {}", url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url,
            client,
            next_id: AtomicU64::new(1),
            signer: None,
        })
    }

    /// Sign `eth_sendTransaction` locally with this key
    pub fn with_signer(mut self, signer: LocalSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Forward a request to the node
    async fn rpc_call(&self, method: &str, params: Value) -> std::result::Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::debug!(url = %self.url, method, id, "JSON-RPC request");

        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            tracing::warn!(url = %self.url, method, %status, "JSON-RPC HTTP failure");
            return Err(ProviderError::Transport(format!("HTTP {}: {}", status, text)));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        if let Some(error) = payload.get("error") {
            return Err(ProviderError::from_error_object(error));
        }

        payload
            .get("result")
            .cloned()
            .ok_or_else(|| ProviderError::InvalidResponse("missing result".to_string()))
    }

    async fn send_signed(
        &self,
        signer: &LocalSigner,
        params: &Value,
    ) -> std::result::Result<Value, ProviderError> {
        let tx = params
            .get(0)
            .ok_or_else(|| ProviderError::rpc(-32602, "missing transaction object"))?;

        let to = match tx.get("to").and_then(Value::as_str) {
            Some(to) => Some(
                parse_address(to).map_err(|e| ProviderError::rpc(-32602, e.to_string()))?,
            ),
            None => None,
        };
        let value = quantity_field(tx, "value")?.unwrap_or_default();
        let data = match tx.get("data").and_then(Value::as_str) {
            Some(data) => {
                abi::decode_hex(data).map_err(|e| ProviderError::rpc(-32602, e.to_string()))?
            }
            None => Vec::new(),
        };

        let chain_id = match quantity_field(tx, "chainId")? {
            Some(chain_id) => chain_id.low_u64(),
            None => self.quantity("eth_chainId", json!([])).await?.low_u64(),
        };
        let from = format!("{:?}", signer.address());
        let nonce = self
            .quantity("eth_getTransactionCount", json!([from, "pending"]))
            .await?;
        let gas_price = match quantity_field(tx, "gasPrice")? {
            Some(price) => price,
            None => self.quantity("eth_gasPrice", json!([])).await?,
        };
        let gas = match quantity_field(tx, "gas")? {
            Some(gas) => gas,
            None => {
                let mut estimate = tx.clone();
                if let Some(obj) = estimate.as_object_mut() {
                    obj.insert("from".to_string(), json!(from));
                    obj.remove("chainId");
                }
                self.quantity("eth_estimateGas", json!([estimate])).await?
            }
        };

        let raw = signer
            .sign_transaction(&LegacyTransaction {
                nonce,
                gas_price,
                gas,
                to,
                value,
                data,
                chain_id,
            })
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        tracing::debug!(%from, chain_id, "Submitting locally signed transaction");
        self.rpc_call(
            "eth_sendRawTransaction",
            json!([format!("0x{}", hex::encode(raw))]),
        )
        .await
    }

    async fn quantity(&self, method: &str, params: Value) -> std::result::Result<U256, ProviderError> {
        let value = self.rpc_call(method, params).await?;
        parse_quantity(&value)
    }

    fn accounts(&self) -> Vec<Address> {
        self.signer.iter().map(LocalSigner::address).collect()
    }
}

#[async_trait]
impl Eip1193Provider for HttpProvider {
    async fn request(&self, method: &str, params: Value) -> std::result::Result<Value, ProviderError> {
        match (method, &self.signer) {
            ("eth_accounts" | "eth_requestAccounts", Some(_)) => Ok(json!(self
                .accounts()
                .iter()
                .map(|a| format!("{:?}", a))
                .collect::<Vec<_>>())),
            ("eth_sendTransaction", Some(signer)) => self.send_signed(signer, &params).await,
            ("wallet_switchEthereumChain" | "wallet_addEthereumChain", _) => Err(
                ProviderError::rpc(super::CODE_UNSUPPORTED_METHOD, "Node endpoints cannot switch chains"),
            ),
            _ => self.rpc_call(method, params).await,
        }
    }

    fn label(&self) -> String {
        self.url.clone()
    }
}

/// Parse a `0x` hex quantity
pub fn parse_quantity(value: &Value) -> std::result::Result<U256, ProviderError> {
    let text = value
        .as_str()
        .ok_or_else(|| ProviderError::InvalidResponse(format!("expected quantity, got {}", value)))?;
    let digits = text.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(digits, 16)
        .map_err(|_| ProviderError::InvalidResponse(format!("invalid quantity '{}'", text)))
}

fn quantity_field(tx: &Value, field: &str) -> std::result::Result<Option<U256>, ProviderError> {
    tx.get(field).filter(|v| !v.is_null()).map(parse_quantity).transpose()
}
