//! Typed Ethereum client over any EIP-1193 provider

use super::http::parse_quantity;
use super::{Eip1193Provider, ProviderError};
use crate::types::{format_address, format_hash, parse_address, parse_hash, NetworkDescriptor};
use crate::{PaymentError, Result};
use ethereum_types::{Address, H256, U256};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

/// A transaction to submit through `eth_sendTransaction`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
    pub chain_id: Option<u64>,
}

impl TransactionRequest {
    /// Create a call to `to` with no value
    pub fn new(to: Address) -> Self {
        Self {
            from: None,
            to,
            value: U256::zero(),
            data: Vec::new(),
            chain_id: None,
        }
    }

    /// Set the sender
    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    /// Attach native value
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Set call data
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Pin the transaction to a chain
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// JSON-RPC transaction object
    pub fn to_json(&self) -> Value {
        let mut tx = Map::new();
        if let Some(from) = &self.from {
            tx.insert("from".to_string(), json!(format_address(from)));
        }
        tx.insert("to".to_string(), json!(format_address(&self.to)));
        if !self.value.is_zero() {
            tx.insert("value".to_string(), json!(format!("0x{:x}", self.value)));
        }
        if !self.data.is_empty() {
            tx.insert(
                "data".to_string(),
                json!(format!("0x{}", hex::encode(&self.data))),
            );
        }
        if let Some(chain_id) = self.chain_id {
            tx.insert("chainId".to_string(), json!(format!("0x{:x}", chain_id)));
        }
        Value::Object(tx)
    }
}

/// Mined transaction outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: H256,
    pub block_number: u64,
    /// `true` when execution succeeded
    pub status: bool,
}

impl TransactionReceipt {
    fn from_json(value: &Value) -> std::result::Result<Self, ProviderError> {
        let hash = value
            .get("transactionHash")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::InvalidResponse("receipt without hash".to_string()))?;
        let transaction_hash = parse_hash(hash)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let block_number = value
            .get("blockNumber")
            .map(parse_quantity)
            .transpose()?
            .unwrap_or_default()
            .low_u64();
        // pre-Byzantium receipts have no status field
        let status = match value.get("status") {
            Some(status) if !status.is_null() => !parse_quantity(status)?.is_zero(),
            _ => true,
        };
        Ok(Self {
            transaction_hash,
            block_number,
            status,
        })
    }
}

/// Typed wrapper around a provider
#[derive(Clone)]
pub struct EthClient {
    provider: Arc<dyn Eip1193Provider>,
}

impl std::fmt::Debug for EthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthClient")
            .field("provider", &self.provider.label())
            .finish()
    }
}

impl EthClient {
    /// Wrap a provider
    pub fn new(provider: Arc<dyn Eip1193Provider>) -> Self {
        Self { provider }
    }

    /// Underlying provider
    pub fn provider(&self) -> &Arc<dyn Eip1193Provider> {
        &self.provider
    }

    /// Current chain id
    pub async fn chain_id(&self) -> Result<u64> {
        self.try_chain_id()
            .await?
            .ok_or_else(|| PaymentError::rpc("provider reported no chain id"))
    }

    /// Current chain id; `None` when the provider answers null or zero
    pub async fn try_chain_id(&self) -> std::result::Result<Option<u64>, ProviderError> {
        let value = self.provider.request("eth_chainId", json!([])).await?;
        if value.is_null() {
            return Ok(None);
        }
        let chain_id = parse_quantity(&value)?.low_u64();
        Ok((chain_id != 0).then_some(chain_id))
    }

    /// Accounts already authorized
    pub async fn accounts(&self) -> Result<Vec<Address>> {
        let value = self.provider.request("eth_accounts", json!([])).await?;
        parse_accounts(&value)
    }

    /// Prompt the wallet for accounts
    pub async fn request_accounts(&self) -> Result<Vec<Address>> {
        let value = self
            .provider
            .request("eth_requestAccounts", json!([]))
            .await?;
        parse_accounts(&value)
    }

    /// Native balance
    pub async fn balance(&self, address: Address) -> Result<U256> {
        let value = self
            .provider
            .request(
                "eth_getBalance",
                json!([format_address(&address), "latest"]),
            )
            .await?;
        Ok(parse_quantity(&value)?)
    }

    /// Read-only contract call
    pub async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>> {
        let value = self
            .provider
            .request(
                "eth_call",
                json!([
                    {"to": format_address(&to), "data": format!("0x{}", hex::encode(data))},
                    "latest"
                ]),
            )
            .await?;
        let text = value
            .as_str()
            .ok_or_else(|| PaymentError::rpc(format!("unexpected eth_call result {}", value)))?;
        super::abi::decode_hex(text)
    }

    /// Submit a transaction and return its hash
    pub async fn send_transaction(&self, tx: &TransactionRequest) -> Result<H256> {
        let value = self
            .provider
            .request("eth_sendTransaction", json!([tx.to_json()]))
            .await?;
        let hash = value
            .as_str()
            .ok_or_else(|| PaymentError::rpc(format!("unexpected transaction hash {}", value)))?;
        parse_hash(hash)
    }

    /// Receipt, or `None` while the transaction is pending
    pub async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        let value = self
            .provider
            .request("eth_getTransactionReceipt", json!([format_hash(&hash)]))
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(TransactionReceipt::from_json(&value)?))
    }

    /// Poll until the transaction is mined or `limit` elapses
    ///
    /// Failed polls are logged and retried; only `limit` ends the wait. Timing
    /// out does not cancel anything on chain; the transaction may still confirm
    /// later. A mined but reverted transaction is an error.
    pub async fn wait_for_receipt(
        &self,
        hash: H256,
        poll_interval: Duration,
        limit: Duration,
    ) -> Result<TransactionReceipt> {
        let started = Instant::now();
        let poll = async {
            loop {
                match self.transaction_receipt(hash).await {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(tx = %format_hash(&hash), error = %e, "Receipt poll failed, retrying")
                    }
                }
                sleep(poll_interval).await;
            }
        };

        let receipt = match timeout(limit, poll).await {
            Ok(receipt) => receipt,
            Err(_) => {
                tracing::warn!(tx = %format_hash(&hash), elapsed = ?started.elapsed(), "Confirmation timed out");
                return Err(PaymentError::TransactionTimeout {
                    hash: format_hash(&hash),
                    after: limit,
                });
            }
        };

        if !receipt.status {
            return Err(PaymentError::reverted(format!(
                "transaction {} reverted in block {}",
                format_hash(&hash),
                receipt.block_number
            )));
        }
        Ok(receipt)
    }

    /// Ask the wallet to switch chains
    pub async fn switch_chain(&self, chain_id: u64) -> std::result::Result<(), ProviderError> {
        self.provider
            .request(
                "wallet_switchEthereumChain",
                json!([{"chainId": format!("0x{:x}", chain_id)}]),
            )
            .await
            .map(|_| ())
    }

    /// Ask the wallet to add a chain
    pub async fn add_chain(
        &self,
        network: &NetworkDescriptor,
    ) -> std::result::Result<(), ProviderError> {
        self.provider
            .request("wallet_addEthereumChain", network.add_chain_params())
            .await
            .map(|_| ())
    }
}

fn parse_accounts(value: &Value) -> Result<Vec<Address>> {
    let list = value
        .as_array()
        .ok_or_else(|| PaymentError::rpc(format!("unexpected accounts result {}", value)))?;
    list.iter()
        .map(|entry| {
            entry
                .as_str()
                .ok_or_else(|| PaymentError::invalid_address(entry.to_string()))
                .and_then(parse_address)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::abi::Token;
    use crate::provider::mock::MockProvider;
    use crate::provider::ProviderErrorKind;

    fn account() -> Address {
        Address::from_low_u64_be(0xa11ce)
    }

    #[test]
    fn test_transaction_json() {
        let tx = TransactionRequest::new(Address::from_low_u64_be(1))
            .with_from(account())
            .with_value(U256::from(255))
            .with_data(vec![0xde, 0xad])
            .with_chain_id(97);
        let json = tx.to_json();
        assert_eq!(json["value"], "0xff");
        assert_eq!(json["data"], "0xdead");
        assert_eq!(json["chainId"], "0x61");
        assert_eq!(json["to"], "0x0000000000000000000000000000000000000001");

        let bare = TransactionRequest::new(Address::from_low_u64_be(1)).to_json();
        assert!(bare.get("value").is_none());
        assert!(bare.get("from").is_none());
    }

    #[tokio::test]
    async fn test_reads() {
        let mock = Arc::new(MockProvider::new(97, account()));
        mock.set_balance(U256::exp10(18));
        let token = Address::from_low_u64_be(0x70);
        mock.on_call(token, "decimals()", &[Token::Uint(U256::from(6))]);

        let client = EthClient::new(mock.clone());
        assert_eq!(client.chain_id().await.unwrap(), 97);
        assert_eq!(client.accounts().await.unwrap(), vec![account()]);
        assert_eq!(client.balance(account()).await.unwrap(), U256::exp10(18));

        let data = client
            .call(token, crate::provider::abi::encode_call("decimals()", &[]))
            .await
            .unwrap();
        assert_eq!(crate::provider::abi::decode_uint(&data, 0).unwrap(), U256::from(6));
    }

    #[tokio::test]
    async fn test_zero_chain_id_is_none() {
        let mock = Arc::new(MockProvider::new(97, account()));
        mock.script_chain_ids(vec![Ok(json!("0x0")), Ok(Value::Null)]);
        let client = EthClient::new(mock);
        assert_eq!(client.try_chain_id().await.unwrap(), None);
        assert_eq!(client.try_chain_id().await.unwrap(), None);
        assert_eq!(client.try_chain_id().await.unwrap(), Some(97));
    }

    #[tokio::test]
    async fn test_wait_for_receipt() {
        let mock = Arc::new(MockProvider::new(97, account()));
        let client = EthClient::new(mock.clone());
        let hash = client
            .send_transaction(&TransactionRequest::new(Address::from_low_u64_be(1)))
            .await
            .unwrap();

        let receipt = client
            .wait_for_receipt(hash, Duration::from_millis(5), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(receipt.block_number, 42);
        assert!(receipt.status);

        mock.revert_receipt(&format_hash(&hash));
        let err = client
            .wait_for_receipt(hash, Duration::from_millis(5), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_contract_level());
    }

    #[tokio::test]
    async fn test_wait_for_receipt_survives_failed_polls() {
        let mock = Arc::new(MockProvider::new(97, account()));
        let client = EthClient::new(mock.clone());
        let hash = client
            .send_transaction(&TransactionRequest::new(Address::from_low_u64_be(1)))
            .await
            .unwrap();
        mock.fail_receipt_polls(2);

        let receipt = client
            .wait_for_receipt(hash, Duration::from_millis(5), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(receipt.block_number, 42);
        assert_eq!(mock.count("eth_getTransactionReceipt"), 3);
    }

    #[tokio::test]
    async fn test_wait_for_receipt_with_failing_node_times_out() {
        let mock = Arc::new(MockProvider::new(97, account()));
        mock.fail_receipt_polls(usize::MAX);
        let client = EthClient::new(mock);
        let err = client
            .wait_for_receipt(H256::repeat_byte(1), Duration::from_millis(5), Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::TransactionTimeout { .. }));
    }

    #[tokio::test]
    async fn test_wait_for_receipt_times_out() {
        let mock = Arc::new(MockProvider::new(97, account()));
        mock.keep_receipts_pending(true);
        let client = EthClient::new(mock);
        let err = client
            .wait_for_receipt(H256::repeat_byte(1), Duration::from_millis(5), Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::TransactionTimeout { .. }));
    }

    #[tokio::test]
    async fn test_switch_unknown_chain_reports_4902() {
        let mock = Arc::new(MockProvider::new(97, account()));
        let client = EthClient::new(mock.clone());
        let err = client.switch_chain(137).await.unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::UnrecognizedChain);

        let polygon = NetworkDescriptor::by_key("polygon").unwrap();
        client.add_chain(polygon).await.unwrap();
        client.switch_chain(137).await.unwrap();
        assert_eq!(mock.chain_id(), 137);
    }
}
