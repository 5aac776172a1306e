//! Provider pinned to a forced network
//!
//! Reads go to a dedicated endpoint for the target network; account and signing
//! requests go to the wallet session with the target `chainId` stamped on every
//! transaction. The wallet is never asked to switch chains.

use super::{Eip1193Provider, ProviderError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

const WALLET_METHODS: &[&str] = &[
    "eth_accounts",
    "eth_requestAccounts",
    "eth_sendTransaction",
    "eth_sign",
    "personal_sign",
    "eth_signTypedData_v4",
];

/// Reads from `read`, signs through `wallet`
pub struct WalletRoutedProvider {
    read: Arc<dyn Eip1193Provider>,
    wallet: Arc<dyn Eip1193Provider>,
    chain_id: u64,
}

impl WalletRoutedProvider {
    pub fn new(
        read: Arc<dyn Eip1193Provider>,
        wallet: Arc<dyn Eip1193Provider>,
        chain_id: u64,
    ) -> Self {
        Self {
            read,
            wallet,
            chain_id,
        }
    }

    /// Target chain
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

#[async_trait]
impl Eip1193Provider for WalletRoutedProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        if method == "eth_chainId" {
            return Ok(json!(format!("0x{:x}", self.chain_id)));
        }
        if !WALLET_METHODS.contains(&method) {
            return self.read.request(method, params).await;
        }

        let mut params = params;
        if method == "eth_sendTransaction" {
            if let Some(tx) = params.get_mut(0).and_then(Value::as_object_mut) {
                tx.insert(
                    "chainId".to_string(),
                    json!(format!("0x{:x}", self.chain_id)),
                );
            }
        }
        tracing::debug!(method, chain_id = self.chain_id, "Routing to wallet");
        self.wallet.request(method, params).await
    }

    fn label(&self) -> String {
        format!("{} via {}", self.read.label(), self.wallet.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProvider;
    use ethereum_types::Address;

    #[tokio::test]
    async fn test_routing() {
        let account = Address::from_low_u64_be(7);
        let read = Arc::new(MockProvider::new(137, account).with_label("polygon-rpc"));
        let wallet = Arc::new(MockProvider::new(97, account).with_label("walletconnect"));
        let routed = WalletRoutedProvider::new(read.clone(), wallet.clone(), 137);

        assert_eq!(routed.request("eth_chainId", json!([])).await.unwrap(), json!("0x89"));
        routed.request("eth_getBalance", json!(["0x0", "latest"])).await.unwrap();
        routed
            .request(
                "eth_sendTransaction",
                json!([{"to": "0x0000000000000000000000000000000000000001"}]),
            )
            .await
            .unwrap();

        assert_eq!(read.methods(), vec!["eth_getBalance"]);
        assert_eq!(wallet.methods(), vec!["eth_sendTransaction"]);
        assert_eq!(wallet.sent()[0]["chainId"], "0x89");
        assert_eq!(wallet.count("wallet_switchEthereumChain"), 0);
        assert_eq!(routed.label(), "polygon-rpc via walletconnect");
    }
}
