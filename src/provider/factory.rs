//! Dedicated per-network providers built from public endpoints

use super::eth::EthClient;
use super::http::{HttpProvider, DEFAULT_RPC_TIMEOUT};
use super::signer::LocalSigner;
use super::Eip1193Provider;
use crate::types::NetworkDescriptor;
use crate::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Builds a provider that talks to a specific network
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    /// Provider for `network`, independent of the wallet's current chain
    async fn provider_for(&self, network: &NetworkDescriptor) -> Result<Arc<dyn Eip1193Provider>>;
}

/// Probes a network's endpoints in priority order and keeps the first healthy one
#[derive(Debug, Clone)]
pub struct RpcProviderFactory {
    timeout: Duration,
    endpoints: HashMap<String, Vec<String>>,
    signer: Option<LocalSigner>,
}

impl Default for RpcProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcProviderFactory {
    /// Use the registry's public endpoints
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_RPC_TIMEOUT,
            endpoints: HashMap::new(),
            signer: None,
        }
    }

    /// Per-request timeout while probing and afterwards
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the endpoint list for a network
    pub fn with_endpoints(mut self, network_key: impl Into<String>, urls: Vec<String>) -> Self {
        self.endpoints.insert(network_key.into(), urls);
        self
    }

    /// Sign transactions on built providers with a local key
    pub fn with_signer(mut self, signer: LocalSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Endpoints tried for a network, in order
    pub fn endpoints(&self, network: &NetworkDescriptor) -> Vec<String> {
        match self.endpoints.get(network.canonical_key) {
            Some(urls) => urls.clone(),
            None => network.rpc_urls.iter().map(|u| u.to_string()).collect(),
        }
    }
}

#[async_trait]
impl ProviderFactory for RpcProviderFactory {
    async fn provider_for(&self, network: &NetworkDescriptor) -> Result<Arc<dyn Eip1193Provider>> {
        for url in self.endpoints(network) {
            let mut provider = match HttpProvider::with_timeout(&url, self.timeout) {
                Ok(provider) => provider,
                Err(e) => {
                    tracing::warn!(network = network.canonical_key, %url, error = %e, "Skipping endpoint");
                    continue;
                }
            };
            if let Some(signer) = &self.signer {
                provider = provider.with_signer(signer.clone());
            }
            let provider: Arc<dyn Eip1193Provider> = Arc::new(provider);

            match EthClient::new(provider.clone()).try_chain_id().await {
                Ok(Some(chain_id)) if chain_id == network.chain_id => {
                    tracing::debug!(network = network.canonical_key, %url, "Using endpoint");
                    return Ok(provider);
                }
                Ok(other) => {
                    tracing::warn!(
                        network = network.canonical_key,
                        %url,
                        reported = ?other,
                        expected = network.chain_id,
                        "Endpoint reports a different chain"
                    );
                }
                Err(e) => {
                    tracing::warn!(network = network.canonical_key, %url, error = %e, "Endpoint unreachable");
                }
            }
        }

        Err(PaymentError::rpc(format!(
            "No reachable RPC endpoint for {}",
            network.display_name
        )))
    }
}
