//! Wallet session management
//!
//! [`SessionManager`] is a cloneable handle around the one active wallet session.
//! Connect, disconnect, account and chain events all go through it, and every
//! state change is published on a broadcast channel. There is no replay: a
//! subscriber that joins late reads [`SessionManager::state`] and
//! [`SessionManager::current`] instead.
//!
//! Operations that span several awaits (a payment, a fee update) take a
//! [`SessionSnapshot`] at the start and keep using it even if the wallet switches
//! chains halfway through.

use crate::normalize::{chain_id_to_canonical_key, descriptor_for, normalize};
use crate::provider::{EthClient, Eip1193Provider, ProviderErrorKind};
use crate::types::{
    canonical_key_to_display_name, ConnectionMethod, SessionEvent, SessionState, WalletSession,
};
use crate::{PaymentError, Result};
use ethereum_types::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

/// Network name used when the chain could not be detected
pub const FALLBACK_NETWORK_NAME: &str = "Fallback";

const EVENT_CAPACITY: usize = 64;

/// Chain detection retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Attempts before falling back to the read-only provider
    pub detect_attempts: u32,
    /// Backoff unit; attempt `n` waits `n × backoff`
    pub detect_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            detect_attempts: 3,
            detect_backoff: Duration::from_secs(1),
        }
    }
}

/// Session and provider captured at the start of an operation
#[derive(Clone)]
pub struct SessionSnapshot {
    pub session: WalletSession,
    pub provider: Arc<dyn Eip1193Provider>,
}

impl SessionSnapshot {
    /// Typed client over the captured provider
    pub fn client(&self) -> EthClient {
        EthClient::new(self.provider.clone())
    }
}

impl std::fmt::Debug for SessionSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field("session", &self.session)
            .field("provider", &self.provider.label())
            .finish()
    }
}

#[derive(Default)]
struct Inner {
    state: SessionState,
    session: Option<WalletSession>,
    provider: Option<Arc<dyn Eip1193Provider>>,
    forced_network: Option<String>,
}

/// Handle to the active wallet session
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<RwLock<Inner>>,
    events: broadcast::Sender<SessionEvent>,
    config: SessionConfig,
    fallback: Option<Arc<dyn Eip1193Provider>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl SessionManager {
    /// Create a disconnected manager
    pub fn new(config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            events,
            config,
            fallback: None,
        }
    }

    /// Read-only provider consulted when chain detection keeps failing
    pub fn with_fallback_provider(mut self, provider: Arc<dyn Eip1193Provider>) -> Self {
        self.fallback = Some(provider);
        self
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state
    }

    pub async fn current(&self) -> Option<WalletSession> {
        self.inner.read().await.session.clone()
    }

    pub async fn forced_network(&self) -> Option<String> {
        self.inner.read().await.forced_network.clone()
    }

    /// Capture the session and provider for one operation
    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let inner = self.inner.read().await;
        match (&inner.session, &inner.provider) {
            (Some(session), Some(provider)) if inner.state == SessionState::Connected => {
                Ok(SessionSnapshot {
                    session: session.clone(),
                    provider: provider.clone(),
                })
            }
            _ => Err(PaymentError::NoWalletConnected),
        }
    }

    fn publish(&self, event: SessionEvent) {
        tracing::debug!(event = event.name(), "Session event");
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Connect through `provider`; `None` means no wallet is available
    pub async fn connect(
        &self,
        method: ConnectionMethod,
        provider: Option<Arc<dyn Eip1193Provider>>,
    ) -> Result<WalletSession> {
        let Some(provider) = provider else {
            tracing::warn!(?method, "No wallet provider available");
            return Err(PaymentError::NoWalletConnected);
        };

        self.inner.write().await.state = SessionState::Connecting;
        let client = EthClient::new(provider.clone());

        let accounts = match client.request_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                tracing::warn!(?method, error = %e, "Account request failed");
                self.reset().await;
                return Err(e);
            }
        };
        let Some(address) = accounts.first().copied() else {
            self.reset().await;
            return Err(PaymentError::NoWalletConnected);
        };

        let (chain_id, network_name) = self.detect_chain(&client).await;
        let mut inner = self.inner.write().await;
        let session = WalletSession {
            address,
            chain_id,
            network_name,
            connection_method: method,
            forced_network: inner.forced_network.clone(),
        };
        inner.state = SessionState::Connected;
        inner.session = Some(session.clone());
        inner.provider = Some(provider);
        drop(inner);

        tracing::info!(address = ?session.address, chain_id, network = %session.network_name, "Wallet connected");
        self.publish(SessionEvent::Connected(session.clone()));
        Ok(session)
    }

    async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.state = SessionState::Disconnected;
        inner.session = None;
        inner.provider = None;
    }

    /// Retry chain detection; some wallets report 0 right after a switch
    async fn detect_chain(&self, client: &EthClient) -> (u64, String) {
        let attempts = self.config.detect_attempts.max(1);
        for attempt in 1..=attempts {
            match client.try_chain_id().await {
                Ok(Some(chain_id)) => return (chain_id, network_name(chain_id)),
                Ok(None) => tracing::debug!(attempt, "Wallet reported no chain id"),
                Err(e) => tracing::debug!(attempt, error = %e, "Chain detection failed"),
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.detect_backoff * attempt).await;
            }
        }

        tracing::warn!(attempts, "Chain detection exhausted, using fallback provider");
        let chain_id = match &self.fallback {
            Some(fallback) => EthClient::new(fallback.clone())
                .try_chain_id()
                .await
                .ok()
                .flatten()
                .unwrap_or_default(),
            None => 0,
        };
        (chain_id, FALLBACK_NETWORK_NAME.to_string())
    }

    /// Explicit disconnect
    pub async fn disconnect(&self) {
        let was_connected = {
            let inner = self.inner.read().await;
            inner.state != SessionState::Disconnected
        };
        self.reset().await;
        if was_connected {
            tracing::info!("Wallet disconnected");
            self.publish(SessionEvent::Disconnected);
        }
    }

    /// Wallet reported a new account list; empty means the user disconnected
    pub async fn handle_accounts_changed(&self, accounts: Vec<Address>) {
        let Some(address) = accounts.first().copied() else {
            self.disconnect().await;
            return;
        };
        let mut inner = self.inner.write().await;
        let Some(session) = inner.session.as_mut() else {
            return;
        };
        if session.address == address {
            return;
        }
        session.address = address;
        drop(inner);
        self.publish(SessionEvent::AccountChanged { address });
    }

    /// Wallet reported a chain change; the last report wins
    pub async fn handle_chain_changed(&self, chain_id: u64) {
        let name = network_name(chain_id);
        let mut inner = self.inner.write().await;
        let Some(session) = inner.session.as_mut() else {
            return;
        };
        session.chain_id = chain_id;
        session.network_name = name.clone();
        drop(inner);
        self.publish(SessionEvent::ChainChanged {
            chain_id,
            network_name: name,
        });
    }

    /// Ask the wallet to move to `network`, adding the chain if the wallet lacks it
    pub async fn switch_network(&self, network: &str) -> Result<()> {
        let snapshot = self.snapshot().await?;
        let descriptor =
            descriptor_for(network).ok_or_else(|| PaymentError::unsupported_network(network))?;
        if snapshot.session.chain_id == descriptor.chain_id {
            return Ok(());
        }

        let client = snapshot.client();
        tracing::info!(network = descriptor.canonical_key, "Requesting network switch");
        match client.switch_chain(descriptor.chain_id).await {
            Ok(()) => {}
            Err(e) if e.kind() == ProviderErrorKind::UnrecognizedChain => {
                tracing::info!(network = descriptor.canonical_key, "Chain unknown to wallet, adding it");
                client.add_chain(descriptor).await?;
                client.switch_chain(descriptor.chain_id).await?;
            }
            Err(e) => return Err(e.into()),
        }

        self.handle_chain_changed(descriptor.chain_id).await;
        Ok(())
    }

    /// Pin payments to `network` without switching the wallet
    pub async fn force_network(&self, network: &str) -> Result<String> {
        let descriptor =
            descriptor_for(network).ok_or_else(|| PaymentError::unsupported_network(network))?;
        let key = descriptor.canonical_key.to_string();
        self.set_forced(Some(key.clone())).await;
        Ok(key)
    }

    /// Remove a forced network
    pub async fn clear_forced_network(&self) {
        self.set_forced(None).await;
    }

    async fn set_forced(&self, network_key: Option<String>) {
        let mut inner = self.inner.write().await;
        if inner.forced_network == network_key {
            return;
        }
        inner.forced_network = network_key.clone();
        if let Some(session) = inner.session.as_mut() {
            session.forced_network = network_key.clone();
        }
        drop(inner);
        self.publish(SessionEvent::ForcedNetwork { network_key });
    }
}

/// Display name for a chain id, or `Chain <id>` for unknown chains
pub fn network_name(chain_id: u64) -> String {
    chain_id_to_canonical_key(chain_id)
        .and_then(canonical_key_to_display_name)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Chain {}", chain_id))
}

/// Canonical key of the network a session is on, if recognised
pub fn session_network_key(session: &WalletSession) -> Option<String> {
    if session.network_name == FALLBACK_NETWORK_NAME {
        return chain_id_to_canonical_key(session.chain_id).map(str::to_string);
    }
    let key = normalize(&session.network_name);
    canonical_key_to_display_name(&key).map(|_| key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProvider;
    use crate::provider::ProviderError;
    use serde_json::json;

    fn fast() -> SessionConfig {
        SessionConfig {
            detect_attempts: 3,
            detect_backoff: Duration::from_millis(1),
        }
    }

    fn account() -> Address {
        Address::from_low_u64_be(0xbeef)
    }

    #[tokio::test]
    async fn test_connect_without_provider() {
        let manager = SessionManager::new(fast());
        let err = manager
            .connect(ConnectionMethod::Injected, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::NoWalletConnected));
        assert_eq!(manager.state().await, SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_user_rejection_returns_to_disconnected() {
        let mock = Arc::new(MockProvider::new(97, account()));
        mock.reject_accounts(ProviderError::rpc(4001, "User rejected the request."));
        let manager = SessionManager::new(fast());

        let err = manager
            .connect(ConnectionMethod::Injected, Some(mock))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::UserRejected));
        assert_eq!(manager.state().await, SessionState::Disconnected);
        assert!(manager.snapshot().await.is_err());
    }

    #[tokio::test]
    async fn test_connect_publishes_event() {
        let mock = Arc::new(MockProvider::new(97, account()));
        let manager = SessionManager::new(fast());
        let mut events = manager.subscribe();

        let session = manager
            .connect(ConnectionMethod::Injected, Some(mock))
            .await
            .unwrap();
        assert_eq!(session.chain_id, 97);
        assert_eq!(session.network_name, "BSC Testnet");
        assert_eq!(manager.state().await, SessionState::Connected);

        match events.recv().await.unwrap() {
            SessionEvent::Connected(s) => assert_eq!(s.address, account()),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chain_detection_retries() {
        let mock = Arc::new(MockProvider::new(137, account()));
        mock.script_chain_ids(vec![
            Ok(json!("0x0")),
            Err(ProviderError::Transport("reset".to_string())),
        ]);
        let manager = SessionManager::new(fast());

        let session = manager
            .connect(ConnectionMethod::Injected, Some(mock.clone()))
            .await
            .unwrap();
        assert_eq!(session.chain_id, 137);
        assert_eq!(mock.count("eth_chainId"), 3);
    }

    #[tokio::test]
    async fn test_chain_detection_falls_back() {
        let wallet = Arc::new(MockProvider::new(1, account()));
        wallet.script_chain_ids(vec![Ok(json!("0x0")), Ok(json!("0x0")), Ok(json!("0x0"))]);
        let fallback = Arc::new(MockProvider::new(56, account()).with_label("bsc-rpc"));
        let manager = SessionManager::new(fast()).with_fallback_provider(fallback);

        let session = manager
            .connect(ConnectionMethod::Injected, Some(wallet))
            .await
            .unwrap();
        assert_eq!(session.network_name, FALLBACK_NETWORK_NAME);
        assert_eq!(session.chain_id, 56);
        assert_eq!(session_network_key(&session).as_deref(), Some("binance"));
    }

    #[tokio::test]
    async fn test_account_and_chain_events() {
        let mock = Arc::new(MockProvider::new(97, account()));
        let manager = SessionManager::new(fast());
        manager
            .connect(ConnectionMethod::Injected, Some(mock))
            .await
            .unwrap();
        let mut events = manager.subscribe();

        let other = Address::from_low_u64_be(0xcafe);
        manager.handle_accounts_changed(vec![other]).await;
        manager.handle_chain_changed(137).await;
        manager.handle_chain_changed(56).await;

        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::AccountChanged { address: other }
        );
        assert_eq!(events.recv().await.unwrap().name(), "chainChanged");
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::ChainChanged {
                chain_id: 56,
                network_name: "BNB Smart Chain".to_string()
            }
        );
        assert_eq!(manager.current().await.unwrap().chain_id, 56);

        manager.handle_accounts_changed(Vec::new()).await;
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Disconnected);
        assert_eq!(manager.state().await, SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_switch_network_adds_unknown_chain() {
        let mock = Arc::new(MockProvider::new(97, account()));
        let manager = SessionManager::new(fast());
        manager
            .connect(ConnectionMethod::Injected, Some(mock.clone()))
            .await
            .unwrap();

        manager.switch_network("Polygon Mainnet").await.unwrap();
        assert_eq!(
            mock.methods()
                .into_iter()
                .filter(|m| m.starts_with("wallet_"))
                .collect::<Vec<_>>(),
            vec![
                "wallet_switchEthereumChain",
                "wallet_addEthereumChain",
                "wallet_switchEthereumChain"
            ]
        );
        assert_eq!(manager.current().await.unwrap().chain_id, 137);

        assert!(matches!(
            manager.switch_network("moonbeam").await,
            Err(PaymentError::UnsupportedNetwork { .. })
        ));
    }

    #[tokio::test]
    async fn test_forced_network() {
        let manager = SessionManager::new(fast());
        let mut events = manager.subscribe();

        assert_eq!(manager.force_network("bnbt").await.unwrap(), "binanceTestnet");
        assert_eq!(manager.forced_network().await.as_deref(), Some("binanceTestnet"));
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::ForcedNetwork {
                network_key: Some("binanceTestnet".to_string())
            }
        );

        manager.clear_forced_network().await;
        assert_eq!(manager.forced_network().await, None);
        assert!(manager.force_network("nowhere").await.is_err());
    }
}
