//! Wallet session types

use ethereum_types::Address;
use serde::{Deserialize, Serialize};

/// How the wallet is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionMethod {
    /// Browser-injected provider (MetaMask and similar)
    Injected,
    /// WalletConnect session
    WalletConnect,
}

/// Connection state of the session manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// The active wallet session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSession {
    pub address: Address,
    pub chain_id: u64,
    pub network_name: String,
    pub connection_method: ConnectionMethod,
    /// Network forced for WalletConnect payments, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forced_network: Option<String>,
}

/// Notifications published by the session manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected(WalletSession),
    Disconnected,
    ChainChanged { chain_id: u64, network_name: String },
    AccountChanged { address: Address },
    ForcedNetwork { network_key: Option<String> },
}

impl SessionEvent {
    /// Event name mirrored for legacy consumers
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Connected(_) => "walletConnected",
            SessionEvent::Disconnected => "walletDisconnected",
            SessionEvent::ChainChanged { .. } => "chainChanged",
            SessionEvent::AccountChanged { .. } => "accountChanged",
            SessionEvent::ForcedNetwork { .. } => "web3ForcedNetwork",
        }
    }
}
