//! Error types for payment, escrow and fee-distribution workflows

use crate::provider::{ProviderError, ProviderErrorKind};
use std::time::Duration;
use thiserror::Error;

/// Crate result alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Errors surfaced to callers of the payment services
#[derive(Debug, Error)]
pub enum PaymentError {
    /// No wallet session (or no wallet provider at all)
    #[error("No wallet connected")]
    NoWalletConnected,

    /// The network is unknown or the wallet refused to switch to it
    #[error("Unsupported network: {network}")]
    UnsupportedNetwork { network: String },

    /// No contract address is configured for the family on this network
    #[error("Contract address not configured for {family} on network '{network}'")]
    ContractNotConfigured { family: String, network: String },

    /// Malformed or zero address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Wallet balance does not cover the requested amount
    #[error("Insufficient funds: required {required} {symbol}, available {available} {symbol}")]
    InsufficientFunds {
        required: String,
        available: String,
        symbol: String,
    },

    /// The user rejected the request in their wallet
    #[error("Transaction rejected by user")]
    UserRejected,

    /// Requested currency does not match what the network or token provides
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    /// Caller is not the contract owner
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Confirmation was not observed in time; the transaction may still confirm
    #[error("Transaction {hash} not confirmed within {after:?}")]
    TransactionTimeout { hash: String, after: Duration },

    /// The contract call reverted or the entry point is missing
    #[error("Contract call reverted: {0}")]
    ContractCallReverted(String),

    /// The remote configuration store could not be reached
    #[error("Remote store unavailable: {0}")]
    RemoteStoreUnavailable(String),

    /// Fee distribution would violate the combined cap
    #[error("Invalid fee distribution: {0}")]
    InvalidDistribution(String),

    /// Stored record does not exist
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Amount cannot be represented on chain
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Escrow deadline is not in the future
    #[error("Invalid deadline: {0}")]
    InvalidDeadline(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Low-level RPC failure that does not map to a more specific variant
    #[error("RPC error: {0}")]
    Rpc(String),

    /// JSON (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl PaymentError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an RPC error
    pub fn rpc(message: impl Into<String>) -> Self {
        Self::Rpc(message.into())
    }

    /// Create a remote store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::RemoteStoreUnavailable(message.into())
    }

    /// Create an invalid address error
    pub fn invalid_address(message: impl Into<String>) -> Self {
        Self::InvalidAddress(message.into())
    }

    /// Create an invalid amount error
    pub fn invalid_amount(message: impl Into<String>) -> Self {
        Self::InvalidAmount(message.into())
    }

    /// Create a reverted-call error
    pub fn reverted(message: impl Into<String>) -> Self {
        Self::ContractCallReverted(message.into())
    }

    /// Create a contract-not-configured error
    pub fn not_configured(family: impl std::fmt::Display, network: impl Into<String>) -> Self {
        Self::ContractNotConfigured {
            family: family.to_string(),
            network: network.into(),
        }
    }

    /// Create an unsupported-network error
    pub fn unsupported_network(network: impl Into<String>) -> Self {
        Self::UnsupportedNetwork {
            network: network.into(),
        }
    }

    /// Whether the failure happened at contract level (revert, missing entry point)
    /// rather than in the wallet or transport.
    pub fn is_contract_level(&self) -> bool {
        matches!(self, Self::ContractCallReverted(_))
    }

    /// Stable short code used when recording failures
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoWalletConnected => "no_wallet_connected",
            Self::UnsupportedNetwork { .. } => "unsupported_network",
            Self::ContractNotConfigured { .. } => "contract_not_configured",
            Self::InvalidAddress(_) => "invalid_address",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::UserRejected => "user_rejected",
            Self::CurrencyMismatch { .. } => "currency_mismatch",
            Self::PermissionDenied(_) => "permission_denied",
            Self::TransactionTimeout { .. } => "transaction_timeout",
            Self::ContractCallReverted(_) => "contract_call_reverted",
            Self::RemoteStoreUnavailable(_) => "remote_store_unavailable",
            Self::InvalidDistribution(_) => "invalid_distribution",
            Self::RecordNotFound(_) => "record_not_found",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InvalidDeadline(_) => "invalid_deadline",
            Self::Config(_) => "config",
            Self::Rpc(_) => "rpc",
            Self::Serialization(_) => "serialization",
            Self::Http(_) => "http",
        }
    }
}

impl From<ProviderError> for PaymentError {
    fn from(err: ProviderError) -> Self {
        match err.kind() {
            ProviderErrorKind::UserRejected => Self::UserRejected,
            ProviderErrorKind::Unauthorized => Self::NoWalletConnected,
            ProviderErrorKind::UnrecognizedChain => Self::UnsupportedNetwork {
                network: err.to_string(),
            },
            ProviderErrorKind::InsufficientFunds => Self::InsufficientFunds {
                required: "unknown".to_string(),
                available: "unknown".to_string(),
                symbol: "native".to_string(),
            },
            ProviderErrorKind::Reverted | ProviderErrorKind::MethodNotFound => {
                Self::ContractCallReverted(err.to_string())
            }
            ProviderErrorKind::Transport | ProviderErrorKind::Other => Self::Rpc(err.to_string()),
        }
    }
}
