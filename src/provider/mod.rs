//! EIP-1193 provider abstraction
//!
//! Every chain interaction goes through [`Eip1193Provider::request`], the same
//! single-method surface browser wallets and WalletConnect sessions expose. The
//! module ships a JSON-RPC over HTTP implementation ([`http::HttpProvider`]), a
//! typed client on top of any provider ([`eth::EthClient`]), endpoint probing for
//! dedicated per-network providers ([`factory::RpcProviderFactory`]) and a provider
//! that reads from one network while signing through the wallet
//! ([`routed::WalletRoutedProvider`]).
//!
//! Provider failures are structured: the JSON-RPC error code travels with the
//! message and [`ProviderError::kind`] classifies it once, so the services above
//! never match on message text.
//!
//! # Examples
//!
//! ```no_run
//! use jobboard_payments::provider::{eth::EthClient, http::HttpProvider};
//! use std::sync::Arc;
//!
//! # async fn example() -> jobboard_payments::Result<()> {
//! let provider = HttpProvider::new("https://bsc-testnet.publicnode.com")?;
//! let client = EthClient::new(Arc::new(provider));
//! let chain_id = client.chain_id().await?;
//! assert_eq!(chain_id, 97);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod abi;
pub mod eth;
pub mod factory;
pub mod http;
pub mod routed;
pub mod signer;
pub mod units;

#[cfg(test)]
pub(crate) mod mock;

pub use eth::{EthClient, TransactionReceipt, TransactionRequest};
pub use factory::{ProviderFactory, RpcProviderFactory};
pub use http::HttpProvider;
pub use routed::WalletRoutedProvider;
pub use signer::LocalSigner;

/// EIP-1193 user rejected the request
pub const CODE_USER_REJECTED: i64 = 4001;
/// EIP-1193 account or method not authorized
pub const CODE_UNAUTHORIZED: i64 = 4100;
/// EIP-1193 method not supported by the provider
pub const CODE_UNSUPPORTED_METHOD: i64 = 4200;
/// Chain not added to the wallet (`wallet_switchEthereumChain`)
pub const CODE_UNRECOGNIZED_CHAIN: i64 = 4902;
/// Geth-style execution reverted
pub const CODE_EXECUTION_REVERTED: i64 = 3;
/// Generic server error used by most nodes for transaction failures
pub const CODE_SERVER_ERROR: i64 = -32000;
/// JSON-RPC method not found
pub const CODE_METHOD_NOT_FOUND: i64 = -32601;

/// A wallet or node exposing the EIP-1193 `request` method
#[async_trait]
pub trait Eip1193Provider: Send + Sync {
    /// Submit a JSON-RPC request
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    /// Short label used in logs and for fallback sessions
    fn label(&self) -> String {
        "provider".to_string()
    }
}

/// Failure reported by a provider
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// JSON-RPC error object returned by the wallet or node
    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    /// The request never produced a JSON-RPC response
    #[error("transport error: {0}")]
    Transport(String),

    /// The response could not be interpreted
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Coarse classification of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    UserRejected,
    Unauthorized,
    UnrecognizedChain,
    InsufficientFunds,
    Reverted,
    MethodNotFound,
    Transport,
    Other,
}

impl ProviderError {
    /// Create a JSON-RPC error without data
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Build from a JSON-RPC `error` object
    pub fn from_error_object(error: &Value) -> Self {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        Self::Rpc {
            code,
            message,
            data: error.get("data").cloned(),
        }
    }

    /// JSON-RPC code, if any
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Classify the failure
    ///
    /// Codes are authoritative. Messages are consulted only for wallets that wrap
    /// rejections and node-side failures under generic codes.
    pub fn kind(&self) -> ProviderErrorKind {
        let (code, message) = match self {
            Self::Rpc { code, message, .. } => (*code, message.to_lowercase()),
            Self::Transport(_) => return ProviderErrorKind::Transport,
            Self::InvalidResponse(_) => return ProviderErrorKind::Other,
        };

        match code {
            CODE_USER_REJECTED => return ProviderErrorKind::UserRejected,
            CODE_UNAUTHORIZED => return ProviderErrorKind::Unauthorized,
            CODE_UNRECOGNIZED_CHAIN => return ProviderErrorKind::UnrecognizedChain,
            CODE_EXECUTION_REVERTED => return ProviderErrorKind::Reverted,
            CODE_METHOD_NOT_FOUND | CODE_UNSUPPORTED_METHOD => {
                return ProviderErrorKind::MethodNotFound
            }
            _ => {}
        }

        if message.contains("user rejected") || message.contains("user denied") {
            ProviderErrorKind::UserRejected
        } else if message.contains("insufficient funds") {
            ProviderErrorKind::InsufficientFunds
        } else if message.contains("execution reverted") || message.contains("revert") {
            ProviderErrorKind::Reverted
        } else if message.contains("unrecognized chain") {
            ProviderErrorKind::UnrecognizedChain
        } else {
            ProviderErrorKind::Other
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classification_by_code() {
        assert_eq!(
            ProviderError::rpc(4001, "whatever").kind(),
            ProviderErrorKind::UserRejected
        );
        assert_eq!(
            ProviderError::rpc(4100, "not authorized").kind(),
            ProviderErrorKind::Unauthorized
        );
        assert_eq!(
            ProviderError::rpc(4902, "Unrecognized chain ID \"0x61\"").kind(),
            ProviderErrorKind::UnrecognizedChain
        );
        assert_eq!(
            ProviderError::rpc(3, "execution reverted").kind(),
            ProviderErrorKind::Reverted
        );
        assert_eq!(
            ProviderError::rpc(-32601, "the method payForPlan does not exist").kind(),
            ProviderErrorKind::MethodNotFound
        );
    }

    #[test]
    fn test_classification_of_wrapped_messages() {
        assert_eq!(
            ProviderError::rpc(-32000, "insufficient funds for gas * price + value").kind(),
            ProviderErrorKind::InsufficientFunds
        );
        assert_eq!(
            ProviderError::rpc(-32603, "MetaMask Tx Signature: User denied transaction signature.")
                .kind(),
            ProviderErrorKind::UserRejected
        );
        assert_eq!(
            ProviderError::rpc(-32000, "execution reverted: not enough allowance").kind(),
            ProviderErrorKind::Reverted
        );
        assert_eq!(
            ProviderError::rpc(-32000, "nonce too low").kind(),
            ProviderErrorKind::Other
        );
        assert_eq!(
            ProviderError::Transport("timed out".to_string()).kind(),
            ProviderErrorKind::Transport
        );
    }

    #[test]
    fn test_from_error_object() {
        let err = ProviderError::from_error_object(&json!({
            "code": 3,
            "message": "execution reverted",
            "data": "0x08c379a0"
        }));
        assert_eq!(err.code(), Some(3));
        assert_eq!(err.to_string(), "JSON-RPC error 3: execution reverted");
        match err {
            ProviderError::Rpc { data, .. } => assert_eq!(data, Some(json!("0x08c379a0"))),
            other => panic!("unexpected {:?}", other),
        }
    }
}
