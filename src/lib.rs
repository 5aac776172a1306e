//! # jobboard-payments
//!
//! Multi-network contract payments, escrow and fee distribution for a Web3 job board.
//!
//! ## Features
//!
//! - **Network registry and normalizer**: one canonical key per supported EVM network,
//!   whatever name, alias or chain id the caller starts from
//! - **Contract address resolution**: remote configuration store first, compiled-in
//!   deployments as fallback, with a short-lived cache
//! - **Wallet sessions**: injected and WalletConnect wallets behind one EIP-1193
//!   provider trait, with a broadcast stream of session events
//! - **Plan payments**: native-currency and ERC-20 (USDT) payments with balance,
//!   allowance and confirmation handling, recorded in the store
//! - **Fee distribution**: owner-gated reads and updates of the four-role split,
//!   capped at 30% combined
//! - **Instant-jobs escrow**: create, accept, complete, pay and dispute escrowed jobs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use jobboard_payments::{
//!     provider::{HttpProvider, LocalSigner, RpcProviderFactory},
//!     store::InMemoryConfigStore,
//!     types::{ConnectionMethod, PaymentRequest},
//!     ContractResolver, PaymentOrchestrator, SessionManager,
//! };
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> jobboard_payments::Result<()> {
//!     let resolver = Arc::new(ContractResolver::new(Arc::new(InMemoryConfigStore::new())));
//!     let session = SessionManager::default();
//!
//!     // any EIP-1193 provider; a browser bridge or WalletConnect client in practice
//!     let signer = LocalSigner::from_private_key(&std::env::var("PRIVATE_KEY").unwrap_or_default())?;
//!     let wallet = Arc::new(
//!         HttpProvider::new("https://data-seed-prebsc-1-s1.binance.org:8545")?.with_signer(signer),
//!     );
//!     session.connect(ConnectionMethod::Injected, Some(wallet)).await?;
//!
//!     let payments = PaymentOrchestrator::new(
//!         session,
//!         resolver,
//!         Arc::new(RpcProviderFactory::new()),
//!     );
//!     let receipt = payments
//!         .pay(&PaymentRequest::usdt("basic-plan", "company-1", Decimal::from(10)))
//!         .await?;
//!     println!("paid in {}", receipt.transaction_hash);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **`types`**: networks, contract families, payment records and fee configuration
//! - **`normalize`**: network name normalization
//! - **`store`**: document store trait with in-memory and Firestore REST backends
//! - **`resolver`**: contract address resolution
//! - **`provider`**: EIP-1193 provider trait, JSON-RPC client, ABI codec and signer
//! - **`session`**: wallet session state machine
//! - **`transactions`**: contract reads, submissions and ERC-20 helpers
//! - **`payments`**: plan payment orchestration
//! - **`fees`**: fee distribution bookkeeping
//! - **`escrow`**: instant-jobs escrow
//! - **`config`**: service configuration
//! - **`gateway`**: read-only HTTP gateway (feature-gated)
//!
//! ## Optional Features
//!
//! - **`gateway`** (default): axum routes used by the `payments-gateway` binary

pub mod config;
pub mod error;
pub mod escrow;
pub mod fees;
pub mod normalize;
pub mod payments;
pub mod provider;
pub mod resolver;
pub mod session;
pub mod store;
pub mod transactions;
pub mod types;

#[cfg(feature = "gateway")]
pub mod gateway;

// Re-exports for convenience
pub use config::PaymentsConfig;
pub use error::{PaymentError, Result};
pub use escrow::EscrowService;
pub use fees::FeeBookkeeper;
pub use normalize::normalize;
pub use payments::PaymentOrchestrator;
pub use provider::{Eip1193Provider, ProviderFactory, RpcProviderFactory};
pub use resolver::ContractResolver;
pub use session::SessionManager;
pub use store::{ConfigStore, InMemoryConfigStore};

/// Current version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_reexports() {
        assert_eq!(normalize("BSC Testnet"), "binanceTestnet");
        assert!(PaymentsConfig::default().validate().is_ok());
    }
}
