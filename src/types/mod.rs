//! Core types for networks, contracts, sessions, payments and fee distribution
//!
//! # Architecture
//!
//! - [`network`] - Static registry of supported EVM networks
//! - [`constants`] - Network keys, chain ids, store layout and fallback deployments
//! - [`address`] - Address and hash parsing helpers
//! - [`contract`] - Contract families and address records
//! - [`session`] - Wallet session state and events
//! - [`payment`] - Payment requests and transaction records
//! - [`fees`] - Fee distribution configuration and fixed-point conversions
//!
//! # Examples
//!
//! ```
//! use jobboard_payments::types::{NetworkDescriptor, canonical_key_to_display_name};
//!
//! let bsc_testnet = NetworkDescriptor::by_chain_id(97).unwrap();
//! assert_eq!(bsc_testnet.canonical_key, "binanceTestnet");
//! assert_eq!(canonical_key_to_display_name("binanceTestnet"), Some("BSC Testnet"));
//! ```

pub mod address;
pub mod constants;
pub mod contract;
pub mod fees;
pub mod network;
pub mod payment;
pub mod session;

// Re-export commonly used types
pub use address::{format_address, format_hash, parse_address, parse_hash, parse_non_zero_address};
pub use constants::{chain_ids, networks, tokens, OWNER_ACCESSORS};
pub use contract::{ContractAddressRecord, ContractFamily};
pub use fees::{
    to_display, to_fixed_point, validate_total, DistributionSnapshot, FeeDistributionConfig,
    FeeRole, MAX_COMBINED_PERCENTAGE, PERCENT_BASE,
};
pub use network::{canonical_key_to_display_name, NetworkDescriptor};
pub use payment::{
    CurrencyKind, PaymentReceipt, PaymentRequest, PaymentStatus, PaymentTransactionRecord,
};
pub use session::{ConnectionMethod, SessionEvent, SessionState, WalletSession};
