//! Common constants for networks, store documents and contract deployments

/// Canonical network keys
pub mod networks {
    /// Ethereum mainnet
    pub const ETHEREUM: &str = "ethereum";
    /// BNB Smart Chain mainnet
    pub const BINANCE: &str = "binance";
    /// BNB Smart Chain testnet
    pub const BINANCE_TESTNET: &str = "binanceTestnet";
    /// Polygon PoS mainnet
    pub const POLYGON: &str = "polygon";
    /// Polygon Mumbai testnet
    pub const MUMBAI: &str = "mumbai";
    /// Arbitrum One
    pub const ARBITRUM: &str = "arbitrum";
    /// Optimism mainnet
    pub const OPTIMISM: &str = "optimism";
    /// Avalanche C-Chain
    pub const AVALANCHE: &str = "avalanche";
    /// Fantom Opera
    pub const FANTOM: &str = "fantom";

    /// Map key used for a catch-all contract entry in store documents
    pub const DEFAULT_ENTRY: &str = "default";

    /// Get all canonical keys
    pub fn all_keys() -> Vec<&'static str> {
        vec![
            ETHEREUM,
            BINANCE,
            BINANCE_TESTNET,
            POLYGON,
            MUMBAI,
            ARBITRUM,
            OPTIMISM,
            AVALANCHE,
            FANTOM,
        ]
    }
}

/// Well-known EVM chain identifiers
pub mod chain_ids {
    pub const ETHEREUM: u64 = 1;
    pub const OPTIMISM: u64 = 10;
    pub const BINANCE: u64 = 56;
    pub const BINANCE_TESTNET: u64 = 97;
    pub const POLYGON: u64 = 137;
    pub const FANTOM: u64 = 250;
    pub const ARBITRUM: u64 = 42161;
    pub const AVALANCHE: u64 = 43114;
    pub const MUMBAI: u64 = 80001;
}

/// Remote configuration store layout
pub mod store {
    /// Collection holding the flat configuration documents
    pub const SETTINGS_COLLECTION: &str = "settings";
    /// Payment contract configuration document
    pub const PAYMENT_CONFIG_DOC: &str = "paymentConfig";
    /// Learn-to-earn configuration document
    pub const LEARN2EARN_DOC: &str = "learn2earn";
    /// Instant-jobs configuration document (flat layout)
    pub const INSTANT_JOBS_DOC: &str = "instantJobsConfig";
    /// Per-network instant-jobs escrow documents
    pub const INSTANT_JOBS_CONTRACTS_COLLECTION: &str = "instantJobsContracts";
    /// Field holding the network→address map in flat documents
    pub const CONTRACTS_FIELD: &str = "contracts";
    /// Field holding the address in per-network documents
    pub const CONTRACT_ADDRESS_FIELD: &str = "contractAddress";
    /// Field holding per-network token addresses in the payment config
    pub const TOKENS_FIELD: &str = "tokens";
    /// Payment transaction records
    pub const PAYMENTS_COLLECTION: &str = "payments";
    /// Company entitlement documents
    pub const COMPANIES_COLLECTION: &str = "companies";
    /// Job listing entitlement documents
    pub const JOBS_COLLECTION: &str = "jobs";
    /// Instant-job mirror documents
    pub const INSTANT_JOBS_COLLECTION: &str = "instantJobs";
}

/// Compiled-in contract deployments used when the store has no entry
pub mod fallback {
    use crate::types::ContractFamily;

    /// (family, canonical network key, address)
    pub const CONTRACTS: &[(ContractFamily, &str, &str)] = &[
        (
            ContractFamily::Payment,
            super::networks::BINANCE_TESTNET,
            "0x6a8f3A6bE7e4cbEc0EF8cFf4dF8a2a5c4E6f7f51",
        ),
        (
            ContractFamily::Payment,
            super::networks::POLYGON,
            "0x2b4c5bD7a2B9dE0cE9a0F11e0F1Fa64b2cE3a8D2",
        ),
        (
            ContractFamily::InstantJobsEscrow,
            super::networks::BINANCE_TESTNET,
            "0x9cB1e4F1b0F3A1a7a2E0fB5a0d6c5eA7B3D3E1c4",
        ),
        (
            ContractFamily::LearnToEarn,
            super::networks::BINANCE_TESTNET,
            "0x4E0d3c6B9fC0F1E2a7B8c9D0e1F2a3B4c5D6e7F8",
        ),
    ];
}

/// Stablecoin deployments
pub mod tokens {
    use super::networks::*;

    /// Symbol of the default stablecoin
    pub const USDT: &str = "USDT";

    /// Decimals assumed when the token does not answer `decimals()` in time
    pub const FALLBACK_DECIMALS: u8 = 6;

    /// Get the USDT contract address for a network
    pub fn get_usdt_address(network: &str) -> Option<&'static str> {
        match network {
            ETHEREUM => Some("0xdAC17F958D2ee523a2206206994597C13D831ec7"),
            BINANCE => Some("0x55d398326f99059fF775485246999027B3197955"),
            POLYGON => Some("0xc2132D05D31c914a87C6611C10748AEb04B58e8F"),
            ARBITRUM => Some("0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9"),
            OPTIMISM => Some("0x94b008aA00579c1307B0EF2c499aD98a8ce58e58"),
            AVALANCHE => Some("0x9702230A8Ea53601f5cD2dc00fDBc13d4dF4A8c7"),
            _ => None,
        }
    }
}

/// Accessor names tried, in order, when looking up a contract's owner
pub const OWNER_ACCESSORS: [&str; 5] = ["owner", "getOwner", "OWNER", "admin", "getAdmin"];
