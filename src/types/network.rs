//! Network registry

use super::constants::{chain_ids, networks};
use serde::Serialize;

/// Static description of a supported EVM network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDescriptor {
    /// Key used for contract address lookups
    pub canonical_key: &'static str,
    /// EIP-155 chain id
    pub chain_id: u64,
    /// Human-readable name
    pub display_name: &'static str,
    /// Native currency symbol
    pub native_currency_symbol: &'static str,
    /// Native currency decimals
    pub native_decimals: u8,
    /// Public JSON-RPC endpoints in priority order
    pub rpc_urls: &'static [&'static str],
    /// Block explorer base URL
    pub block_explorer_url: &'static str,
    /// Whether this is a testnet
    pub is_testnet: bool,
}

static NETWORKS: &[NetworkDescriptor] = &[
    NetworkDescriptor {
        canonical_key: networks::ETHEREUM,
        chain_id: chain_ids::ETHEREUM,
        display_name: "Ethereum Mainnet",
        native_currency_symbol: "ETH",
        native_decimals: 18,
        rpc_urls: &[
            "https://eth.llamarpc.com",
            "https://rpc.ankr.com/eth",
            "https://cloudflare-eth.com",
        ],
        block_explorer_url: "https://etherscan.io",
        is_testnet: false,
    },
    NetworkDescriptor {
        canonical_key: networks::BINANCE,
        chain_id: chain_ids::BINANCE,
        display_name: "BNB Smart Chain",
        native_currency_symbol: "BNB",
        native_decimals: 18,
        rpc_urls: &[
            "https://bsc-dataseed.binance.org",
            "https://bsc-dataseed1.defibit.io",
            "https://bsc.publicnode.com",
        ],
        block_explorer_url: "https://bscscan.com",
        is_testnet: false,
    },
    NetworkDescriptor {
        canonical_key: networks::BINANCE_TESTNET,
        chain_id: chain_ids::BINANCE_TESTNET,
        display_name: "BSC Testnet",
        native_currency_symbol: "tBNB",
        native_decimals: 18,
        rpc_urls: &[
            "https://data-seed-prebsc-1-s1.binance.org:8545",
            "https://data-seed-prebsc-2-s1.binance.org:8545",
            "https://bsc-testnet.publicnode.com",
        ],
        block_explorer_url: "https://testnet.bscscan.com",
        is_testnet: true,
    },
    NetworkDescriptor {
        canonical_key: networks::POLYGON,
        chain_id: chain_ids::POLYGON,
        display_name: "Polygon",
        native_currency_symbol: "MATIC",
        native_decimals: 18,
        rpc_urls: &["https://polygon-rpc.com", "https://rpc.ankr.com/polygon"],
        block_explorer_url: "https://polygonscan.com",
        is_testnet: false,
    },
    NetworkDescriptor {
        canonical_key: networks::MUMBAI,
        chain_id: chain_ids::MUMBAI,
        display_name: "Polygon Mumbai",
        native_currency_symbol: "MATIC",
        native_decimals: 18,
        rpc_urls: &[
            "https://rpc-mumbai.maticvigil.com",
            "https://polygon-mumbai-bor.publicnode.com",
        ],
        block_explorer_url: "https://mumbai.polygonscan.com",
        is_testnet: true,
    },
    NetworkDescriptor {
        canonical_key: networks::ARBITRUM,
        chain_id: chain_ids::ARBITRUM,
        display_name: "Arbitrum One",
        native_currency_symbol: "ETH",
        native_decimals: 18,
        rpc_urls: &["https://arb1.arbitrum.io/rpc", "https://rpc.ankr.com/arbitrum"],
        block_explorer_url: "https://arbiscan.io",
        is_testnet: false,
    },
    NetworkDescriptor {
        canonical_key: networks::OPTIMISM,
        chain_id: chain_ids::OPTIMISM,
        display_name: "Optimism",
        native_currency_symbol: "ETH",
        native_decimals: 18,
        rpc_urls: &["https://mainnet.optimism.io", "https://rpc.ankr.com/optimism"],
        block_explorer_url: "https://optimistic.etherscan.io",
        is_testnet: false,
    },
    NetworkDescriptor {
        canonical_key: networks::AVALANCHE,
        chain_id: chain_ids::AVALANCHE,
        display_name: "Avalanche C-Chain",
        native_currency_symbol: "AVAX",
        native_decimals: 18,
        rpc_urls: &[
            "https://api.avax.network/ext/bc/C/rpc",
            "https://rpc.ankr.com/avalanche",
        ],
        block_explorer_url: "https://snowtrace.io",
        is_testnet: false,
    },
    NetworkDescriptor {
        canonical_key: networks::FANTOM,
        chain_id: chain_ids::FANTOM,
        display_name: "Fantom Opera",
        native_currency_symbol: "FTM",
        native_decimals: 18,
        rpc_urls: &["https://rpc.ftm.tools", "https://rpc.ankr.com/fantom"],
        block_explorer_url: "https://ftmscan.com",
        is_testnet: false,
    },
];

impl NetworkDescriptor {
    /// All registered networks
    pub fn all() -> &'static [NetworkDescriptor] {
        NETWORKS
    }

    /// Look up a network by canonical key (exact match)
    pub fn by_key(key: &str) -> Option<&'static NetworkDescriptor> {
        NETWORKS.iter().find(|n| n.canonical_key == key)
    }

    /// Look up a network by chain id
    pub fn by_chain_id(chain_id: u64) -> Option<&'static NetworkDescriptor> {
        NETWORKS.iter().find(|n| n.chain_id == chain_id)
    }

    /// Chain id as a `0x`-prefixed hex quantity
    pub fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }

    /// Explorer link for a transaction hash
    pub fn explorer_tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.block_explorer_url, tx_hash)
    }

    /// Parameters for `wallet_addEthereumChain`
    pub fn add_chain_params(&self) -> serde_json::Value {
        serde_json::json!([{
            "chainId": self.chain_id_hex(),
            "chainName": self.display_name,
            "nativeCurrency": {
                "name": self.native_currency_symbol,
                "symbol": self.native_currency_symbol,
                "decimals": self.native_decimals,
            },
            "rpcUrls": self.rpc_urls,
            "blockExplorerUrls": [self.block_explorer_url],
        }])
    }
}

/// Human-readable name for a canonical key
pub fn canonical_key_to_display_name(key: &str) -> Option<&'static str> {
    NetworkDescriptor::by_key(key).map(|n| n.display_name)
}
