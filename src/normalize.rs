//! Network name normalization
//!
//! Wallets, store documents and users spell networks in many ways
//! ("BNB Smart Chain Testnet", "bnbt", "97", "Polygon Mainnet"). Everything that
//! looks up a contract goes through [`normalize`] first so that one canonical key
//! is used everywhere. Unrecognised input is passed through lowercased; callers
//! treat a key with no configured contract as "not configured", never as an error.

use crate::types::constants::networks::*;
use crate::types::NetworkDescriptor;

/// Canonicalize a network name
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let lower = trimmed.to_lowercase();

    if let Some(key) = all_keys()
        .into_iter()
        .find(|key| key.eq_ignore_ascii_case(trimmed))
    {
        return key.to_string();
    }

    if let Ok(chain_id) = parse_chain_id(&lower) {
        if let Some(key) = chain_id_to_canonical_key(chain_id) {
            return key.to_string();
        }
    }

    if let Some(key) = shorthand(&lower) {
        return key.to_string();
    }

    if let Some(key) = heuristic(&lower) {
        return key.to_string();
    }

    lower
}

/// Canonicalize an optional network name; absent or blank input yields `None`
pub fn normalize_opt(raw: Option<&str>) -> Option<String> {
    raw.map(normalize).filter(|key| !key.is_empty())
}

/// Canonical key for a well-known chain id
pub fn chain_id_to_canonical_key(chain_id: u64) -> Option<&'static str> {
    NetworkDescriptor::by_chain_id(chain_id).map(|n| n.canonical_key)
}

/// Registry entry for any spelling of a network
pub fn descriptor_for(raw: &str) -> Option<&'static NetworkDescriptor> {
    NetworkDescriptor::by_key(&normalize(raw))
}

fn parse_chain_id(input: &str) -> Result<u64, std::num::ParseIntError> {
    match input.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => input.parse(),
    }
}

fn shorthand(lower: &str) -> Option<&'static str> {
    match lower {
        "eth" | "mainnet" | "homestead" => Some(ETHEREUM),
        "bnb" | "bsc" => Some(BINANCE),
        "bnbt" | "tbnb" => Some(BINANCE_TESTNET),
        "matic" | "pol" => Some(POLYGON),
        "maticmum" => Some(MUMBAI),
        "avax" => Some(AVALANCHE),
        "arb" | "arb1" => Some(ARBITRUM),
        "op" | "oeth" => Some(OPTIMISM),
        "ftm" => Some(FANTOM),
        _ => None,
    }
}

fn heuristic(lower: &str) -> Option<&'static str> {
    if lower.contains("binance") || lower.contains("bsc") || lower.contains("bnb") {
        if lower.contains("test") {
            return Some(BINANCE_TESTNET);
        }
        return Some(BINANCE);
    }
    if lower.contains("mumbai") {
        return Some(MUMBAI);
    }
    if lower.contains("polygon") || lower.contains("matic") {
        return Some(POLYGON);
    }
    if lower.contains("avalanche") || lower.contains("avax") {
        return Some(AVALANCHE);
    }
    if lower.contains("arbitrum") {
        return Some(ARBITRUM);
    }
    if lower.contains("optimism") {
        return Some(OPTIMISM);
    }
    if lower.contains("fantom") {
        return Some(FANTOM);
    }
    if lower.contains("ethereum") || lower.contains("eth") {
        return Some(ETHEREUM);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::canonical_key_to_display_name;

    #[test]
    fn test_exact_keys_case_insensitive() {
        assert_eq!(normalize("binanceTestnet"), "binanceTestnet");
        assert_eq!(normalize("BINANCETESTNET"), "binanceTestnet");
        assert_eq!(normalize("  polygon "), "polygon");
    }

    #[test]
    fn test_display_names_and_shorthands() {
        assert_eq!(normalize("BNB Smart Chain Testnet"), "binanceTestnet");
        assert_eq!(normalize("bnbt"), "binanceTestnet");
        assert_eq!(normalize("97"), "binanceTestnet");
        assert_eq!(normalize("0x61"), "binanceTestnet");
        assert_eq!(normalize("BNB Smart Chain"), "binance");
        assert_eq!(normalize("BSC Mainnet"), "binance");
        assert_eq!(normalize("Ethereum Mainnet"), "ethereum");
        assert_eq!(normalize("eth"), "ethereum");
        assert_eq!(normalize("Polygon Mainnet"), "polygon");
        assert_eq!(normalize("Matic"), "polygon");
        assert_eq!(normalize("Polygon Mumbai"), "mumbai");
        assert_eq!(normalize("Avalanche C-Chain"), "avalanche");
        assert_eq!(normalize("Arbitrum One"), "arbitrum");
        assert_eq!(normalize("Optimism"), "optimism");
        assert_eq!(normalize("Fantom Opera"), "fantom");
    }

    #[test]
    fn test_unrecognised_passthrough() {
        assert_eq!(normalize("  Some Chain "), "some chain");
        assert_eq!(normalize("424242"), "424242");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize_opt(None), None);
        assert_eq!(normalize_opt(Some("   ")), None);
        assert_eq!(normalize_opt(Some("bsc")), Some("binance".to_string()));
    }

    #[test]
    fn test_chain_id_round_trip_to_display_name() {
        let expected = [
            (1, "ethereum", "Ethereum Mainnet"),
            (10, "optimism", "Optimism"),
            (56, "binance", "BNB Smart Chain"),
            (97, "binanceTestnet", "BSC Testnet"),
            (137, "polygon", "Polygon"),
            (250, "fantom", "Fantom Opera"),
            (42161, "arbitrum", "Arbitrum One"),
            (43114, "avalanche", "Avalanche C-Chain"),
            (80001, "mumbai", "Polygon Mumbai"),
        ];
        for (chain_id, key, name) in expected {
            let resolved = chain_id_to_canonical_key(chain_id).unwrap();
            assert_eq!(resolved, key);
            assert_eq!(canonical_key_to_display_name(resolved), Some(name));
        }
        assert_eq!(chain_id_to_canonical_key(31337), None);
    }

    #[test]
    fn test_every_display_name_normalizes_to_its_key() {
        for network in NetworkDescriptor::all() {
            assert_eq!(normalize(network.display_name), network.canonical_key);
            assert_eq!(descriptor_for(network.display_name), Some(network));
        }
    }
}
