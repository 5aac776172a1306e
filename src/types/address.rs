//! Address and hash parsing helpers

use crate::{PaymentError, Result};
use ethereum_types::{Address, H256};

/// Parse a `0x`-prefixed (or bare) 20-byte hex address
pub fn parse_address(input: &str) -> Result<Address> {
    let trimmed = input.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(hex_part)
        .map_err(|_| PaymentError::invalid_address(format!("'{}' is not valid hex", input)))?;
    if bytes.len() != 20 {
        return Err(PaymentError::invalid_address(format!(
            "'{}' must be 20 bytes, got {}",
            input,
            bytes.len()
        )));
    }
    Ok(Address::from_slice(&bytes))
}

/// Parse an address and reject the zero address
pub fn parse_non_zero_address(input: &str) -> Result<Address> {
    let address = parse_address(input)?;
    if address.is_zero() {
        return Err(PaymentError::invalid_address("zero address"));
    }
    Ok(address)
}

/// Parse a 32-byte transaction hash
pub fn parse_hash(input: &str) -> Result<H256> {
    let bytes = hex::decode(input.trim().trim_start_matches("0x"))
        .map_err(|_| PaymentError::rpc(format!("invalid hash '{}'", input)))?;
    if bytes.len() != 32 {
        return Err(PaymentError::rpc(format!("invalid hash length in '{}'", input)));
    }
    Ok(H256::from_slice(&bytes))
}

/// Full lowercase `0x` form of an address
pub fn format_address(address: &Address) -> String {
    format!("{:?}", address)
}

/// Full lowercase `0x` form of a hash
pub fn format_hash(hash: &H256) -> String {
    format!("{:?}", hash)
}
