//! Minimal Solidity ABI encoding for the contract calls this crate makes

use crate::{PaymentError, Result};
use ethereum_types::{Address, H256, U256};
use sha3::{Digest, Keccak256};

/// Size of one ABI word
pub const WORD: usize = 32;

/// A call argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(U256),
    Bool(bool),
    String(String),
    Bytes32(H256),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Token::String(_))
    }

    fn head_word(&self) -> [u8; WORD] {
        let mut word = [0u8; WORD];
        match self {
            Token::Address(address) => word[12..].copy_from_slice(address.as_bytes()),
            Token::Uint(value) => value.to_big_endian(&mut word),
            Token::Bool(flag) => word[WORD - 1] = u8::from(*flag),
            Token::Bytes32(hash) => word.copy_from_slice(hash.as_bytes()),
            Token::String(_) => {}
        }
        word
    }
}

/// Keccak-256 hash
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Four-byte function selector, e.g. `selector("approve(address,uint256)")`
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Encode arguments without a selector
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        match token {
            Token::String(value) => {
                let offset = U256::from(head_len + tail.len());
                let mut word = [0u8; WORD];
                offset.to_big_endian(&mut word);
                head.extend_from_slice(&word);

                let mut len_word = [0u8; WORD];
                U256::from(value.len()).to_big_endian(&mut len_word);
                tail.extend_from_slice(&len_word);
                tail.extend_from_slice(value.as_bytes());
                let padding = (WORD - value.len() % WORD) % WORD;
                tail.extend(std::iter::repeat(0u8).take(padding));
            }
            other => {
                debug_assert!(!other.is_dynamic());
                head.extend_from_slice(&other.head_word());
            }
        }
    }

    head.extend_from_slice(&tail);
    head
}

/// Encode a full call: selector followed by arguments
pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&encode(tokens));
    data
}

/// `0x`-prefixed hex call data
pub fn encode_call_hex(signature: &str, tokens: &[Token]) -> String {
    format!("0x{}", hex::encode(encode_call(signature, tokens)))
}

/// Decode `0x` hex returned by `eth_call`
pub fn decode_hex(data: &str) -> Result<Vec<u8>> {
    hex::decode(data.trim_start_matches("0x"))
        .map_err(|e| PaymentError::rpc(format!("invalid hex return data: {}", e)))
}

fn word(data: &[u8], index: usize) -> Result<&[u8]> {
    let start = index * WORD;
    data.get(start..start + WORD).ok_or_else(|| {
        PaymentError::rpc(format!(
            "return data too short: {} bytes, wanted word {}",
            data.len(),
            index
        ))
    })
}

/// Decode the uint at word `index`
pub fn decode_uint(data: &[u8], index: usize) -> Result<U256> {
    Ok(U256::from_big_endian(word(data, index)?))
}

/// Decode the address at word `index`; the upper 12 bytes must be clear
pub fn decode_address(data: &[u8], index: usize) -> Result<Address> {
    let slot = word(data, index)?;
    if slot[..12].iter().any(|b| *b != 0) {
        return Err(PaymentError::rpc("return word is not an address"));
    }
    Ok(Address::from_slice(&slot[12..]))
}

/// Decode the bool at word `index`
pub fn decode_bool(data: &[u8], index: usize) -> Result<bool> {
    Ok(!decode_uint(data, index)?.is_zero())
}

/// Decode a dynamic string whose offset sits at word `index`
pub fn decode_string(data: &[u8], index: usize) -> Result<String> {
    let offset = to_usize(decode_uint(data, index)?)?;
    let len_word = data
        .get(offset..offset + WORD)
        .ok_or_else(|| PaymentError::rpc("string offset out of range"))?;
    let len = to_usize(U256::from_big_endian(len_word))?;
    let start = offset + WORD;
    let bytes = data
        .get(start..start + len)
        .ok_or_else(|| PaymentError::rpc("string length out of range"))?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| PaymentError::rpc(format!("invalid utf-8 in string: {}", e)))
}

fn to_usize(value: U256) -> Result<usize> {
    if value > U256::from(u32::MAX) {
        return Err(PaymentError::rpc("ABI offset too large"));
    }
    Ok(value.low_u64() as usize)
}
