//! Local transaction signing
//!
//! Used by [`super::http::HttpProvider`] when a service key (not a browser wallet)
//! signs transactions, e.g. the gateway or integration environments.

use super::abi::keccak256;
use crate::{PaymentError, Result};
use ethereum_types::{Address, H256, U256};
use k256::ecdsa::{SigningKey, VerifyingKey};
use rlp::RlpStream;
use secp256k1::{Message, SecretKey, SECP256K1};

/// Legacy (type 0) transaction with EIP-155 replay protection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas: U256,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTransaction {
    /// Keccak hash of the EIP-155 signing payload
    pub fn signing_hash(&self) -> H256 {
        let mut stream = RlpStream::new_list(9);
        self.append_fields(&mut stream);
        stream.append(&trim_u256(U256::from(self.chain_id)));
        stream.append(&Vec::<u8>::new());
        stream.append(&Vec::<u8>::new());
        H256::from(keccak256(&stream.out()))
    }

    fn append_fields(&self, stream: &mut RlpStream) {
        stream.append(&trim_u256(self.nonce));
        stream.append(&trim_u256(self.gas_price));
        stream.append(&trim_u256(self.gas));
        stream.append(&self.to.map(|to| to.as_bytes().to_vec()).unwrap_or_default());
        stream.append(&trim_u256(self.value));
        stream.append(&self.data);
    }
}

/// Private-key signer
#[derive(Clone)]
pub struct LocalSigner {
    secret: SecretKey,
    address: Address,
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl LocalSigner {
    /// Create a signer from a hex private key
    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let bytes = hex::decode(private_key.trim().trim_start_matches("0x"))
            .map_err(|_| PaymentError::config("Invalid hex private key"))?;
        Self::from_bytes(&bytes)
    }

    /// Create a signer with a freshly generated key
    pub fn random() -> Self {
        use rand::RngCore;
        loop {
            let mut bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut bytes);
            if let Ok(signer) = Self::from_bytes(&bytes) {
                return signer;
            }
        }
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let secret =
            SecretKey::from_slice(bytes).map_err(|_| PaymentError::config("Invalid private key"))?;
        let signing_key =
            SigningKey::from_slice(bytes).map_err(|_| PaymentError::config("Invalid private key"))?;
        let address = address_from_verifying_key(signing_key.verifying_key());
        Ok(Self { secret, address })
    }

    /// Address controlled by this key
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte digest, returning the recovery id and compact `r || s`
    pub fn sign_hash(&self, hash: H256) -> Result<(i32, [u8; 64])> {
        let message = Message::from_digest_slice(hash.as_bytes())
            .map_err(|_| PaymentError::rpc("Invalid message hash"))?;
        let signature = SECP256K1.sign_ecdsa_recoverable(&message, &self.secret);
        let (recovery_id, compact) = signature.serialize_compact();
        Ok((recovery_id.to_i32(), compact))
    }

    /// Sign a transaction and return the raw RLP bytes for `eth_sendRawTransaction`
    pub fn sign_transaction(&self, tx: &LegacyTransaction) -> Result<Vec<u8>> {
        let (recovery_id, compact) = self.sign_hash(tx.signing_hash())?;
        let v = tx.chain_id * 2 + 35 + recovery_id as u64;

        let mut stream = RlpStream::new_list(9);
        tx.append_fields(&mut stream);
        stream.append(&trim_u256(U256::from(v)));
        stream.append(&trim_bytes(&compact[..32]));
        stream.append(&trim_bytes(&compact[32..]));
        Ok(stream.out().to_vec())
    }
}

/// Ethereum address of a public key
fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // skip the 0x04 uncompressed marker
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

fn trim_u256(value: U256) -> Vec<u8> {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    trim_bytes(&buf)
}

fn trim_bytes(bytes: &[u8]) -> Vec<u8> {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::format_address;
    use std::str::FromStr;

    fn eip155_example() -> LegacyTransaction {
        LegacyTransaction {
            nonce: U256::from(9),
            gas_price: U256::from(20_000_000_000u64),
            gas: U256::from(21_000),
            to: Some(Address::from_str("0x3535353535353535353535353535353535353535").unwrap()),
            value: U256::exp10(18),
            data: Vec::new(),
            chain_id: 1,
        }
    }

    #[test]
    fn test_address_derivation() {
        let signer = LocalSigner::from_private_key(
            "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
        )
        .unwrap();
        assert_eq!(
            format_address(&signer.address()),
            "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"
        );
    }

    #[test]
    fn test_eip155_signing_hash() {
        assert_eq!(
            format!("{:?}", eip155_example().signing_hash()),
            "0xdaf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn test_eip155_signed_transaction() {
        let signer = LocalSigner::from_private_key(
            "4646464646464646464646464646464646464646464646464646464646464646",
        )
        .unwrap();
        let raw = signer.sign_transaction(&eip155_example()).unwrap();
        assert_eq!(
            hex::encode(raw),
            "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
    }

    #[test]
    fn test_invalid_keys() {
        assert!(LocalSigner::from_private_key("not hex").is_err());
        assert!(LocalSigner::from_private_key("0x00").is_err());
        let random = LocalSigner::random();
        assert!(!random.address().is_zero());
        assert!(format!("{:?}", random).contains("<redacted>"));
    }
}
