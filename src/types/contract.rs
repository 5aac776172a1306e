//! Contract families and address records

use super::constants::store;
use chrono::{DateTime, Utc};
use ethereum_types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deployed contract families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContractFamily {
    /// Job-posting plan payments and fee distribution
    Payment,
    /// Instant-jobs escrow
    InstantJobsEscrow,
    /// Learn-to-earn rewards
    LearnToEarn,
}

impl ContractFamily {
    /// All families
    pub fn all() -> [ContractFamily; 3] {
        [
            ContractFamily::Payment,
            ContractFamily::InstantJobsEscrow,
            ContractFamily::LearnToEarn,
        ]
    }

    /// Identifier used in URLs and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractFamily::Payment => "payment",
            ContractFamily::InstantJobsEscrow => "instantJobsEscrow",
            ContractFamily::LearnToEarn => "learnToEarn",
        }
    }

    /// Parse from the identifier returned by [`ContractFamily::as_str`]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(name))
    }

    /// Flat configuration document holding a `contracts` map
    pub fn config_document(&self) -> (&'static str, &'static str) {
        match self {
            ContractFamily::Payment => (store::SETTINGS_COLLECTION, store::PAYMENT_CONFIG_DOC),
            ContractFamily::InstantJobsEscrow => {
                (store::SETTINGS_COLLECTION, store::INSTANT_JOBS_DOC)
            }
            ContractFamily::LearnToEarn => (store::SETTINGS_COLLECTION, store::LEARN2EARN_DOC),
        }
    }

    /// Collection holding one document per network, if the family uses that layout
    pub fn per_network_collection(&self) -> Option<&'static str> {
        match self {
            ContractFamily::InstantJobsEscrow => Some(store::INSTANT_JOBS_CONTRACTS_COLLECTION),
            _ => None,
        }
    }
}

impl fmt::Display for ContractFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deployed contract address for one network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractAddressRecord {
    /// Network key as stored
    pub network_key: String,
    /// Contract family
    pub contract_family: ContractFamily,
    /// Deployed address
    pub address: Address,
    /// Last update time, when the store provides one
    pub updated_at: Option<DateTime<Utc>>,
}

impl ContractAddressRecord {
    /// Create a new record
    pub fn new(
        network_key: impl Into<String>,
        contract_family: ContractFamily,
        address: Address,
    ) -> Self {
        Self {
            network_key: network_key.into(),
            contract_family,
            address,
            updated_at: None,
        }
    }

    /// Set the update timestamp
    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }
}
