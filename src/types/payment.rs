//! Payment-related types

use super::fees::DistributionSnapshot;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a payment is settled on chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CurrencyKind {
    /// The network's native currency
    Native,
    /// An ERC-20 token identified by symbol (e.g. `USDT`)
    Erc20 { symbol: String },
}

impl CurrencyKind {
    /// ERC-20 payment in USDT
    pub fn usdt() -> Self {
        CurrencyKind::Erc20 {
            symbol: super::constants::tokens::USDT.to_string(),
        }
    }

    /// Whether this is a native-currency payment
    pub fn is_native(&self) -> bool {
        matches!(self, CurrencyKind::Native)
    }
}

/// A request to pay for a plan or job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Plan being purchased
    pub plan_id: String,
    /// Paying company (or user) id
    pub payer_id: String,
    /// Job listing unlocked by the payment, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Amount in human units (e.g. `12.5` USDT)
    pub amount: Decimal,
    /// Currency code the plan is priced in
    pub currency_code: String,
    /// Settlement currency
    pub currency: CurrencyKind,
    /// Network the payment must target regardless of the wallet's chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forced_network: Option<String>,
    /// Recipient for contracts exposing the recipient-based entry point
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl PaymentRequest {
    /// Create a native-currency payment request
    pub fn native(
        plan_id: impl Into<String>,
        payer_id: impl Into<String>,
        amount: Decimal,
        currency_code: impl Into<String>,
    ) -> Self {
        Self {
            plan_id: plan_id.into(),
            payer_id: payer_id.into(),
            job_id: None,
            amount,
            currency_code: currency_code.into(),
            currency: CurrencyKind::Native,
            forced_network: None,
            recipient: None,
        }
    }

    /// Create a USDT payment request
    pub fn usdt(plan_id: impl Into<String>, payer_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            plan_id: plan_id.into(),
            payer_id: payer_id.into(),
            job_id: None,
            amount,
            currency_code: super::constants::tokens::USDT.to_string(),
            currency: CurrencyKind::usdt(),
            forced_network: None,
            recipient: None,
        }
    }

    /// Set the job unlocked by this payment
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    /// Force a target network
    pub fn with_forced_network(mut self, network: impl Into<String>) -> Self {
        self.forced_network = Some(network.into());
        self
    }

    /// Set the recipient used by the legacy entry point
    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }
}

/// Lifecycle of a recorded payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Failed,
    Expired,
}

impl PaymentStatus {
    /// Confirmed and failed records never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Confirmed | PaymentStatus::Failed)
    }
}

/// System-of-record entry for a submitted payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTransactionRecord {
    pub id: String,
    pub plan_id: String,
    pub payer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Amount in human units
    pub amount: String,
    pub currency_code: String,
    pub network_key: String,
    pub contract_address: String,
    pub payer_address: String,
    pub status: PaymentStatus,
    pub transaction_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<DistributionSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransactionRecord {
    /// Transition to a new status; terminal records are left untouched.
    /// Returns whether the record changed.
    pub fn transition(&mut self, status: PaymentStatus, block_number: Option<u64>) -> bool {
        if self.status.is_terminal() || self.status == status {
            return false;
        }
        self.status = status;
        if block_number.is_some() {
            self.block_number = block_number;
        }
        self.updated_at = Utc::now();
        true
    }
}

/// Outcome returned to the caller of a successful payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub record_id: String,
    pub transaction_hash: String,
    pub block_number: u64,
    pub network_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn record(status: PaymentStatus) -> PaymentTransactionRecord {
        PaymentTransactionRecord {
            id: "rec-1".to_string(),
            plan_id: "basic".to_string(),
            payer_id: "company-1".to_string(),
            job_id: None,
            amount: "10".to_string(),
            currency_code: "USDT".to_string(),
            network_key: "polygon".to_string(),
            contract_address: "0x0000000000000000000000000000000000000001".to_string(),
            payer_address: "0x0000000000000000000000000000000000000002".to_string(),
            status,
            transaction_hash: "0xabc".to_string(),
            block_number: None,
            distribution: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_transitions() {
        let mut rec = record(PaymentStatus::Pending);
        assert!(rec.transition(PaymentStatus::Confirmed, Some(42)));
        assert_eq!(rec.block_number, Some(42));
        assert!(!rec.transition(PaymentStatus::Failed, None));
        assert_eq!(rec.status, PaymentStatus::Confirmed);

        let mut expired = record(PaymentStatus::Expired);
        assert!(expired.transition(PaymentStatus::Confirmed, Some(7)));
    }

    #[test]
    fn test_request_builders() {
        let request = PaymentRequest::usdt("pro", "company-9", Decimal::from_str("25").unwrap())
            .with_job_id("job-3")
            .with_forced_network("polygon");
        assert_eq!(request.currency, CurrencyKind::usdt());
        assert_eq!(request.currency_code, "USDT");
        assert_eq!(request.job_id.as_deref(), Some("job-3"));
        assert_eq!(request.forced_network.as_deref(), Some("polygon"));

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["currency"]["kind"], "erc20");
        assert_eq!(json["currency"]["symbol"], "USDT");
        assert!(json.get("recipient").is_none());
    }

    #[test]
    fn test_record_serialization() {
        let json = serde_json::to_value(record(PaymentStatus::Pending)).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["transactionHash"], "0xabc");
        assert!(json.get("blockNumber").is_none());
    }
}
