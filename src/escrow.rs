//! Instant-jobs escrow
//!
//! An employer locks the job budget in the escrow contract when creating the
//! job. The freelancer accepts and completes it, and the employer approves and
//! releases the funds. Either side can open a dispute, which the contract owner
//! resolves. Every status change is mirrored into `instantJobs/{jobId}`; mirror
//! failures are logged only.

use crate::config::PaymentsConfig;
use crate::provider::abi::{self, Token};
use crate::provider::units::{format_units, parse_units};
use crate::resolver::ContractResolver;
use crate::session::{session_network_key, SessionManager};
use crate::store::ConfigStore;
use crate::transactions::ContractClient;
use crate::types::constants::store as layout;
use crate::types::{
    format_address, format_hash, to_display, to_fixed_point, validate_total, ContractFamily,
    CurrencyKind, NetworkDescriptor,
};
use crate::{PaymentError, Result};
use chrono::{DateTime, TimeZone, Utc};
use ethereum_types::{Address, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Escrow contract functions
pub mod functions {
    pub const CREATE_JOB: &str = "createJob(string,uint256)";
    pub const CREATE_JOB_WITH_TOKEN: &str = "createJobWithToken(string,address,uint256,uint256)";
    pub const ACCEPT_JOB: &str = "acceptJob(string)";
    pub const COMPLETE_JOB: &str = "completeJob(string)";
    pub const APPROVE_AND_PAY: &str = "approveAndPay(string)";
    pub const OPEN_DISPUTE: &str = "openDispute(string,string)";
    pub const RESOLVE_DISPUTE: &str = "resolveDispute(string,bool)";
    pub const GET_JOB_INFO: &str = "getJobInfo(string)";
    pub const SET_FEE_COLLECTOR: &str = "setFeeCollector(address)";
    pub const SET_PLATFORM_FEE: &str = "setPlatformFeePercentage(uint256)";
    pub const PLATFORM_FEE: &str = "platformFeePercentage()";
}

/// Job state as stored by the contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EscrowJobStatus {
    Open,
    Accepted,
    Completed,
    Paid,
    Disputed,
    Resolved,
    Cancelled,
}

impl EscrowJobStatus {
    pub fn from_code(code: u64) -> Option<Self> {
        Some(match code {
            0 => Self::Open,
            1 => Self::Accepted,
            2 => Self::Completed,
            3 => Self::Paid,
            4 => Self::Disputed,
            5 => Self::Resolved,
            6 => Self::Cancelled,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Accepted => "accepted",
            Self::Completed => "completed",
            Self::Paid => "paid",
            Self::Disputed => "disputed",
            Self::Resolved => "resolved",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Decoded `getJobInfo` answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowJobInfo {
    pub job_id: String,
    pub employer: Address,
    pub freelancer: Address,
    /// Base units of the job currency
    pub amount: U256,
    /// Zero for native-currency jobs
    pub token: Address,
    pub status: EscrowJobStatus,
    pub deadline: DateTime<Utc>,
}

impl EscrowJobInfo {
    pub fn is_native(&self) -> bool {
        self.token.is_zero()
    }

    fn decode(job_id: &str, data: &[u8]) -> Result<Self> {
        let status_code = abi::decode_uint(data, 4)?;
        let status = EscrowJobStatus::from_code(status_code.low_u64())
            .filter(|_| status_code <= U256::from(u8::MAX))
            .ok_or_else(|| PaymentError::rpc(format!("unknown escrow status {}", status_code)))?;
        let deadline_secs = abi::decode_uint(data, 5)?;
        let deadline = i64::try_from(deadline_secs.low_u64())
            .ok()
            .filter(|_| deadline_secs <= U256::from(i64::MAX as u64))
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .ok_or_else(|| PaymentError::rpc(format!("invalid escrow deadline {}", deadline_secs)))?;
        Ok(Self {
            job_id: job_id.to_string(),
            employer: abi::decode_address(data, 0)?,
            freelancer: abi::decode_address(data, 1)?,
            amount: abi::decode_uint(data, 2)?,
            token: abi::decode_address(data, 3)?,
            status,
            deadline,
        })
    }
}

/// Confirmed escrow transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowReceipt {
    pub job_id: String,
    pub transaction_hash: String,
    pub block_number: u64,
    pub network_key: String,
}

/// Escrow operations for the connected wallet
pub struct EscrowService {
    session: SessionManager,
    resolver: Arc<ContractResolver>,
    config: PaymentsConfig,
}

struct EscrowTarget {
    client: ContractClient,
    contract: Address,
    network_key: String,
}

impl EscrowService {
    pub fn new(session: SessionManager, resolver: Arc<ContractResolver>) -> Self {
        Self {
            session,
            resolver,
            config: PaymentsConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PaymentsConfig) -> Self {
        self.config = config;
        self
    }

    async fn target(&self) -> Result<EscrowTarget> {
        let snapshot = self.session.snapshot().await?;
        let network_key = session_network_key(&snapshot.session)
            .ok_or_else(|| PaymentError::unsupported_network(&snapshot.session.network_name))?;
        let contract = self
            .resolver
            .require(&network_key, ContractFamily::InstantJobsEscrow)
            .await?;
        let client =
            ContractClient::from_snapshot(&snapshot).with_confirm_policy(self.config.confirm_policy());
        Ok(EscrowTarget {
            client,
            contract,
            network_key,
        })
    }

    /// Lock the job budget in escrow
    pub async fn create_job(
        &self,
        job_id: &str,
        amount: Decimal,
        currency: &CurrencyKind,
        deadline: DateTime<Utc>,
    ) -> Result<EscrowReceipt> {
        if amount <= Decimal::ZERO {
            return Err(PaymentError::invalid_amount(format!(
                "amount {} must be positive",
                amount
            )));
        }
        if deadline <= Utc::now() {
            return Err(PaymentError::InvalidDeadline(format!(
                "{} is not in the future",
                deadline.to_rfc3339()
            )));
        }
        let target = self.target().await?;
        let client = &target.client;
        let deadline_arg = Token::Uint(U256::from(deadline.timestamp().max(0) as u64));

        let (receipt, units, token) = match currency {
            CurrencyKind::Native => {
                let (decimals, symbol) = NetworkDescriptor::by_key(&target.network_key)
                    .map(|d| (d.native_decimals, d.native_currency_symbol))
                    .unwrap_or((18, "native"));
                let value = parse_units(amount, decimals)?;
                let balance = client.eth().balance(client.from()).await?;
                if balance < value {
                    return Err(PaymentError::InsufficientFunds {
                        required: format_units(value, decimals),
                        available: format_units(balance, decimals),
                        symbol: symbol.to_string(),
                    });
                }
                let receipt = client
                    .execute(
                        target.contract,
                        functions::CREATE_JOB,
                        &[Token::String(job_id.to_string()), deadline_arg],
                        value,
                    )
                    .await?;
                (receipt, value, None)
            }
            CurrencyKind::Erc20 { symbol } => {
                let token = self
                    .resolver
                    .token_address(&target.network_key, symbol)
                    .await?
                    .ok_or_else(|| {
                        PaymentError::not_configured(
                            format!("{} token", symbol),
                            target.network_key.clone(),
                        )
                    })?;
                let decimals = client
                    .token_decimals(token, self.config.token_decimals_timeout)
                    .await;
                let units = parse_units(amount, decimals)?;
                client
                    .ensure_token_balance(token, units, decimals, symbol)
                    .await?;
                client.ensure_allowance(token, target.contract, units).await?;
                let receipt = client
                    .execute(
                        target.contract,
                        functions::CREATE_JOB_WITH_TOKEN,
                        &[
                            Token::String(job_id.to_string()),
                            Token::Address(token),
                            Token::Uint(units),
                            deadline_arg,
                        ],
                        U256::zero(),
                    )
                    .await?;
                (receipt, units, Some(token))
            }
        };

        let receipt = EscrowReceipt {
            job_id: job_id.to_string(),
            transaction_hash: format_hash(&receipt.transaction_hash),
            block_number: receipt.block_number,
            network_key: target.network_key.clone(),
        };
        self.mirror(
            job_id,
            EscrowJobStatus::Open,
            &receipt,
            json!({
                "escrowContract": format_address(&target.contract),
                "employer": format_address(&client.from()),
                "amount": units.to_string(),
                "token": token.map(|t| format_address(&t)),
                "deadline": deadline.to_rfc3339(),
            }),
        )
        .await;
        tracing::info!(job = job_id, network = %target.network_key, "Escrow job created");
        Ok(receipt)
    }

    /// Freelancer takes the job
    pub async fn accept_job(&self, job_id: &str) -> Result<EscrowReceipt> {
        self.transition(
            job_id,
            functions::ACCEPT_JOB,
            &[Token::String(job_id.to_string())],
            EscrowJobStatus::Accepted,
            json!({}),
        )
        .await
    }

    /// Freelancer marks the work delivered
    pub async fn complete_job(&self, job_id: &str) -> Result<EscrowReceipt> {
        self.transition(
            job_id,
            functions::COMPLETE_JOB,
            &[Token::String(job_id.to_string())],
            EscrowJobStatus::Completed,
            json!({}),
        )
        .await
    }

    /// Employer approves the work and releases the funds
    pub async fn approve_and_pay(&self, job_id: &str) -> Result<EscrowReceipt> {
        self.transition(
            job_id,
            functions::APPROVE_AND_PAY,
            &[Token::String(job_id.to_string())],
            EscrowJobStatus::Paid,
            json!({}),
        )
        .await
    }

    pub async fn open_dispute(&self, job_id: &str, reason: &str) -> Result<EscrowReceipt> {
        if reason.trim().is_empty() {
            return Err(PaymentError::config("dispute reason cannot be empty"));
        }
        self.transition(
            job_id,
            functions::OPEN_DISPUTE,
            &[
                Token::String(job_id.to_string()),
                Token::String(reason.to_string()),
            ],
            EscrowJobStatus::Disputed,
            json!({ "disputeReason": reason }),
        )
        .await
    }

    /// Owner settles a dispute for the freelancer or back to the employer
    pub async fn resolve_dispute(&self, job_id: &str, pay_freelancer: bool) -> Result<EscrowReceipt> {
        let target = self.target().await?;
        target.client.ensure_owner(target.contract).await?;
        self.transition_on(
            target,
            job_id,
            functions::RESOLVE_DISPUTE,
            &[Token::String(job_id.to_string()), Token::Bool(pay_freelancer)],
            EscrowJobStatus::Resolved,
            json!({ "resolvedForFreelancer": pay_freelancer }),
        )
        .await
    }

    pub async fn job_info(&self, job_id: &str) -> Result<EscrowJobInfo> {
        let target = self.target().await?;
        let data = target
            .client
            .read(
                target.contract,
                functions::GET_JOB_INFO,
                &[Token::String(job_id.to_string())],
            )
            .await?;
        EscrowJobInfo::decode(job_id, &data)
    }

    /// Owner changes where platform fees go
    pub async fn set_fee_collector(&self, collector: Address) -> Result<EscrowReceipt> {
        if collector.is_zero() {
            return Err(PaymentError::invalid_address("fee collector cannot be the zero address"));
        }
        let target = self.target().await?;
        target.client.ensure_owner(target.contract).await?;
        let receipt = target
            .client
            .execute(
                target.contract,
                functions::SET_FEE_COLLECTOR,
                &[Token::Address(collector)],
                U256::zero(),
            )
            .await?;
        self.mirror_config(&target.network_key, json!({ "feeCollector": format_address(&collector) }))
            .await;
        Ok(admin_receipt(&target.network_key, &receipt))
    }

    /// Owner sets the platform fee, as a display percentage capped at 30
    pub async fn set_platform_fee(&self, display: Decimal) -> Result<EscrowReceipt> {
        let fixed = to_fixed_point(display)?;
        validate_total(fixed)?;
        let target = self.target().await?;
        target.client.ensure_owner(target.contract).await?;
        let receipt = target
            .client
            .execute(
                target.contract,
                functions::SET_PLATFORM_FEE,
                &[Token::Uint(U256::from(fixed))],
                U256::zero(),
            )
            .await?;
        self.mirror_config(&target.network_key, json!({ "platformFeePercentage": fixed }))
            .await;
        Ok(admin_receipt(&target.network_key, &receipt))
    }

    /// Platform fee as a display percentage
    pub async fn platform_fee(&self) -> Result<Decimal> {
        let target = self.target().await?;
        let fixed = target
            .client
            .read_uint(target.contract, functions::PLATFORM_FEE, &[])
            .await?;
        if fixed > U256::from(u32::MAX) {
            return Err(PaymentError::InvalidDistribution(format!(
                "platform fee {} out of range",
                fixed
            )));
        }
        Ok(to_display(fixed.low_u32()))
    }

    async fn transition(
        &self,
        job_id: &str,
        signature: &str,
        args: &[Token],
        status: EscrowJobStatus,
        extra: Value,
    ) -> Result<EscrowReceipt> {
        let target = self.target().await?;
        self.transition_on(target, job_id, signature, args, status, extra)
            .await
    }

    async fn transition_on(
        &self,
        target: EscrowTarget,
        job_id: &str,
        signature: &str,
        args: &[Token],
        status: EscrowJobStatus,
        extra: Value,
    ) -> Result<EscrowReceipt> {
        let receipt = target
            .client
            .execute(target.contract, signature, args, U256::zero())
            .await?;
        let receipt = EscrowReceipt {
            job_id: job_id.to_string(),
            transaction_hash: format_hash(&receipt.transaction_hash),
            block_number: receipt.block_number,
            network_key: target.network_key,
        };
        self.mirror(job_id, status, &receipt, extra).await;
        tracing::info!(job = job_id, status = status.as_str(), "Escrow job updated");
        Ok(receipt)
    }

    async fn mirror(&self, job_id: &str, status: EscrowJobStatus, receipt: &EscrowReceipt, extra: Value) {
        let mut patch = json!({
            "status": status.as_str(),
            "network": receipt.network_key,
            "lastTransactionHash": receipt.transaction_hash,
            "updatedAt": Utc::now().to_rfc3339(),
        });
        crate::store::deep_merge(&mut patch, extra);
        if let Err(e) = self
            .resolver
            .store()
            .set_merge(layout::INSTANT_JOBS_COLLECTION, job_id, patch)
            .await
        {
            tracing::warn!(job = job_id, error = %e, "Failed to mirror escrow job");
        }
    }

    async fn mirror_config(&self, network: &str, mut patch: Value) {
        crate::store::deep_merge(
            &mut patch,
            json!({ "network": network, "updatedAt": Utc::now().to_rfc3339() }),
        );
        if let Err(e) = self
            .resolver
            .store()
            .set_merge(layout::SETTINGS_COLLECTION, layout::INSTANT_JOBS_DOC, patch)
            .await
        {
            tracing::warn!(error = %e, "Failed to mirror escrow configuration");
        }
    }
}

fn admin_receipt(network: &str, receipt: &crate::provider::TransactionReceipt) -> EscrowReceipt {
    EscrowReceipt {
        job_id: String::new(),
        transaction_hash: format_hash(&receipt.transaction_hash),
        block_number: receipt.block_number,
        network_key: network.to_string(),
    }
}
