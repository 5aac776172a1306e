//! Payment orchestration
//!
//! [`PaymentOrchestrator::pay`] takes a plan payment from request to confirmed
//! record:
//!
//! 1. capture the session, and for a forced network either build a dedicated
//!    provider (WalletConnect) or ask the wallet to switch (injected);
//! 2. resolve the payment contract, failing with `ContractNotConfigured`;
//! 3. check the currency, then pay natively or through an ERC-20 allowance;
//! 4. wait for one confirmation within the payment timeout;
//! 5. persist the payment record and the entitlement it buys.
//!
//! Balance checks happen before anything is submitted. The newer
//! identifier-based entry point is tried first and the legacy recipient-based
//! one only when the first fails at contract level, never after a wallet
//! rejection. A timeout does not cancel anything on chain: the record stays
//! `pending` and [`PaymentOrchestrator::refresh_status`] settles it later.
//!
//! Store writes after submission are logged on failure and never undo the
//! on-chain payment.

use crate::config::PaymentsConfig;
use crate::fees::mirrored_distribution;
use crate::normalize::descriptor_for;
use crate::provider::abi::Token;
use crate::provider::units::{format_units, parse_units};
use crate::provider::{Eip1193Provider, EthClient, ProviderFactory, WalletRoutedProvider};
use crate::resolver::ContractResolver;
use crate::session::{session_network_key, SessionManager, SessionSnapshot};
use crate::store::{ConfigStore, Document};
use crate::transactions::ContractClient;
use crate::types::constants::store as layout;
use crate::types::{
    format_address, format_hash, parse_hash, parse_non_zero_address, ConnectionMethod,
    ContractFamily, CurrencyKind, NetworkDescriptor, PaymentReceipt, PaymentRequest,
    PaymentStatus, PaymentTransactionRecord,
};
use crate::{PaymentError, Result};
use chrono::{DateTime, Utc};
use ethereum_types::{Address, H256, U256};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Payment contract entry points
pub mod entry_points {
    /// Native payment keyed by plan id
    pub const PAY_NATIVE: &str = "payForPlan(string)";
    /// Native payment to a recipient (older deployments)
    pub const PAY_NATIVE_LEGACY: &str = "processPayment(address)";
    /// Token payment keyed by plan id
    pub const PAY_TOKEN: &str = "payForPlanWithToken(string,address,uint256)";
    /// Token payment to a recipient (older deployments)
    pub const PAY_TOKEN_LEGACY: &str = "processTokenPayment(address,address,uint256)";
}

/// Chain, account and network a payment is sent with
struct PaymentTarget {
    client: ContractClient,
    network_key: String,
    descriptor: &'static NetworkDescriptor,
}

/// Runs plan payments and keeps their records current
pub struct PaymentOrchestrator {
    session: SessionManager,
    resolver: Arc<ContractResolver>,
    providers: Arc<dyn ProviderFactory>,
    config: PaymentsConfig,
}

impl PaymentOrchestrator {
    pub fn new(
        session: SessionManager,
        resolver: Arc<ContractResolver>,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            session,
            resolver,
            providers,
            config: PaymentsConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PaymentsConfig) -> Self {
        self.config = config;
        self
    }

    fn store(&self) -> &Arc<dyn ConfigStore> {
        self.resolver.store()
    }

    /// Pay for a plan and wait for one confirmation
    pub async fn pay(&self, request: &PaymentRequest) -> Result<PaymentReceipt> {
        if request.amount <= Decimal::ZERO {
            return Err(PaymentError::invalid_amount(format!(
                "amount {} must be positive",
                request.amount
            )));
        }

        let snapshot = self.session.snapshot().await?;
        let target = self
            .target(&snapshot, request.forced_network.as_deref())
            .await?;
        let contract = self
            .resolver
            .require(&target.network_key, ContractFamily::Payment)
            .await?;

        tracing::info!(
            plan = %request.plan_id,
            amount = %request.amount,
            currency = %request.currency_code,
            network = %target.network_key,
            contract = %format_address(&contract),
            "Starting payment"
        );

        let (hash, units) = match &request.currency {
            CurrencyKind::Native => self.pay_native(&target, contract, request).await?,
            CurrencyKind::Erc20 { symbol } => {
                self.pay_token(&target, contract, request, symbol).await?
            }
        };

        let mut record = self
            .new_record(request, &target, contract, hash, units)
            .await;
        self.save_record(&record).await;

        match target.client.confirm(hash).await {
            Ok(receipt) => {
                record.transition(PaymentStatus::Confirmed, Some(receipt.block_number));
                self.save_record(&record).await;
                self.grant_entitlement(&record).await;
                tracing::info!(record = %record.id, tx = %record.transaction_hash, block = receipt.block_number, "Payment confirmed");
                Ok(PaymentReceipt {
                    record_id: record.id,
                    transaction_hash: format_hash(&receipt.transaction_hash),
                    block_number: receipt.block_number,
                    network_key: target.network_key,
                })
            }
            Err(e @ PaymentError::TransactionTimeout { .. }) => {
                tracing::warn!(record = %record.id, tx = %record.transaction_hash, "Payment left pending after timeout");
                Err(e)
            }
            Err(e) => {
                if e.is_contract_level() {
                    record.transition(PaymentStatus::Failed, None);
                    self.save_record(&record).await;
                }
                tracing::warn!(record = %record.id, error = %e, "Payment failed");
                Err(e)
            }
        }
    }

    async fn target(
        &self,
        snapshot: &SessionSnapshot,
        forced: Option<&str>,
    ) -> Result<PaymentTarget> {
        let policy = self.config.confirm_policy();
        let session = &snapshot.session;
        let forced = forced
            .map(str::to_string)
            .or_else(|| session.forced_network.clone());

        let Some(forced) = forced else {
            let descriptor = session_network_key(session)
                .and_then(|key| NetworkDescriptor::by_key(&key))
                .ok_or_else(|| PaymentError::unsupported_network(&session.network_name))?;
            return Ok(PaymentTarget {
                client: ContractClient::from_snapshot(snapshot).with_confirm_policy(policy),
                network_key: descriptor.canonical_key.to_string(),
                descriptor,
            });
        };

        let descriptor =
            descriptor_for(&forced).ok_or_else(|| PaymentError::unsupported_network(&forced))?;
        let network_key = descriptor.canonical_key.to_string();

        let client = if descriptor.chain_id == session.chain_id {
            ContractClient::from_snapshot(snapshot)
        } else {
            match session.connection_method {
                ConnectionMethod::WalletConnect => {
                    tracing::info!(network = %network_key, "Building dedicated provider for forced network");
                    let read = self.providers.provider_for(descriptor).await?;
                    let routed: Arc<dyn Eip1193Provider> = Arc::new(WalletRoutedProvider::new(
                        read,
                        snapshot.provider.clone(),
                        descriptor.chain_id,
                    ));
                    ContractClient::new(EthClient::new(routed), session.address, descriptor.chain_id)
                }
                ConnectionMethod::Injected => {
                    self.session.switch_network(descriptor.canonical_key).await?;
                    ContractClient::new(snapshot.client(), session.address, descriptor.chain_id)
                }
            }
        };

        Ok(PaymentTarget {
            client: client.with_confirm_policy(policy),
            network_key,
            descriptor,
        })
    }

    async fn pay_native(
        &self,
        target: &PaymentTarget,
        contract: Address,
        request: &PaymentRequest,
    ) -> Result<(H256, U256)> {
        let symbol = target.descriptor.native_currency_symbol;
        let decimals = target.descriptor.native_decimals;
        if !request.currency_code.is_empty() && !native_symbol_matches(&request.currency_code, symbol)
        {
            return Err(PaymentError::CurrencyMismatch {
                expected: symbol.to_string(),
                actual: request.currency_code.clone(),
            });
        }

        let client = &target.client;
        let value = parse_units(request.amount, decimals)?;
        let balance = client.eth().balance(client.from()).await?;
        if balance < value {
            return Err(PaymentError::InsufficientFunds {
                required: format_units(value, decimals),
                available: format_units(balance, decimals),
                symbol: symbol.to_string(),
            });
        }

        let primary = client
            .submit(
                contract,
                entry_points::PAY_NATIVE,
                &[Token::String(request.plan_id.clone())],
                value,
            )
            .await;
        let hash = match primary {
            Ok(hash) => hash,
            Err(e) if e.is_contract_level() => {
                tracing::warn!(error = %e, "Plan entry point unavailable, trying legacy payment");
                let recipient = self.legacy_recipient(client, contract, request, e).await?;
                client
                    .submit(
                        contract,
                        entry_points::PAY_NATIVE_LEGACY,
                        &[Token::Address(recipient)],
                        value,
                    )
                    .await?
            }
            Err(e) => return Err(e),
        };
        Ok((hash, value))
    }

    async fn pay_token(
        &self,
        target: &PaymentTarget,
        contract: Address,
        request: &PaymentRequest,
        symbol: &str,
    ) -> Result<(H256, U256)> {
        if !request.currency_code.eq_ignore_ascii_case(symbol) {
            return Err(PaymentError::CurrencyMismatch {
                expected: symbol.to_string(),
                actual: request.currency_code.clone(),
            });
        }

        let client = &target.client;
        let token = self
            .resolver
            .token_address(&target.network_key, symbol)
            .await?
            .ok_or_else(|| {
                PaymentError::not_configured(format!("{} token", symbol), target.network_key.clone())
            })?;

        match client.token_symbol(token).await {
            Ok(onchain) if !onchain.eq_ignore_ascii_case(symbol) => {
                return Err(PaymentError::CurrencyMismatch {
                    expected: symbol.to_string(),
                    actual: onchain,
                });
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Token symbol unavailable, skipping check"),
        }

        let decimals = client
            .token_decimals(token, self.config.token_decimals_timeout)
            .await;
        let units = parse_units(request.amount, decimals)?;
        client
            .ensure_token_balance(token, units, decimals, symbol)
            .await?;
        client.ensure_allowance(token, contract, units).await?;

        let primary = client
            .submit(
                contract,
                entry_points::PAY_TOKEN,
                &[
                    Token::String(request.plan_id.clone()),
                    Token::Address(token),
                    Token::Uint(units),
                ],
                U256::zero(),
            )
            .await;
        let hash = match primary {
            Ok(hash) => hash,
            Err(e) if e.is_contract_level() => {
                tracing::warn!(error = %e, "Plan token entry point unavailable, trying legacy payment");
                let recipient = self.legacy_recipient(client, contract, request, e).await?;
                client
                    .submit(
                        contract,
                        entry_points::PAY_TOKEN_LEGACY,
                        &[
                            Token::Address(token),
                            Token::Address(recipient),
                            Token::Uint(units),
                        ],
                        U256::zero(),
                    )
                    .await?
            }
            Err(e) => return Err(e),
        };
        Ok((hash, units))
    }

    /// Recipient for legacy entry points: the request's, else the contract owner
    async fn legacy_recipient(
        &self,
        client: &ContractClient,
        contract: Address,
        request: &PaymentRequest,
        original: PaymentError,
    ) -> Result<Address> {
        if let Some(recipient) = &request.recipient {
            return parse_non_zero_address(recipient);
        }
        match client.owner(contract).await? {
            Some(owner) => Ok(owner),
            None => Err(original),
        }
    }

    async fn new_record(
        &self,
        request: &PaymentRequest,
        target: &PaymentTarget,
        contract: Address,
        hash: H256,
        units: U256,
    ) -> PaymentTransactionRecord {
        let now = Utc::now();
        let distribution = mirrored_distribution(self.store().as_ref())
            .await
            .map(|config| config.split(units));
        PaymentTransactionRecord {
            id: Uuid::new_v4().to_string(),
            plan_id: request.plan_id.clone(),
            payer_id: request.payer_id.clone(),
            job_id: request.job_id.clone(),
            amount: request.amount.to_string(),
            currency_code: request.currency_code.clone(),
            network_key: target.network_key.clone(),
            contract_address: format_address(&contract),
            payer_address: format_address(&target.client.from()),
            status: PaymentStatus::Pending,
            transaction_hash: format_hash(&hash),
            block_number: None,
            distribution,
            created_at: now,
            updated_at: now,
        }
    }

    async fn save_record(&self, record: &PaymentTransactionRecord) {
        let result = match serde_json::to_value(record) {
            Ok(data) => {
                self.store()
                    .set_merge(layout::PAYMENTS_COLLECTION, &record.id, data)
                    .await
            }
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::error!(
                record = %record.id,
                tx = %record.transaction_hash,
                status = ?record.status,
                error = %e,
                "Failed to persist payment record"
            );
        }
    }

    async fn grant_entitlement(&self, record: &PaymentTransactionRecord) {
        let now = Utc::now().to_rfc3339();
        let (collection, id, patch) = match &record.job_id {
            Some(job_id) => (
                layout::JOBS_COLLECTION,
                job_id.as_str(),
                json!({
                    "paymentStatus": "paid",
                    "planId": record.plan_id,
                    "paymentId": record.id,
                    "transactionHash": record.transaction_hash,
                    "network": record.network_key,
                    "paidAt": now,
                }),
            ),
            None => (
                layout::COMPANIES_COLLECTION,
                record.payer_id.as_str(),
                json!({
                    "activePlan": record.plan_id,
                    "lastPaymentId": record.id,
                    "planActivatedAt": now,
                }),
            ),
        };
        if let Err(e) = self.store().set_merge(collection, id, patch).await {
            tracing::error!(record = %record.id, collection, id, error = %e, "Failed to record entitlement");
        }
    }

    /// Re-check a stored payment against the chain
    ///
    /// Pending or expired records move to confirmed or failed by receipt; a
    /// pending record older than the expiry window with no receipt becomes
    /// expired. Confirmed and failed records are returned unchanged.
    pub async fn refresh_status(&self, record_id: &str) -> Result<PaymentTransactionRecord> {
        let doc = self
            .store()
            .get(layout::PAYMENTS_COLLECTION, record_id)
            .await?
            .ok_or_else(|| PaymentError::RecordNotFound(format!("payment {}", record_id)))?;
        let mut record: PaymentTransactionRecord = serde_json::from_value(doc.data)?;
        if record.status.is_terminal() {
            return Ok(record);
        }

        let descriptor = descriptor_for(&record.network_key)
            .ok_or_else(|| PaymentError::unsupported_network(&record.network_key))?;
        let provider = self.providers.provider_for(descriptor).await?;
        let hash = parse_hash(&record.transaction_hash)?;
        let receipt = EthClient::new(provider).transaction_receipt(hash).await?;

        let changed = match receipt {
            Some(receipt) if receipt.status => {
                record.transition(PaymentStatus::Confirmed, Some(receipt.block_number))
            }
            Some(receipt) => record.transition(PaymentStatus::Failed, Some(receipt.block_number)),
            None => {
                let expired = (Utc::now() - record.created_at)
                    .to_std()
                    .map(|age| age >= self.config.payment_expiry)
                    .unwrap_or(false);
                record.status == PaymentStatus::Pending
                    && expired
                    && record.transition(PaymentStatus::Expired, None)
            }
        };

        if changed {
            tracing::info!(record = %record.id, status = ?record.status, "Payment status refreshed");
            self.store()
                .set_merge(
                    layout::PAYMENTS_COLLECTION,
                    &record.id,
                    serde_json::to_value(&record)?,
                )
                .await?;
            if record.status == PaymentStatus::Confirmed {
                self.grant_entitlement(&record).await;
            }
        }
        Ok(record)
    }

    /// Refresh every pending payment, plus expired ones still inside the recheck
    /// window; failures are logged and skipped
    pub async fn refresh_pending(&self) -> Result<Vec<PaymentTransactionRecord>> {
        let mut candidates = self
            .store()
            .query_eq(layout::PAYMENTS_COLLECTION, "status", &json!("pending"))
            .await?;
        let expired = self
            .store()
            .query_eq(layout::PAYMENTS_COLLECTION, "status", &json!("expired"))
            .await?;
        candidates.extend(expired.into_iter().filter(|doc| self.within_recheck_window(doc)));

        let mut refreshed = Vec::with_capacity(candidates.len());
        for doc in candidates {
            match self.refresh_status(&doc.id).await {
                Ok(record) => refreshed.push(record),
                Err(e) => tracing::warn!(record = %doc.id, error = %e, "Could not refresh payment"),
            }
        }
        Ok(refreshed)
    }

    fn within_recheck_window(&self, doc: &Document) -> bool {
        let created = doc
            .field(&["createdAt"])
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok());
        let Some(created) = created else {
            tracing::debug!(record = %doc.id, "Expired payment has no creation time, skipping");
            return false;
        };
        (Utc::now() - created.with_timezone(&Utc))
            .to_std()
            .map(|age| age <= self.config.expired_recheck_window)
            .unwrap_or(true)
    }
}

/// `BNB` pays on a network whose native symbol is `BNB` or testnet `tBNB`
fn native_symbol_matches(code: &str, symbol: &str) -> bool {
    code.eq_ignore_ascii_case(symbol)
        || symbol
            .strip_prefix('t')
            .is_some_and(|mainnet| code.eq_ignore_ascii_case(mainnet))
}
