//! Fee distribution bookkeeping
//!
//! The payment contract splits every payment between four roles and the main
//! wallet. [`FeeBookkeeper`] reads that split and updates it, one transaction per
//! field. Each mutation checks ownership first and validates the combined cap
//! before anything is submitted. Successful updates are mirrored into
//! `settings/paymentConfig`; a failed mirror write is logged and ignored.
//!
//! A multi-field update is not atomic: every field is its own transaction and the
//! returned [`DistributionUpdateReport`] says which ones landed.

use crate::normalize::descriptor_for;
use crate::provider::abi::Token;
use crate::provider::{EthClient, ProviderFactory};
use crate::resolver::ContractResolver;
use crate::session::{session_network_key, SessionManager};
use crate::store::{ConfigStore, Document};
use crate::transactions::{ConfirmPolicy, ContractClient};
use crate::types::constants::store as layout;
use crate::types::{
    format_address, format_hash, parse_address, to_fixed_point, ContractFamily,
    FeeDistributionConfig, FeeRole,
};
use crate::{PaymentError, Result};
use chrono::Utc;
use ethereum_types::{Address, U256};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Which half of a role is being changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FeeField {
    Wallet,
    Percentage,
}

/// Result of one submitted field update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum UpdateOutcome {
    Applied {
        transaction_hash: String,
        block_number: u64,
    },
    Unchanged,
    Failed {
        code: String,
        message: String,
    },
}

/// Outcome for one role and field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleUpdate {
    pub role: FeeRole,
    pub field: FeeField,
    pub outcome: UpdateOutcome,
}

/// Per-field outcomes of [`FeeBookkeeper::update_distribution`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DistributionUpdateReport {
    pub updates: Vec<RoleUpdate>,
}

impl DistributionUpdateReport {
    /// Roles with at least one failed field
    pub fn failed_roles(&self) -> Vec<FeeRole> {
        let mut roles = Vec::new();
        for update in &self.updates {
            if matches!(update.outcome, UpdateOutcome::Failed { .. }) && !roles.contains(&update.role)
            {
                roles.push(update.role);
            }
        }
        roles
    }

    pub fn is_complete(&self) -> bool {
        self.failed_roles().is_empty()
    }
}

/// Reads and updates the payment contract's fee distribution
pub struct FeeBookkeeper {
    session: SessionManager,
    resolver: Arc<ContractResolver>,
    providers: Arc<dyn ProviderFactory>,
    policy: ConfirmPolicy,
}

impl FeeBookkeeper {
    pub fn new(
        session: SessionManager,
        resolver: Arc<ContractResolver>,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            session,
            resolver,
            providers,
            policy: ConfirmPolicy::default(),
        }
    }

    pub fn with_confirm_policy(mut self, policy: ConfirmPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn store(&self) -> &Arc<dyn ConfigStore> {
        self.resolver.store()
    }

    /// Current on-chain distribution for `network`
    ///
    /// Uses the wallet when it is on that network, a dedicated provider otherwise.
    pub async fn get_distribution(&self, network: &str) -> Result<FeeDistributionConfig> {
        let descriptor =
            descriptor_for(network).ok_or_else(|| PaymentError::unsupported_network(network))?;
        let contract = self
            .resolver
            .require(descriptor.canonical_key, ContractFamily::Payment)
            .await?;

        let client = match self.session.snapshot().await {
            Ok(snapshot) if snapshot.session.chain_id == descriptor.chain_id => {
                ContractClient::from_snapshot(&snapshot)
            }
            _ => {
                let provider = self.providers.provider_for(descriptor).await?;
                ContractClient::new(EthClient::new(provider), Address::zero(), descriptor.chain_id)
            }
        };
        read_distribution(&client, contract).await
    }

    /// Set one role's percentage, given as a display value (`5` or `2.5`)
    pub async fn update_percentage(&self, role: FeeRole, display: Decimal) -> Result<RoleUpdate> {
        let fixed = to_fixed_point(display)?;
        let (client, contract, network) = self.owner_client().await?;

        let mut candidate = read_distribution(&client, contract).await?;
        candidate.set_percentage(role, fixed);
        candidate.validate()?;

        let receipt = client
            .execute(
                contract,
                role.percentage_setter(),
                &[Token::Uint(U256::from(fixed))],
                U256::zero(),
            )
            .await?;
        tracing::info!(%role, percentage = fixed, network = %network, "Fee percentage updated");
        self.mirror(&network, role.percentage_field(), json!(fixed))
            .await;

        Ok(RoleUpdate {
            role,
            field: FeeField::Percentage,
            outcome: UpdateOutcome::Applied {
                transaction_hash: format_hash(&receipt.transaction_hash),
                block_number: receipt.block_number,
            },
        })
    }

    /// Set one role's wallet
    pub async fn update_wallet_address(&self, role: FeeRole, address: Address) -> Result<RoleUpdate> {
        if address.is_zero() {
            return Err(PaymentError::invalid_address(format!(
                "{} wallet cannot be the zero address",
                role
            )));
        }
        let (client, contract, network) = self.owner_client().await?;

        let receipt = client
            .execute(
                contract,
                role.wallet_setter(),
                &[Token::Address(address)],
                U256::zero(),
            )
            .await?;
        tracing::info!(%role, wallet = %format_address(&address), network = %network, "Fee wallet updated");
        self.mirror(&network, role.wallet_field(), json!(format_address(&address)))
            .await;

        Ok(RoleUpdate {
            role,
            field: FeeField::Wallet,
            outcome: UpdateOutcome::Applied {
                transaction_hash: format_hash(&receipt.transaction_hash),
                block_number: receipt.block_number,
            },
        })
    }

    /// Bring the contract in line with `target`, one transaction per changed field
    ///
    /// The combined cap is checked before anything is submitted. After that every
    /// field is attempted even if an earlier one failed.
    pub async fn update_distribution(
        &self,
        target: &FeeDistributionConfig,
    ) -> Result<DistributionUpdateReport> {
        target.validate()?;
        for role in FeeRole::all() {
            if target.wallet(role).is_zero() {
                return Err(PaymentError::invalid_address(format!(
                    "{} wallet cannot be the zero address",
                    role
                )));
            }
        }

        let (client, contract, network) = self.owner_client().await?;
        let current = read_distribution(&client, contract).await?;
        let mut report = DistributionUpdateReport::default();

        for role in FeeRole::all() {
            let wallet = target.wallet(role);
            let outcome = if current.wallet(role) == wallet {
                UpdateOutcome::Unchanged
            } else {
                let result = client
                    .execute(contract, role.wallet_setter(), &[Token::Address(wallet)], U256::zero())
                    .await;
                if result.is_ok() {
                    self.mirror(&network, role.wallet_field(), json!(format_address(&wallet)))
                        .await;
                }
                outcome_of(role, FeeField::Wallet, result)
            };
            report.updates.push(RoleUpdate {
                role,
                field: FeeField::Wallet,
                outcome,
            });

            let percentage = target.percentage(role);
            let outcome = if current.percentage(role) == percentage {
                UpdateOutcome::Unchanged
            } else {
                let result = client
                    .execute(
                        contract,
                        role.percentage_setter(),
                        &[Token::Uint(U256::from(percentage))],
                        U256::zero(),
                    )
                    .await;
                if result.is_ok() {
                    self.mirror(&network, role.percentage_field(), json!(percentage))
                        .await;
                }
                outcome_of(role, FeeField::Percentage, result)
            };
            report.updates.push(RoleUpdate {
                role,
                field: FeeField::Percentage,
                outcome,
            });
        }

        if !report.is_complete() {
            tracing::warn!(failed = ?report.failed_roles(), "Fee distribution partially applied");
        }
        Ok(report)
    }

    /// Connected owner client for the session's network
    async fn owner_client(&self) -> Result<(ContractClient, Address, String)> {
        let snapshot = self.session.snapshot().await?;
        let network = session_network_key(&snapshot.session)
            .ok_or_else(|| PaymentError::unsupported_network(&snapshot.session.network_name))?;
        let contract = self
            .resolver
            .require(&network, ContractFamily::Payment)
            .await?;
        let client = ContractClient::from_snapshot(&snapshot).with_confirm_policy(self.policy);
        client.ensure_owner(contract).await?;
        Ok((client, contract, network))
    }

    async fn mirror(&self, network: &str, field: &str, value: Value) {
        let mut patch = Map::new();
        patch.insert(field.to_string(), value);
        patch.insert("network".to_string(), json!(network));
        patch.insert("updatedAt".to_string(), json!(Utc::now().to_rfc3339()));
        if let Err(e) = self
            .store()
            .set_merge(
                layout::SETTINGS_COLLECTION,
                layout::PAYMENT_CONFIG_DOC,
                Value::Object(patch),
            )
            .await
        {
            tracing::warn!(field, error = %e, "Failed to mirror fee configuration");
        }
    }
}

fn outcome_of(
    role: FeeRole,
    field: FeeField,
    result: Result<crate::provider::TransactionReceipt>,
) -> UpdateOutcome {
    match result {
        Ok(receipt) => UpdateOutcome::Applied {
            transaction_hash: format_hash(&receipt.transaction_hash),
            block_number: receipt.block_number,
        },
        Err(e) => {
            tracing::warn!(%role, ?field, error = %e, "Fee update failed");
            UpdateOutcome::Failed {
                code: e.code().to_string(),
                message: e.to_string(),
            }
        }
    }
}

/// Read all four roles from the contract
pub async fn read_distribution(
    client: &ContractClient,
    contract: Address,
) -> Result<FeeDistributionConfig> {
    let mut config = FeeDistributionConfig::default();
    for role in FeeRole::all() {
        let wallet = client.read_address(contract, role.wallet_getter(), &[]).await?;
        let percentage = client
            .read_uint(contract, role.percentage_getter(), &[])
            .await?;
        if percentage > U256::from(u32::MAX) {
            return Err(PaymentError::InvalidDistribution(format!(
                "{} percentage out of range",
                role
            )));
        }
        config.set_wallet(role, wallet);
        config.set_percentage(role, percentage.low_u32());
    }
    Ok(config)
}

/// Distribution mirrored into the store, if readable
///
/// The mirror is written one field at a time, so roles that were never updated
/// through this service may be absent. A role with neither field counts as
/// unassigned (no wallet, 0%). A role with only one of its two fields makes the
/// split unknowable and no distribution is returned.
pub async fn mirrored_distribution(store: &dyn ConfigStore) -> Option<FeeDistributionConfig> {
    let doc = match store
        .get(layout::SETTINGS_COLLECTION, layout::PAYMENT_CONFIG_DOC)
        .await
    {
        Ok(Some(doc)) => doc,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(error = %e, "Fee configuration mirror unavailable");
            return None;
        }
    };
    distribution_from_mirror(&doc)
}

fn distribution_from_mirror(doc: &Document) -> Option<FeeDistributionConfig> {
    let mut config = FeeDistributionConfig::default();
    let mut mirrored_roles = 0;
    for role in FeeRole::all() {
        let wallet = doc.field(&[role.wallet_field()]);
        let percentage = doc.field(&[role.percentage_field()]);
        match (wallet, percentage) {
            (None, None) => continue,
            (Some(wallet), Some(percentage)) => {
                let Some(wallet) = wallet.as_str().and_then(|s| parse_address(s).ok()) else {
                    tracing::warn!(field = role.wallet_field(), "Unreadable mirrored fee wallet");
                    return None;
                };
                let Some(percentage) = mirrored_percentage(percentage) else {
                    tracing::warn!(field = role.percentage_field(), "Unreadable mirrored fee percentage");
                    return None;
                };
                config.set_wallet(role, wallet);
                config.set_percentage(role, percentage);
                mirrored_roles += 1;
            }
            (Some(_), None) | (None, Some(_)) => {
                let missing = if wallet.is_none() {
                    role.wallet_field()
                } else {
                    role.percentage_field()
                };
                tracing::debug!(%role, missing, "Fee mirror incomplete, no distribution snapshot");
                return None;
            }
        }
    }
    if mirrored_roles == 0 {
        return None;
    }
    if let Err(e) = config.validate() {
        tracing::warn!(error = %e, "Mirrored fee distribution is invalid");
        return None;
    }
    Some(config)
}

fn mirrored_percentage(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
