//! Fee distribution configuration
//!
//! Percentages are kept in the contract's base-1000 fixed point: one unit is 0.1%,
//! so `50` means 5%. The four roles together may not take more than 300 units
//! (30%); whatever remains, never less than 70%, goes to the main wallet.

use crate::{PaymentError, Result};
use ethereum_types::{Address, U256};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-point denominator (100%)
pub const PERCENT_BASE: u32 = 1000;

/// Maximum combined share of the four roles (30%)
pub const MAX_COMBINED_PERCENTAGE: u32 = 300;

/// Minimum share left to the main wallet (70%)
pub const MIN_MAIN_WALLET_SHARE: u32 = PERCENT_BASE - MAX_COMBINED_PERCENTAGE;

/// Recipient roles of the payment contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeeRole {
    FeeCollector,
    Development,
    Charity,
    Evolution,
}

impl FeeRole {
    /// All roles in contract order
    pub fn all() -> [FeeRole; 4] {
        [
            FeeRole::FeeCollector,
            FeeRole::Development,
            FeeRole::Charity,
            FeeRole::Evolution,
        ]
    }

    /// Contract getter for the role's wallet
    pub fn wallet_getter(&self) -> &'static str {
        match self {
            FeeRole::FeeCollector => "feeCollector()",
            FeeRole::Development => "developmentWallet()",
            FeeRole::Charity => "charityWallet()",
            FeeRole::Evolution => "evolutionWallet()",
        }
    }

    /// Contract setter for the role's wallet
    pub fn wallet_setter(&self) -> &'static str {
        match self {
            FeeRole::FeeCollector => "setFeeCollector(address)",
            FeeRole::Development => "setDevelopmentWallet(address)",
            FeeRole::Charity => "setCharityWallet(address)",
            FeeRole::Evolution => "setEvolutionWallet(address)",
        }
    }

    /// Contract getter for the role's percentage
    pub fn percentage_getter(&self) -> &'static str {
        match self {
            FeeRole::FeeCollector => "feePercentage()",
            FeeRole::Development => "developmentPercentage()",
            FeeRole::Charity => "charityPercentage()",
            FeeRole::Evolution => "evolutionPercentage()",
        }
    }

    /// Contract setter for the role's percentage
    pub fn percentage_setter(&self) -> &'static str {
        match self {
            FeeRole::FeeCollector => "setFeePercentage(uint256)",
            FeeRole::Development => "setDevelopmentPercentage(uint256)",
            FeeRole::Charity => "setCharityPercentage(uint256)",
            FeeRole::Evolution => "setEvolutionPercentage(uint256)",
        }
    }

    /// Store field mirroring the role's wallet
    pub fn wallet_field(&self) -> &'static str {
        match self {
            FeeRole::FeeCollector => "feeCollector",
            FeeRole::Development => "developmentWallet",
            FeeRole::Charity => "charityWallet",
            FeeRole::Evolution => "evolutionWallet",
        }
    }

    /// Store field mirroring the role's percentage
    pub fn percentage_field(&self) -> &'static str {
        match self {
            FeeRole::FeeCollector => "feePercentage",
            FeeRole::Development => "developmentPercentage",
            FeeRole::Charity => "charityPercentage",
            FeeRole::Evolution => "evolutionPercentage",
        }
    }
}

impl fmt::Display for FeeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeeRole::FeeCollector => "fee collector",
            FeeRole::Development => "development",
            FeeRole::Charity => "charity",
            FeeRole::Evolution => "evolution",
        };
        f.write_str(name)
    }
}

/// Convert a display percentage (0–100, one decimal) to base-1000 fixed point
pub fn to_fixed_point(display: Decimal) -> Result<u32> {
    if display.is_sign_negative() || display > Decimal::from(100) {
        return Err(PaymentError::InvalidDistribution(format!(
            "percentage {} must be between 0 and 100",
            display
        )));
    }
    (display * Decimal::from(10))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u32()
        .ok_or_else(|| PaymentError::InvalidDistribution(format!("percentage {}", display)))
}

/// Convert a base-1000 fixed-point value to a display percentage
pub fn to_display(fixed: u32) -> Decimal {
    Decimal::new(fixed as i64, 1)
}

/// Split of the fee between recipients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeDistributionConfig {
    #[serde(rename = "feeCollector")]
    pub fee_collector_address: Address,
    #[serde(rename = "developmentWallet")]
    pub development_wallet_address: Address,
    #[serde(rename = "charityWallet")]
    pub charity_wallet_address: Address,
    #[serde(rename = "evolutionWallet")]
    pub evolution_wallet_address: Address,
    pub fee_percentage: u32,
    pub development_percentage: u32,
    pub charity_percentage: u32,
    pub evolution_percentage: u32,
}

impl Default for FeeDistributionConfig {
    fn default() -> Self {
        Self {
            fee_collector_address: Address::zero(),
            development_wallet_address: Address::zero(),
            charity_wallet_address: Address::zero(),
            evolution_wallet_address: Address::zero(),
            fee_percentage: 0,
            development_percentage: 0,
            charity_percentage: 0,
            evolution_percentage: 0,
        }
    }
}

impl FeeDistributionConfig {
    /// Wallet of a role
    pub fn wallet(&self, role: FeeRole) -> Address {
        match role {
            FeeRole::FeeCollector => self.fee_collector_address,
            FeeRole::Development => self.development_wallet_address,
            FeeRole::Charity => self.charity_wallet_address,
            FeeRole::Evolution => self.evolution_wallet_address,
        }
    }

    /// Set the wallet of a role
    pub fn set_wallet(&mut self, role: FeeRole, address: Address) {
        match role {
            FeeRole::FeeCollector => self.fee_collector_address = address,
            FeeRole::Development => self.development_wallet_address = address,
            FeeRole::Charity => self.charity_wallet_address = address,
            FeeRole::Evolution => self.evolution_wallet_address = address,
        }
    }

    /// Fixed-point percentage of a role
    pub fn percentage(&self, role: FeeRole) -> u32 {
        match role {
            FeeRole::FeeCollector => self.fee_percentage,
            FeeRole::Development => self.development_percentage,
            FeeRole::Charity => self.charity_percentage,
            FeeRole::Evolution => self.evolution_percentage,
        }
    }

    /// Set the fixed-point percentage of a role
    pub fn set_percentage(&mut self, role: FeeRole, value: u32) {
        match role {
            FeeRole::FeeCollector => self.fee_percentage = value,
            FeeRole::Development => self.development_percentage = value,
            FeeRole::Charity => self.charity_percentage = value,
            FeeRole::Evolution => self.evolution_percentage = value,
        }
    }

    /// Combined fixed-point share of all roles
    pub fn total_percentage(&self) -> u32 {
        FeeRole::all().iter().map(|r| self.percentage(*r)).sum()
    }

    /// Implicit main-wallet share, floored at 70%
    pub fn main_wallet_share(&self) -> u32 {
        PERCENT_BASE
            .saturating_sub(self.total_percentage())
            .max(MIN_MAIN_WALLET_SHARE)
    }

    /// Check the combined cap
    pub fn validate(&self) -> Result<()> {
        validate_total(self.total_percentage())
    }

    /// Split an amount (in base units) according to this configuration
    pub fn split(&self, amount: U256) -> DistributionSnapshot {
        let share = |pct: u32| amount * U256::from(pct) / U256::from(PERCENT_BASE);
        let fee_collector = share(self.fee_percentage);
        let development = share(self.development_percentage);
        let charity = share(self.charity_percentage);
        let evolution = share(self.evolution_percentage);
        let distributed = fee_collector + development + charity + evolution;
        DistributionSnapshot {
            fee_collector: fee_collector.to_string(),
            development: development.to_string(),
            charity: charity.to_string(),
            evolution: evolution.to_string(),
            main_wallet: amount.saturating_sub(distributed).to_string(),
            fee_percentage: self.fee_percentage,
            development_percentage: self.development_percentage,
            charity_percentage: self.charity_percentage,
            evolution_percentage: self.evolution_percentage,
        }
    }
}

/// Reject a combined fixed-point total above 30%
pub fn validate_total(total: u32) -> Result<()> {
    if total > MAX_COMBINED_PERCENTAGE {
        return Err(PaymentError::InvalidDistribution(format!(
            "Total percentage cannot exceed 30% (got {}%)",
            to_display(total)
        )));
    }
    Ok(())
}

/// Amounts each recipient received for one payment, in base units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionSnapshot {
    pub fee_collector: String,
    pub development: String,
    pub charity: String,
    pub evolution: String,
    pub main_wallet: String,
    pub fee_percentage: u32,
    pub development_percentage: u32,
    pub charity_percentage: u32,
    pub evolution_percentage: u32,
}
