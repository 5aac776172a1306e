//! Conversion between human amounts and on-chain base units

use crate::{PaymentError, Result};
use ethereum_types::U256;
use rust_decimal::Decimal;

/// Convert a human amount to base units, e.g. `12.5` with 6 decimals → `12500000`
pub fn parse_units(amount: Decimal, decimals: u8) -> Result<U256> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(PaymentError::invalid_amount(format!(
            "amount {} is negative",
            amount
        )));
    }
    let amount = amount.normalize();
    let scale = amount.scale();
    if scale > u32::from(decimals) {
        return Err(PaymentError::invalid_amount(format!(
            "amount {} has more than {} decimal places",
            amount, decimals
        )));
    }
    let mantissa = amount.mantissa().unsigned_abs();
    U256::from(mantissa)
        .checked_mul(U256::exp10((u32::from(decimals) - scale) as usize))
        .ok_or_else(|| PaymentError::invalid_amount(format!("amount {} overflows", amount)))
}

/// Format base units as a human amount without trailing zeros
pub fn format_units(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }
    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };
    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}
