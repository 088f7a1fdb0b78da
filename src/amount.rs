//! Raw-unit amount conversion
//!
//! The pipeline works exclusively in an asset's smallest unit. User-facing
//! decimal strings are converted here, at the boundary, with integer
//! arithmetic only.

use crate::error::{KeysignError, KeysignResult};

/// Convert a decimal amount string into raw units for an asset with the
/// given decimal precision.
///
/// Accepts plain integers ("5") and decimals ("0.015"). Rejects more
/// fraction digits than the asset carries rather than rounding silently.
pub fn to_raw_units(amount: &str, decimals: u8) -> KeysignResult<u128> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(KeysignError::EncodingFailure("empty amount".into()));
    }

    let (whole_str, fraction_str) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };

    if fraction_str.contains('.') {
        return Err(KeysignError::EncodingFailure(format!(
            "invalid amount: {}",
            amount
        )));
    }

    let whole: u128 = if whole_str.is_empty() {
        0
    } else {
        whole_str
            .parse()
            .map_err(|_| KeysignError::EncodingFailure(format!("invalid amount: {}", amount)))?
    };

    if fraction_str.len() > decimals as usize {
        return Err(KeysignError::EncodingFailure(format!(
            "amount {} has more than {} decimal places",
            amount, decimals
        )));
    }

    let fraction: u128 = if fraction_str.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", fraction_str, width = decimals as usize);
        padded
            .parse()
            .map_err(|_| KeysignError::EncodingFailure(format!("invalid amount: {}", amount)))?
    };

    let multiplier = 10u128
        .checked_pow(decimals as u32)
        .ok_or_else(|| KeysignError::EncodingFailure("decimal precision too large".into()))?;

    whole
        .checked_mul(multiplier)
        .and_then(|v| v.checked_add(fraction))
        .ok_or_else(|| KeysignError::EncodingFailure(format!("amount overflow: {}", amount)))
}

/// Format raw units back into a decimal string, trimming trailing zeros.
pub fn format_raw(raw: u128, decimals: u8) -> String {
    let divisor = 10u128.pow(decimals as u32);
    let whole = raw / divisor;
    let fraction = raw % divisor;

    if fraction == 0 {
        whole.to_string()
    } else {
        let fraction_str = format!("{:0>width$}", fraction, width = decimals as usize);
        format!("{}.{}", whole, fraction_str.trim_end_matches('0'))
    }
}
