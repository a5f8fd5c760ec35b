use alloy_primitives::{
    utils::{format_units, parse_units},
    U256,
};
use std::str::FromStr;

use crate::error::{Error, Result};

pub const GWEI_DECIMALS: u8 = 9;
pub const ETHER_DECIMALS: u8 = 18;

/// Parses a decimal gwei amount ("1.5") into wei.
pub fn parse_gwei(input: &str) -> Result<U256> {
    parse_decimal(input, GWEI_DECIMALS)
}

/// Formats wei as gwei, without trailing fraction zeros.
pub fn format_gwei(wei: U256) -> String {
    format_decimal(wei, GWEI_DECIMALS)
}

/// Formats wei in the native currency (18 decimals), without trailing fraction zeros.
pub fn format_ether(wei: U256) -> String {
    format_decimal(wei, ETHER_DECIMALS)
}

fn parse_decimal(input: &str, decimals: u8) -> Result<U256> {
    let amount = input.trim();
    if amount.is_empty() || amount.starts_with('-') {
        return Err(Error::InvalidInput(format!("Invalid amount: {:?}", input)));
    }
    if let Some((_, fraction)) = amount.split_once('.') {
        if fraction.len() > decimals as usize {
            return Err(Error::InvalidInput(format!(
                "Amount {} has more than {} fraction digits",
                amount, decimals
            )));
        }
    }

    parse_units(amount, decimals)
        .map(|units| units.get_absolute())
        .map_err(|e| Error::InvalidInput(format!("Invalid amount {}: {}", amount, e)))
}

fn format_decimal(value: U256, decimals: u8) -> String {
    match format_units(value, decimals) {
        Ok(formatted) => trim_fraction(formatted),
        Err(e) => {
            tracing::warn!("Failed to format {} with {} decimals: {}", value, decimals, e);
            value.to_string()
        }
    }
}

fn trim_fraction(mut formatted: String) -> String {
    if formatted.contains('.') {
        while formatted.ends_with('0') {
            formatted.pop();
        }
        if formatted.ends_with('.') {
            formatted.pop();
        }
    }
    formatted
}

/// Native-to-fiat conversion rate kept as a scaled integer so that
/// conversions never go through floating point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiatRate {
    scaled: U256,
    decimals: u8,
}

impl FiatRate {
    /// Converts wei into hundredths of the fiat unit, rounding half up.
    pub fn to_fiat_cents(&self, wei: U256) -> U256 {
        let numerator = wei
            .saturating_mul(self.scaled)
            .saturating_mul(U256::from(100u64));
        let denominator =
            U256::from(10u64).pow(U256::from(ETHER_DECIMALS as u64 + self.decimals as u64));

        numerator.saturating_add(denominator / U256::from(2u64)) / denominator
    }

    pub fn format(&self, wei: U256) -> String {
        format_fiat_cents(self.to_fiat_cents(wei))
    }
}

impl FromStr for FiatRate {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let rate = input.trim();
        let decimals = rate
            .split_once('.')
            .map(|(_, fraction)| fraction.len())
            .unwrap_or(0);
        if decimals > ETHER_DECIMALS as usize {
            return Err(Error::InvalidInput(format!(
                "Conversion rate {} is too precise",
                rate
            )));
        }
        let decimals = decimals as u8;

        Ok(Self {
            scaled: parse_decimal(rate, decimals)?,
            decimals,
        })
    }
}

pub fn format_fiat_cents(cents: U256) -> String {
    let hundred = U256::from(100u64);
    format!("{}.{:02}", cents / hundred, (cents % hundred).to::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gwei_round_trip() {
        let wei = U256::from(1_234_567_891u64);
        let gwei = format_gwei(wei);
        assert_eq!(gwei, "1.234567891");
        assert_eq!(parse_gwei(&gwei).unwrap(), wei);
    }

    #[test]
    fn test_format_gwei_trims_zeros() {
        assert_eq!(format_gwei(U256::from(50_000_000_000u64)), "50");
        assert_eq!(format_gwei(U256::from(1_500_000_000u64)), "1.5");
        assert_eq!(format_gwei(U256::ZERO), "0");
    }

    #[test]
    fn test_parse_gwei_rejects_bad_input() {
        assert!(parse_gwei("").is_err());
        assert!(parse_gwei("-1").is_err());
        assert!(parse_gwei("abc").is_err());
        assert!(parse_gwei("0.0000000001").is_err());
    }

    #[test]
    fn test_format_ether() {
        assert_eq!(
            format_ether(U256::from(1_000_000_000_000_000u64)),
            "0.001"
        );
    }

    #[test]
    fn test_fiat_conversion_rounds_half_up() {
        let rate: FiatRate = "2000".parse().unwrap();
        // 0.00125 ETH * 2000 = 2.5
        assert_eq!(rate.format(U256::from(1_250_000_000_000_000u64)), "2.50");
        // 0.0000025 ETH * 2000 = 0.005 -> 0.01
        assert_eq!(rate.format(U256::from(2_500_000_000_000u64)), "0.01");
        // 0.0000024 ETH * 2000 = 0.0048 -> 0.00
        assert_eq!(rate.format(U256::from(2_400_000_000_000u64)), "0.00");
    }

    #[test]
    fn test_fractional_fiat_rate() {
        let rate: FiatRate = "1234.56".parse().unwrap();
        assert_eq!(
            rate.format(U256::from(1_000_000_000_000_000_000u64)),
            "1234.56"
        );
    }
}
