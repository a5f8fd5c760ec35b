use alloy_primitives::U256;

use crate::{
    models::fees::{DerivedCosts, ReconciledFees},
    utils::units::FiatRate,
};

/// Derives the cost bounds of the reconciled fees. All arithmetic stays in
/// wei; only the fiat strings are rounded.
///
/// Fee-market: the minimum is what the transaction pays if the base fee does
/// not move, capped by the maximum it may ever pay. Legacy: both bounds are
/// the gas price times the gas limit.
pub fn derive_costs(fees: &ReconciledFees, fiat_rate: Option<&FiatRate>) -> DerivedCosts {
    let gas_limit = U256::from(fees.gas_limit);

    let bounds = if fees.supports_fee_market {
        fees.max_fee_per_gas.map(|max_fee| {
            let maximum = max_fee.saturating_mul(gas_limit);
            let priority = fees.max_priority_fee_per_gas.unwrap_or(U256::ZERO);
            let base_fee = fees.estimated_base_fee.unwrap_or(U256::ZERO);
            let minimum = priority
                .saturating_add(base_fee)
                .saturating_mul(gas_limit)
                .min(maximum);
            (minimum, maximum)
        })
    } else {
        fees.gas_price.map(|gas_price| {
            let total = gas_price.saturating_mul(gas_limit);
            (total, total)
        })
    };

    let field_fiat = |fee: Option<U256>| {
        fee.zip(fiat_rate)
            .map(|(fee, rate)| rate.format(fee.saturating_mul(gas_limit)))
    };
    let max_fee_per_gas_fiat = field_fiat(fees.max_fee_per_gas);
    let max_priority_fee_per_gas_fiat = field_fiat(fees.max_priority_fee_per_gas);

    let Some((minimum, maximum)) = bounds else {
        return DerivedCosts {
            max_fee_per_gas_fiat,
            max_priority_fee_per_gas_fiat,
            ..DerivedCosts::unavailable()
        };
    };

    DerivedCosts {
        minimum_cost: Some(minimum),
        maximum_cost: Some(maximum),
        minimum_fiat: fiat_rate.map(|rate| rate.format(minimum)),
        maximum_fiat: fiat_rate.map(|rate| rate.format(maximum)),
        max_fee_per_gas_fiat,
        max_priority_fee_per_gas_fiat,
    }
}
