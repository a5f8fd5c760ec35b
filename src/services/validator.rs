use alloy_primitives::U256;

use crate::models::{
    estimate::{EstimateLevel, FeeEstimateSnapshot, GasEstimateType},
    fees::{DerivedCosts, ReconciledFees},
    validation::{ErrorKind, SubmitBlocker, ValidationField, ValidationResult, WarningKind},
};

/// Everything the validator reads, taken from one logical tick.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub fees: &'a ReconciledFees,
    pub costs: &'a DerivedCosts,
    pub snapshot: &'a FeeEstimateSnapshot,
    pub is_loading: bool,
    pub transaction_value: U256,
    pub balance: Option<U256>,
    pub minimum_gas_limit: u64,
    pub maximum_gas_limit: u64,
    pub custom_nonce: Option<u64>,
    pub next_nonce: Option<u64>,
}

/// Flags outside the fee state that decide whether a submit may proceed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitGate {
    pub submitting: bool,
    pub simulation_fails: bool,
    pub confirmed_anyway: bool,
    pub is_loading: bool,
}

/// Classifies the reconciled state. Within a field the first rule that
/// matches wins; nothing carries over between calls.
pub fn validate(ctx: &ValidationContext<'_>) -> ValidationResult {
    let mut result = ValidationResult::default();

    check_balance(ctx, &mut result);
    check_gas_limit(ctx, &mut result);
    check_estimates(ctx, &mut result);
    check_fee_values(ctx, &mut result);
    check_fee_ranges(ctx, &mut result);
    check_nonce(ctx, &mut result);

    result
}

fn check_balance(ctx: &ValidationContext<'_>, result: &mut ValidationResult) {
    let Some(balance) = ctx.balance else {
        return;
    };
    let required = ctx
        .transaction_value
        .saturating_add(ctx.costs.maximum_cost.unwrap_or(U256::ZERO));

    if balance < required {
        result.error(ValidationField::Balance, ErrorKind::InsufficientFunds);
        result.balance_error = true;
    }
}

fn check_gas_limit(ctx: &ValidationContext<'_>, result: &mut ValidationResult) {
    let gas_limit = ctx.fees.gas_limit;
    if gas_limit < ctx.minimum_gas_limit || gas_limit > ctx.maximum_gas_limit {
        result.error(ValidationField::GasLimit, ErrorKind::GasLimitOutOfBounds);
    }
}

fn check_estimates(ctx: &ValidationContext<'_>, result: &mut ValidationResult) {
    if ctx.is_loading {
        return;
    }
    if !ctx.snapshot.has_usable_fees() && !ctx.fees.fee_is_custom {
        result.error(ValidationField::GasFee, ErrorKind::GasPriceFetchFailure);
        return;
    }

    if ctx.snapshot.kind == GasEstimateType::EthGasPrice {
        result.warn(ValidationField::GasFee, WarningKind::EstimatesDegraded);
    }
    let level = ctx.fees.estimate_level;
    if EstimateLevel::NETWORK.contains(&level) && ctx.snapshot.level(level).is_none() {
        result.warn(ValidationField::GasFee, WarningKind::EstimatesUnavailable);
    }
}

fn check_fee_values(ctx: &ValidationContext<'_>, result: &mut ValidationResult) {
    let fees = ctx.fees;
    // While loading, only user-owned values can be sent.
    if !ctx.is_loading || fees.fee_is_custom {
        let required = if fees.supports_fee_market {
            vec![
                (ValidationField::MaxFeePerGas, fees.max_fee_per_gas),
                (ValidationField::MaxPriorityFeePerGas, fees.max_priority_fee_per_gas),
            ]
        } else {
            vec![(ValidationField::GasPrice, fees.gas_price)]
        };
        for (field, value) in required {
            if value.is_none() {
                result.error(field, ErrorKind::FeeValueMissing);
            }
        }
    }

    if fees.supports_fee_market {
        if fees.max_priority_fee_per_gas == Some(U256::ZERO) {
            result.error(
                ValidationField::MaxPriorityFeePerGas,
                ErrorKind::MaxPriorityFeeBelowMinimum,
            );
        }
        if let (Some(max_fee), Some(priority)) =
            (fees.max_fee_per_gas, fees.max_priority_fee_per_gas)
        {
            if max_fee < priority {
                result.error(ValidationField::MaxFeePerGas, ErrorKind::MaxFeeImbalance);
            }
        }
    } else if fees.gas_price == Some(U256::ZERO) {
        result.error(ValidationField::GasPrice, ErrorKind::GasPriceTooLow);
    }
}

/// Warns when user values fall outside what the network tiers suggest.
fn check_fee_ranges(ctx: &ValidationContext<'_>, result: &mut ValidationResult) {
    let fees = ctx.fees;
    if !fees.supports_fee_market || ctx.snapshot.kind != GasEstimateType::FeeMarket {
        return;
    }
    let low = ctx.snapshot.level(EstimateLevel::Low).map(|e| e.fees);
    let high = ctx.snapshot.level(EstimateLevel::High).map(|e| e.fees);

    let ranges = [
        (
            ValidationField::MaxPriorityFeePerGas,
            fees.max_priority_fee_per_gas,
            low.and_then(|f| f.max_priority_fee_per_gas),
            high.and_then(|f| f.max_priority_fee_per_gas),
            WarningKind::MaxPriorityFeeTooLow,
            WarningKind::MaxPriorityFeeHigh,
        ),
        (
            ValidationField::MaxFeePerGas,
            fees.max_fee_per_gas,
            low.and_then(|f| f.max_fee_per_gas),
            high.and_then(|f| f.max_fee_per_gas),
            WarningKind::MaxFeeTooLow,
            WarningKind::MaxFeeHigh,
        ),
    ];

    for (field, value, low, high, too_low, too_high) in ranges {
        let Some(value) = value else {
            continue;
        };
        if result.errors.contains_key(&field) {
            continue;
        }
        if low.is_some_and(|low| value < low) {
            result.warn(field, too_low);
        } else if high.is_some_and(|high| {
            value.saturating_mul(U256::from(2u64)) > high.saturating_mul(U256::from(3u64))
        }) {
            result.warn(field, too_high);
        }
    }
}

fn check_nonce(ctx: &ValidationContext<'_>, result: &mut ValidationResult) {
    if let (Some(custom), Some(next)) = (ctx.custom_nonce, ctx.next_nonce) {
        if custom > next {
            result.warn(ValidationField::Nonce, WarningKind::NonceAhead);
        }
    }
}

/// Returns the first reason a submit must not proceed, if any.
///
/// An acknowledged simulation failure waives validation errors, except
/// insufficient funds and missing fee values which nothing waives.
pub fn submit_blocker(
    validation: &ValidationResult,
    fees: &ReconciledFees,
    gate: SubmitGate,
) -> Option<SubmitBlocker> {
    if gate.submitting {
        return Some(SubmitBlocker::AlreadySubmitting);
    }
    if validation.balance_error {
        return Some(SubmitBlocker::InsufficientFunds);
    }
    if validation.has_missing_fees() {
        return Some(SubmitBlocker::MissingFees);
    }
    if gate.simulation_fails && !gate.confirmed_anyway {
        return Some(SubmitBlocker::SimulationNotAcknowledged);
    }
    if gate.is_loading && !fees.fee_is_custom {
        return Some(SubmitBlocker::EstimatesLoading);
    }
    if validation.has_waivable_errors() && !gate.confirmed_anyway {
        return Some(SubmitBlocker::ValidationErrors);
    }
    None
}
