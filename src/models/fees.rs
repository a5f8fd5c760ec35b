use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use super::estimate::{EstimateLevel, FeeValues, GasEstimateType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeeField {
    GasPrice,
    MaxFeePerGas,
    MaxPriorityFeePerGas,
}

impl FeeField {
    pub const ALL: [FeeField; 3] = [
        FeeField::GasPrice,
        FeeField::MaxFeePerGas,
        FeeField::MaxPriorityFeePerGas,
    ];
}

impl std::fmt::Display for FeeField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeeField::GasPrice => write!(f, "gasPrice"),
            FeeField::MaxFeePerGas => write!(f, "maxFeePerGas"),
            FeeField::MaxPriorityFeePerGas => write!(f, "maxPriorityFeePerGas"),
        }
    }
}

/// A direct user change to one of the editable inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualEdit {
    Fee(FeeField, U256),
    GasLimit(u64),
}

/// Read-only projection of the session's fee state at one logical tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledFees {
    pub supports_fee_market: bool,
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub gas_limit: u64,
    pub estimate_level: EstimateLevel,
    pub estimate_used: EstimateLevel,
    pub estimate_type: GasEstimateType,
    /// Base fee of the snapshot these values were reconciled against.
    pub estimated_base_fee: Option<U256>,
    /// Whether any fee input is pinned by the user.
    pub fee_is_custom: bool,
}

impl ReconciledFees {
    pub fn fees(&self) -> FeeValues {
        FeeValues {
            gas_price: self.gas_price,
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
        }
    }
}

/// Cost bounds in wei, with fiat values when a conversion rate is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedCosts {
    pub minimum_cost: Option<U256>,
    pub maximum_cost: Option<U256>,
    pub minimum_fiat: Option<String>,
    pub maximum_fiat: Option<String>,
    /// Per-field fiat amounts, each fee times the gas limit.
    pub max_fee_per_gas_fiat: Option<String>,
    pub max_priority_fee_per_gas_fiat: Option<String>,
}

impl DerivedCosts {
    pub fn unavailable() -> Self {
        Self {
            minimum_cost: None,
            maximum_cost: None,
            minimum_fiat: None,
            maximum_fiat: None,
            max_fee_per_gas_fiat: None,
            max_priority_fee_per_gas_fiat: None,
        }
    }
}
