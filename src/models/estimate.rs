use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::fees::FeeField;

/// Which set of fee values the session is following.
///
/// `Custom` and `None` both mean the user owns the values: `Custom` after an
/// edit in this session, `None` when pre-existing custom values were kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EstimateLevel {
    Low,
    Medium,
    High,
    DappSuggested,
    Custom,
    None,
}

impl EstimateLevel {
    pub const NETWORK: [EstimateLevel; 3] =
        [EstimateLevel::Low, EstimateLevel::Medium, EstimateLevel::High];

    /// Levels whose values are derived rather than user-owned.
    pub fn follows_estimate(&self) -> bool {
        matches!(
            self,
            EstimateLevel::Low
                | EstimateLevel::Medium
                | EstimateLevel::High
                | EstimateLevel::DappSuggested
        )
    }
}

impl std::fmt::Display for EstimateLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EstimateLevel::Low => write!(f, "low"),
            EstimateLevel::Medium => write!(f, "medium"),
            EstimateLevel::High => write!(f, "high"),
            EstimateLevel::DappSuggested => write!(f, "dappSuggested"),
            EstimateLevel::Custom => write!(f, "custom"),
            EstimateLevel::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for EstimateLevel {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(EstimateLevel::Low),
            "medium" => Ok(EstimateLevel::Medium),
            "high" => Ok(EstimateLevel::High),
            "dappSuggested" => Ok(EstimateLevel::DappSuggested),
            "custom" => Ok(EstimateLevel::Custom),
            "none" => Ok(EstimateLevel::None),
            other => Err(crate::error::Error::InvalidInput(format!(
                "Unknown estimate level: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GasEstimateType {
    FeeMarket,
    Legacy,
    EthGasPrice,
    None,
}

impl std::fmt::Display for GasEstimateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GasEstimateType::FeeMarket => write!(f, "fee-market"),
            GasEstimateType::Legacy => write!(f, "legacy"),
            GasEstimateType::EthGasPrice => write!(f, "eth_gasPrice"),
            GasEstimateType::None => write!(f, "none"),
        }
    }
}

/// The three raw fee values, all in wei.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeValues {
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
}

impl FeeValues {
    pub fn get(&self, field: FeeField) -> Option<U256> {
        match field {
            FeeField::GasPrice => self.gas_price,
            FeeField::MaxFeePerGas => self.max_fee_per_gas,
            FeeField::MaxPriorityFeePerGas => self.max_priority_fee_per_gas,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.gas_price.is_none()
            && self.max_fee_per_gas.is_none()
            && self.max_priority_fee_per_gas.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBounds {
    pub lower_ms: u64,
    pub upper_ms: u64,
}

/// One estimate tier as delivered by the estimate source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelEstimate {
    pub fees: FeeValues,
    pub time_bounds_ms: Option<TimeBounds>,
}

/// A complete estimate delivery. Snapshots are replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeEstimateSnapshot {
    pub kind: GasEstimateType,
    pub by_level: BTreeMap<EstimateLevel, LevelEstimate>,
    pub base_fee_per_gas: Option<U256>,
}

impl FeeEstimateSnapshot {
    pub fn none() -> Self {
        Self {
            kind: GasEstimateType::None,
            by_level: BTreeMap::new(),
            base_fee_per_gas: None,
        }
    }

    pub fn fee_market(
        base_fee_per_gas: U256,
        levels: impl IntoIterator<Item = (EstimateLevel, LevelEstimate)>,
    ) -> Self {
        Self {
            kind: GasEstimateType::FeeMarket,
            by_level: levels.into_iter().collect(),
            base_fee_per_gas: Some(base_fee_per_gas),
        }
    }

    pub fn legacy(levels: impl IntoIterator<Item = (EstimateLevel, U256)>) -> Self {
        Self {
            kind: GasEstimateType::Legacy,
            by_level: levels
                .into_iter()
                .map(|(level, gas_price)| (level, LevelEstimate::gas_price(gas_price)))
                .collect(),
            base_fee_per_gas: None,
        }
    }

    /// Fallback used when only the node's single gas price is known.
    pub fn eth_gas_price(gas_price: U256) -> Self {
        Self {
            kind: GasEstimateType::EthGasPrice,
            by_level: EstimateLevel::NETWORK
                .iter()
                .map(|level| (*level, LevelEstimate::gas_price(gas_price)))
                .collect(),
            base_fee_per_gas: None,
        }
    }

    pub fn level(&self, level: EstimateLevel) -> Option<&LevelEstimate> {
        self.by_level.get(&level).filter(|estimate| !estimate.fees.is_empty())
    }

    pub fn has_usable_fees(&self) -> bool {
        self.kind != GasEstimateType::None
            && self.by_level.values().any(|estimate| !estimate.fees.is_empty())
    }
}

impl LevelEstimate {
    pub fn gas_price(gas_price: U256) -> Self {
        Self {
            fees: FeeValues {
                gas_price: Some(gas_price),
                ..Default::default()
            },
            time_bounds_ms: None,
        }
    }

    pub fn fee_market(max_fee_per_gas: U256, max_priority_fee_per_gas: U256) -> Self {
        Self {
            fees: FeeValues {
                gas_price: None,
                max_fee_per_gas: Some(max_fee_per_gas),
                max_priority_fee_per_gas: Some(max_priority_fee_per_gas),
            },
            time_bounds_ms: None,
        }
    }

    pub fn with_time_bounds(mut self, lower_ms: u64, upper_ms: u64) -> Self {
        self.time_bounds_ms = Some(TimeBounds { lower_ms, upper_ms });
        self
    }
}

/// What the estimate source currently publishes.
#[derive(Debug, Clone)]
pub struct EstimateFeed {
    pub snapshot: Arc<FeeEstimateSnapshot>,
    pub is_loading: bool,
}

impl EstimateFeed {
    pub fn loading() -> Self {
        Self {
            snapshot: Arc::new(FeeEstimateSnapshot::none()),
            is_loading: true,
        }
    }

    pub fn ready(snapshot: FeeEstimateSnapshot) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            is_loading: false,
        }
    }
}

/// Handle identifying one registration with the estimate poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PollingToken(pub u64);

impl std::fmt::Display for PollingToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "poll-{}", self.0)
    }
}
