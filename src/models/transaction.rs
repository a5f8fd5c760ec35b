use alloy_primitives::{Address, Bytes, U256, U64};
use serde::{Deserialize, Serialize};

use super::estimate::{EstimateLevel, FeeValues};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxParams {
    pub from: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<U64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<U64>,
}

impl TxParams {
    pub fn fees(&self) -> FeeValues {
        FeeValues {
            gas_price: self.gas_price,
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
        }
    }

    pub fn gas_limit(&self) -> Option<u64> {
        self.gas.map(|gas| gas.to::<u64>())
    }

    /// A transaction that only carries a gas price is priced the legacy way
    /// even on a fee-market network.
    pub fn is_legacy(&self) -> bool {
        self.gas_price.is_some()
            && self.max_fee_per_gas.is_none()
            && self.max_priority_fee_per_gas.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DappSuggestedGasFees {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U256>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub tx_params: TxParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_fee_level: Option<EstimateLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dapp_suggested_gas_fees: Option<DappSuggestedGasFees>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_base_fee: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_fails: Option<SimulationFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl Transaction {
    pub fn new(id: impl Into<String>, tx_params: TxParams) -> Self {
        Self {
            id: id.into(),
            tx_params,
            user_fee_level: None,
            dapp_suggested_gas_fees: None,
            estimated_base_fee: None,
            simulation_fails: None,
            origin: None,
        }
    }

    pub fn has_dapp_suggested_fees(&self) -> bool {
        self.dapp_suggested_gas_fees.as_ref().is_some_and(|dapp| {
            dapp.gas_price.is_some()
                || dapp.max_fee_per_gas.is_some()
                || dapp.max_priority_fee_per_gas.is_some()
        })
    }

    /// Whether the current txParams fees are exactly what the dApp suggested.
    pub fn dapp_suggested_fees_match(&self) -> bool {
        dapp_suggested_fees_match(&self.tx_params.fees(), self.dapp_suggested_gas_fees.as_ref())
    }
}

/// Compares fee values against a dApp suggestion.
///
/// Matches when the gas prices are equal, when both fee-market fields equal
/// the suggested gas price, or when both fee-market fields equal the
/// suggested fee-market fields. Either side being empty never matches.
pub fn dapp_suggested_fees_match(fees: &FeeValues, dapp: Option<&DappSuggestedGasFees>) -> bool {
    let Some(dapp) = dapp else {
        return false;
    };
    let dapp_is_empty = dapp.gas_price.is_none()
        && dapp.max_fee_per_gas.is_none()
        && dapp.max_priority_fee_per_gas.is_none();
    if fees.is_empty() || dapp_is_empty {
        return false;
    }

    let gas_price_matches = fees.gas_price.is_some() && fees.gas_price == dapp.gas_price;
    let fee_market_matches_gas_price = dapp.gas_price.is_some()
        && fees.max_fee_per_gas == dapp.gas_price
        && fees.max_priority_fee_per_gas == dapp.gas_price;
    let fee_market_matches = fees.max_fee_per_gas.is_some()
        && fees.max_fee_per_gas == dapp.max_fee_per_gas
        && fees.max_priority_fee_per_gas == dapp.max_priority_fee_per_gas;

    gas_price_matches || fee_market_matches_gas_price || fee_market_matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gwei(n: u64) -> U256 {
        U256::from(n) * U256::from(1_000_000_000u64)
    }

    #[test]
    fn test_matching_fee_market_suggestion() {
        let fees = FeeValues {
            gas_price: None,
            max_fee_per_gas: Some(gwei(50)),
            max_priority_fee_per_gas: Some(gwei(2)),
        };
        let dapp = DappSuggestedGasFees {
            max_fee_per_gas: Some(gwei(50)),
            max_priority_fee_per_gas: Some(gwei(2)),
            ..Default::default()
        };
        assert!(dapp_suggested_fees_match(&fees, Some(&dapp)));
    }

    #[test]
    fn test_fee_market_fields_matching_suggested_gas_price() {
        let fees = FeeValues {
            gas_price: None,
            max_fee_per_gas: Some(gwei(30)),
            max_priority_fee_per_gas: Some(gwei(30)),
        };
        let dapp = DappSuggestedGasFees {
            gas_price: Some(gwei(30)),
            ..Default::default()
        };
        assert!(dapp_suggested_fees_match(&fees, Some(&dapp)));
    }

    #[test]
    fn test_diverging_values_do_not_match() {
        let fees = FeeValues {
            gas_price: None,
            max_fee_per_gas: Some(gwei(51)),
            max_priority_fee_per_gas: Some(gwei(2)),
        };
        let dapp = DappSuggestedGasFees {
            max_fee_per_gas: Some(gwei(50)),
            max_priority_fee_per_gas: Some(gwei(2)),
            ..Default::default()
        };
        assert!(!dapp_suggested_fees_match(&fees, Some(&dapp)));
    }

    #[test]
    fn test_gas_price_only_does_not_match_fee_market_suggestion() {
        let fees = FeeValues {
            gas_price: Some(gwei(30)),
            ..Default::default()
        };
        let dapp = DappSuggestedGasFees {
            max_fee_per_gas: Some(gwei(30)),
            max_priority_fee_per_gas: Some(gwei(1)),
            ..Default::default()
        };
        assert!(!dapp_suggested_fees_match(&fees, Some(&dapp)));
    }

    #[test]
    fn test_empty_sides_never_match() {
        let dapp = DappSuggestedGasFees::default();
        assert!(!dapp_suggested_fees_match(&FeeValues::default(), Some(&dapp)));
        assert!(!dapp_suggested_fees_match(&FeeValues::default(), None));
    }

    #[test]
    fn test_transaction_deserializes_hex_params() {
        let tx: Transaction = serde_json::from_value(serde_json::json!({
            "id": "1",
            "txParams": {
                "from": "0x742d35Cc6634C0532925a3b844Bc454e4438f44e",
                "to": "0x95222290DD7278Aa3Ddd389Cc1E1d165CC4BAfe5",
                "value": "0x38d7ea4c68000",
                "gas": "0x5208",
                "maxFeePerGas": "0xba43b7400",
                "maxPriorityFeePerGas": "0x77359400"
            },
            "userFeeLevel": "medium"
        }))
        .unwrap();

        assert_eq!(tx.tx_params.gas_limit(), Some(21_000));
        assert_eq!(tx.tx_params.max_fee_per_gas, Some(gwei(50)));
        assert_eq!(tx.user_fee_level, Some(EstimateLevel::Medium));
        assert!(!tx.tx_params.is_legacy());
    }
}
