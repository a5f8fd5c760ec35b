use alloy_primitives::{TxHash, U256};
use serde::{Deserialize, Serialize};

use super::{
    estimate::{EstimateLevel, GasEstimateType, TimeBounds},
    fees::FeeField,
    transaction::Transaction,
    validation::{SubmitBlocker, ValidationResult},
};
use crate::{
    services::{
        session::SessionSnapshot,
        submission::{SubmissionStatus, SubmitOutcome},
    },
    utils::units::{format_ether, format_gwei},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSessionRequest {
    pub transaction: Transaction,
    #[serde(default)]
    pub default_level: Option<EstimateLevel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectLevelRequest {
    pub level: EstimateLevel,
}

/// A manual fee edit; `value` is a decimal gwei amount.
#[derive(Debug, Clone, Deserialize)]
pub struct EditFeeRequest {
    pub field: FeeField,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasLimitRequest {
    pub gas_limit: u64,
}

/// Sets the nonce to send with; `null` clears it.
#[derive(Debug, Clone, Deserialize)]
pub struct NonceRequest {
    #[serde(default)]
    pub nonce: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostView {
    pub minimum_wei: Option<U256>,
    pub maximum_wei: Option<U256>,
    pub minimum_native: Option<String>,
    pub maximum_native: Option<String>,
    pub minimum_fiat: Option<String>,
    pub maximum_fiat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiat_currency: Option<String>,
}

/// What a client renders for a confirmation session. Fee amounts are gwei
/// strings, costs carry both wei and display strings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub transaction_id: String,
    pub estimate_level: EstimateLevel,
    pub estimate_used: EstimateLevel,
    pub estimate_type: GasEstimateType,
    pub supports_fee_market: bool,
    pub fee_is_custom: bool,
    pub is_loading: bool,
    pub gas_limit: u64,
    pub gas_price: Option<String>,
    pub max_fee_per_gas: Option<String>,
    pub max_priority_fee_per_gas: Option<String>,
    pub max_fee_per_gas_fiat: Option<String>,
    pub max_priority_fee_per_gas_fiat: Option<String>,
    pub estimated_base_fee: Option<String>,
    pub time_bounds_ms: Option<TimeBounds>,
    pub costs: CostView,
    pub balance: Option<String>,
    pub custom_nonce: Option<u64>,
    pub next_nonce: Option<u64>,
    pub recipient_name: Option<String>,
    pub validation: ValidationResult,
    pub submit_blocker: Option<SubmitBlocker>,
    pub submission: SubmissionStatus,
    pub submit_error: Option<String>,
    pub simulation_fails: bool,
    pub confirmed_anyway: bool,
}

impl SessionView {
    pub fn new(snapshot: SessionSnapshot, fiat_currency: &str) -> Self {
        let fees = snapshot.fees;
        let costs = snapshot.costs;
        let has_fiat = costs.minimum_fiat.is_some() || costs.maximum_fiat.is_some();

        Self {
            transaction_id: snapshot.transaction.id,
            estimate_level: fees.estimate_level,
            estimate_used: fees.estimate_used,
            estimate_type: fees.estimate_type,
            supports_fee_market: fees.supports_fee_market,
            fee_is_custom: fees.fee_is_custom,
            is_loading: snapshot.is_loading,
            gas_limit: fees.gas_limit,
            gas_price: fees.gas_price.map(format_gwei),
            max_fee_per_gas: fees.max_fee_per_gas.map(format_gwei),
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas.map(format_gwei),
            max_fee_per_gas_fiat: costs.max_fee_per_gas_fiat,
            max_priority_fee_per_gas_fiat: costs.max_priority_fee_per_gas_fiat,
            estimated_base_fee: fees.estimated_base_fee.map(format_gwei),
            time_bounds_ms: snapshot.time_bounds_ms,
            costs: CostView {
                minimum_wei: costs.minimum_cost,
                maximum_wei: costs.maximum_cost,
                minimum_native: costs.minimum_cost.map(format_ether),
                maximum_native: costs.maximum_cost.map(format_ether),
                minimum_fiat: costs.minimum_fiat,
                maximum_fiat: costs.maximum_fiat,
                fiat_currency: has_fiat.then(|| fiat_currency.to_string()),
            },
            balance: snapshot.balance.map(format_ether),
            custom_nonce: snapshot.custom_nonce,
            next_nonce: snapshot.next_nonce,
            recipient_name: snapshot.recipient_name,
            validation: snapshot.validation,
            submit_blocker: snapshot.submit_blocker,
            submission: snapshot.submission,
            submit_error: snapshot.submit_error,
            simulation_fails: snapshot.transaction.simulation_fails.is_some(),
            confirmed_anyway: snapshot.confirmed_anyway,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSessionResponse {
    pub created: bool,
    pub session: SessionView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum SubmitResponse {
    Submitted {
        #[serde(rename = "txHash")]
        tx_hash: TxHash,
    },
    Failed { error: String },
    Blocked { blocker: SubmitBlocker },
    Ignored,
    Discarded,
}

impl From<SubmitOutcome> for SubmitResponse {
    fn from(outcome: SubmitOutcome) -> Self {
        match outcome {
            SubmitOutcome::Submitted(tx_hash) => SubmitResponse::Submitted { tx_hash },
            SubmitOutcome::Failed(error) => SubmitResponse::Failed { error },
            SubmitOutcome::Blocked(blocker) => SubmitResponse::Blocked { blocker },
            SubmitOutcome::Ignored => SubmitResponse::Ignored,
            SubmitOutcome::Discarded => SubmitResponse::Discarded,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelAllResponse {
    pub cancelled: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_open_request_from_json() {
        let request: OpenSessionRequest = serde_json::from_value(json!({
            "transaction": {
                "id": "42",
                "txParams": {
                    "from": "0x742d35Cc6634C0532925a3b844Bc454e4438f44e",
                    "gas": "0x5208",
                    "maxFeePerGas": "0x9502f9000"
                },
                "userFeeLevel": "high"
            },
            "defaultLevel": "low"
        }))
        .unwrap();

        assert_eq!(request.default_level, Some(EstimateLevel::Low));
        assert_eq!(request.transaction.user_fee_level, Some(EstimateLevel::High));
        assert_eq!(request.transaction.tx_params.gas_limit(), Some(21_000));
    }

    #[test]
    fn test_submit_response_is_tagged() {
        let blocked = serde_json::to_value(SubmitResponse::from(SubmitOutcome::Blocked(
            SubmitBlocker::InsufficientFunds,
        )))
        .unwrap();
        assert_eq!(
            blocked,
            json!({ "status": "blocked", "blocker": "INSUFFICIENT_FUNDS" })
        );

        let ignored = serde_json::to_value(SubmitResponse::from(SubmitOutcome::Ignored)).unwrap();
        assert_eq!(ignored, json!({ "status": "ignored" }));
    }
}
