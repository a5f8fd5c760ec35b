use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationField {
    Balance,
    GasLimit,
    GasFee,
    GasPrice,
    MaxFeePerGas,
    MaxPriorityFeePerGas,
    Nonce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InsufficientFunds,
    GasLimitOutOfBounds,
    GasPriceFetchFailure,
    GasPriceTooLow,
    MaxPriorityFeeBelowMinimum,
    MaxFeeImbalance,
    /// The active fee model has a required field without a value.
    FeeValueMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningKind {
    EstimatesDegraded,
    EstimatesUnavailable,
    MaxPriorityFeeTooLow,
    MaxPriorityFeeHigh,
    MaxFeeTooLow,
    MaxFeeHigh,
    NonceAhead,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub errors: BTreeMap<ValidationField, ErrorKind>,
    pub warnings: BTreeMap<ValidationField, WarningKind>,
    pub balance_error: bool,
}

impl ValidationResult {
    /// Records an error unless the field already has one.
    pub(crate) fn error(&mut self, field: ValidationField, kind: ErrorKind) {
        self.errors.entry(field).or_insert(kind);
    }

    pub(crate) fn warn(&mut self, field: ValidationField, kind: WarningKind) {
        self.warnings.entry(field).or_insert(kind);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_missing_fees(&self) -> bool {
        self.errors
            .values()
            .any(|kind| *kind == ErrorKind::FeeValueMissing)
    }

    /// Errors an acknowledgment may waive. Insufficient funds and missing
    /// fee values are never waived.
    pub fn has_waivable_errors(&self) -> bool {
        self.errors.values().any(|kind| {
            !matches!(
                kind,
                ErrorKind::InsufficientFunds | ErrorKind::FeeValueMissing
            )
        })
    }
}

/// Why a submit request cannot proceed right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmitBlocker {
    AlreadySubmitting,
    InsufficientFunds,
    MissingFees,
    SimulationNotAcknowledged,
    EstimatesLoading,
    ValidationErrors,
}

impl std::fmt::Display for SubmitBlocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitBlocker::AlreadySubmitting => write!(f, "a submission is already in flight"),
            SubmitBlocker::InsufficientFunds => write!(f, "insufficient funds for gas and value"),
            SubmitBlocker::MissingFees => write!(f, "gas fee values are missing"),
            SubmitBlocker::SimulationNotAcknowledged => {
                write!(f, "transaction is expected to fail and was not acknowledged")
            }
            SubmitBlocker::EstimatesLoading => write!(f, "gas estimates are still loading"),
            SubmitBlocker::ValidationErrors => write!(f, "gas settings have errors"),
        }
    }
}
