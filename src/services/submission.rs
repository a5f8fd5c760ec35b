use alloy_primitives::{TxHash, U64};
use serde::Serialize;

use crate::models::{
    fees::ReconciledFees,
    transaction::Transaction,
    validation::SubmitBlocker,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SubmissionStatus {
    Idle,
    Submitting,
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted(TxHash),
    /// The send operation rejected; the session is idle again.
    Failed(String),
    Blocked(SubmitBlocker),
    /// Another submission is already in flight.
    Ignored,
    /// The session was torn down while the send was in flight.
    Discarded,
}

/// Tracks the single in-flight hand-off of a confirmation session.
#[derive(Debug, Clone)]
pub struct SubmissionCoordinator {
    status: SubmissionStatus,
    submit_error: Option<String>,
    confirmed_anyway: bool,
}

impl Default for SubmissionCoordinator {
    fn default() -> Self {
        Self {
            status: SubmissionStatus::Idle,
            submit_error: None,
            confirmed_anyway: false,
        }
    }
}

impl SubmissionCoordinator {
    pub fn status(&self) -> SubmissionStatus {
        self.status
    }

    pub fn submit_error(&self) -> Option<&str> {
        self.submit_error.as_deref()
    }

    pub fn confirmed_anyway(&self) -> bool {
        self.confirmed_anyway
    }

    /// One-time acknowledgment that a predicted failure should be sent anyway.
    pub fn confirm_anyway(&mut self) {
        self.confirmed_anyway = true;
    }

    /// Moves to `Submitting` and returns the transaction to hand off, or
    /// `None` when a submission is already in flight or done.
    pub fn begin(
        &mut self,
        tx: &Transaction,
        fees: &ReconciledFees,
        nonce: Option<u64>,
    ) -> Option<Transaction> {
        if self.status != SubmissionStatus::Idle {
            return None;
        }
        self.status = SubmissionStatus::Submitting;
        self.submit_error = None;

        Some(merge_fees(tx, fees, nonce))
    }

    pub fn succeed(&mut self) {
        self.status = SubmissionStatus::Submitted;
    }

    /// Back to idle with the error kept for display; fee state is untouched
    /// so a retry needs no re-entry.
    pub fn fail(&mut self, message: String) {
        self.status = SubmissionStatus::Idle;
        self.submit_error = Some(message);
    }
}

/// Writes the reconciled fees and a user-set nonce into the transaction.
/// Only defined values overwrite; anything absent keeps what the transaction
/// already had.
pub fn merge_fees(tx: &Transaction, fees: &ReconciledFees, nonce: Option<u64>) -> Transaction {
    let mut merged = tx.clone();
    let params = &mut merged.tx_params;

    if let Some(gas_price) = fees.gas_price {
        params.gas_price = Some(gas_price);
    }
    if let Some(max_fee_per_gas) = fees.max_fee_per_gas {
        params.max_fee_per_gas = Some(max_fee_per_gas);
    }
    if let Some(max_priority_fee_per_gas) = fees.max_priority_fee_per_gas {
        params.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
    }
    params.gas = Some(U64::from(fees.gas_limit));
    if let Some(nonce) = nonce {
        params.nonce = Some(U64::from(nonce));
    }

    if let Some(base_fee) = fees.estimated_base_fee {
        merged.estimated_base_fee = Some(base_fee);
    }

    merged
}
