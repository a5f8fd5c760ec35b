use crate::{
    error::{Error, Result},
    models::{
        estimate::{EstimateLevel, FeeEstimateSnapshot, FeeValues},
        fees::{FeeField, ManualEdit, ReconciledFees},
        transaction::{dapp_suggested_fees_match, Transaction},
    },
    services::fee_input::FeeInputState,
};

#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    pub default_level: EstimateLevel,
    pub prefers_advanced_gas: bool,
    pub minimum_gas_limit: u64,
    pub maximum_gas_limit: u64,
    pub network_supports_fee_market: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LevelEvent {
    Select(EstimateLevel),
    ManualEdit,
}

/// Outcome of reconciling the inputs against an estimate snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Applied { changed: bool },
    /// The active level is user-owned; nothing follows the estimate.
    UserOwned,
    /// The active level has no values in the snapshot; last known values kept.
    LevelMissing,
}

/// Level transition table. `dapp_fees` tells whether the transaction carries
/// a dApp suggestion to select.
fn transition(
    current: EstimateLevel,
    event: LevelEvent,
    dapp_fees: bool,
) -> Result<EstimateLevel> {
    match (current, event) {
        (_, LevelEvent::Select(EstimateLevel::DappSuggested)) if !dapp_fees => Err(
            Error::InvalidInput("Transaction carries no dApp suggested fees".to_string()),
        ),
        (_, LevelEvent::Select(next)) if next.follows_estimate() => Ok(next),
        (_, LevelEvent::Select(next)) => Err(Error::InvalidInput(format!(
            "Level {} cannot be selected, edit a fee instead",
            next
        ))),
        (_, LevelEvent::ManualEdit) => Ok(EstimateLevel::Custom),
    }
}

/// Picks the level a new confirmation session starts on.
pub fn initial_level(
    tx: &Transaction,
    prefers_advanced_gas: bool,
    default_level: EstimateLevel,
) -> EstimateLevel {
    if tx.dapp_suggested_fees_match() {
        return EstimateLevel::DappSuggested;
    }
    if let Some(level) = tx.user_fee_level {
        return level;
    }
    if prefers_advanced_gas
        && tx.tx_params.max_fee_per_gas.is_some()
        && tx.tx_params.max_priority_fee_per_gas.is_some()
    {
        return EstimateLevel::None;
    }
    default_level
}

/// Fills the fields a level did not provide from the ones it did, so either
/// fee model can be priced from any estimate shape.
fn complete(fees: FeeValues) -> Option<FeeValues> {
    let completed = FeeValues {
        gas_price: fees.gas_price.or(fees.max_fee_per_gas),
        max_fee_per_gas: fees.max_fee_per_gas.or(fees.gas_price),
        max_priority_fee_per_gas: fees.max_priority_fee_per_gas.or(fees.gas_price),
    };
    (!completed.is_empty()).then_some(completed)
}

/// Decides which estimate level is active and when inputs follow it.
#[derive(Debug, Clone)]
pub struct EstimateReconciler {
    level: EstimateLevel,
    estimate_used: EstimateLevel,
    supports_fee_market: bool,
    minimum_gas_limit: u64,
    maximum_gas_limit: u64,
    declared_gas_limit: u64,
}

impl EstimateReconciler {
    /// Resolves the initial level and seeds the session's inputs.
    pub fn start(
        tx: &Transaction,
        options: &ReconcilerOptions,
        snapshot: &FeeEstimateSnapshot,
    ) -> (Self, FeeInputState) {
        let level = initial_level(tx, options.prefers_advanced_gas, options.default_level);
        let declared_gas_limit = tx
            .tx_params
            .gas_limit()
            .unwrap_or(options.minimum_gas_limit);
        let mut inputs = FeeInputState::seeded(
            tx.tx_params.fees(),
            declared_gas_limit,
            !level.follows_estimate(),
        );

        let reconciler = Self {
            level,
            estimate_used: level,
            supports_fee_market: options.network_supports_fee_market
                && !tx.tx_params.is_legacy(),
            minimum_gas_limit: options.minimum_gas_limit,
            maximum_gas_limit: options.maximum_gas_limit,
            declared_gas_limit,
        };
        tracing::debug!(
            "Session {} starts on level {} (fee market: {})",
            tx.id,
            level,
            reconciler.supports_fee_market
        );
        reconciler.on_snapshot(&mut inputs, snapshot, tx);

        (reconciler, inputs)
    }

    pub fn current_level(&self) -> EstimateLevel {
        self.level
    }

    pub fn minimum_gas_limit(&self) -> u64 {
        self.minimum_gas_limit
    }

    /// Values a level prescribes, if the level is estimate-derived and the
    /// data for it is available.
    pub fn level_values(
        &self,
        level: EstimateLevel,
        snapshot: &FeeEstimateSnapshot,
        tx: &Transaction,
    ) -> Option<FeeValues> {
        match level {
            EstimateLevel::Low | EstimateLevel::Medium | EstimateLevel::High => {
                snapshot.level(level).and_then(|estimate| complete(estimate.fees))
            }
            EstimateLevel::DappSuggested => tx.dapp_suggested_gas_fees.as_ref().and_then(|dapp| {
                complete(FeeValues {
                    gas_price: dapp.gas_price,
                    max_fee_per_gas: dapp.max_fee_per_gas,
                    max_priority_fee_per_gas: dapp.max_priority_fee_per_gas,
                })
            }),
            EstimateLevel::Custom | EstimateLevel::None => None,
        }
    }

    /// Re-derives every unpinned input from the snapshot at the active level.
    pub fn on_snapshot(
        &self,
        inputs: &mut FeeInputState,
        snapshot: &FeeEstimateSnapshot,
        tx: &Transaction,
    ) -> SnapshotOutcome {
        if !self.level.follows_estimate() {
            return SnapshotOutcome::UserOwned;
        }

        match self.level_values(self.level, snapshot, tx) {
            Some(values) => SnapshotOutcome::Applied {
                changed: inputs.apply_estimate(&values),
            },
            None => {
                tracing::warn!(
                    "No {} estimate available ({} snapshot), keeping last known fees",
                    self.level,
                    snapshot.kind
                );
                SnapshotOutcome::LevelMissing
            }
        }
    }

    /// Switches to an estimate level, dropping every user pin.
    pub fn select_level(
        &mut self,
        level: EstimateLevel,
        inputs: &mut FeeInputState,
        snapshot: &FeeEstimateSnapshot,
        tx: &Transaction,
    ) -> Result<SnapshotOutcome> {
        let next = transition(
            self.level,
            LevelEvent::Select(level),
            tx.has_dapp_suggested_fees(),
        )?;
        self.correct_gas_limit(inputs);

        tracing::debug!("Selecting estimate level {} (was {})", next, self.level);
        self.level = next;
        inputs.clear_pins();
        self.estimate_used = next;

        Ok(self.on_snapshot(inputs, snapshot, tx))
    }

    /// Applies a user edit. Every fee field is pinned at its current value so
    /// the next estimate cannot move fields the user did not touch.
    pub fn notify_manual_edit(
        &mut self,
        edit: ManualEdit,
        inputs: &mut FeeInputState,
    ) -> Result<()> {
        self.level = transition(self.level, LevelEvent::ManualEdit, false)?;
        self.correct_gas_limit(inputs);

        let current = inputs.values();
        for field in FeeField::ALL {
            inputs.pin(field, current.get(field));
        }
        match edit {
            ManualEdit::Fee(field, value) => {
                tracing::debug!("Manual edit of {}: {}", field, value);
                inputs.pin(field, Some(value));
            }
            ManualEdit::GasLimit(gas_limit) => {
                tracing::debug!("Manual edit of gas limit: {}", gas_limit);
                inputs.set_gas_limit(gas_limit);
            }
        }
        self.estimate_used = EstimateLevel::Custom;

        Ok(())
    }

    /// Resets an out-of-bounds gas limit to the larger of the declared gas
    /// and the minimum. Returns whether the limit changed.
    pub fn correct_gas_limit(&self, inputs: &mut FeeInputState) -> bool {
        let gas_limit = inputs.gas_limit();
        if (self.minimum_gas_limit..=self.maximum_gas_limit).contains(&gas_limit) {
            return false;
        }

        let corrected = self.declared_gas_limit.max(self.minimum_gas_limit);
        tracing::debug!(
            "Gas limit {} outside {}..={}, corrected to {}",
            gas_limit,
            self.minimum_gas_limit,
            self.maximum_gas_limit,
            corrected
        );
        inputs.set_gas_limit(corrected);
        corrected != gas_limit
    }

    /// Projects the inputs into the values downstream code consumes. The
    /// dApp label is recomputed here on every call since it is a comparison,
    /// not a stored state.
    pub fn reconcile(
        &self,
        inputs: &FeeInputState,
        snapshot: &FeeEstimateSnapshot,
        tx: &Transaction,
    ) -> ReconciledFees {
        let values = inputs.values();
        let fees = if self.supports_fee_market {
            FeeValues {
                gas_price: None,
                ..values
            }
        } else {
            FeeValues {
                gas_price: values.gas_price,
                max_fee_per_gas: None,
                max_priority_fee_per_gas: None,
            }
        };

        let estimate_used = if dapp_suggested_fees_match(&fees, tx.dapp_suggested_gas_fees.as_ref())
        {
            EstimateLevel::DappSuggested
        } else {
            self.estimate_used
        };

        ReconciledFees {
            supports_fee_market: self.supports_fee_market,
            gas_price: fees.gas_price,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            gas_limit: inputs.gas_limit(),
            estimate_level: self.level,
            estimate_used,
            estimate_type: snapshot.kind,
            estimated_base_fee: snapshot.base_fee_per_gas,
            fee_is_custom: inputs.any_pinned(),
        }
    }
}
