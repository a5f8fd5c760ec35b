use alloy_primitives::U256;

use crate::models::{
    estimate::FeeValues,
    fees::FeeField,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeInput {
    pub value: Option<U256>,
    pub manually_set: bool,
}

/// Editable fee inputs of one confirmation session.
///
/// A field that is not manually set follows the active estimate level; a
/// manually set (pinned) field is never overwritten by an estimate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeeInputState {
    gas_price: FeeInput,
    max_fee_per_gas: FeeInput,
    max_priority_fee_per_gas: FeeInput,
    gas_limit: u64,
}

impl FeeInputState {
    /// Seeds the inputs from a transaction's existing values. When `pinned`,
    /// every field that carries a value is treated as user-provided.
    pub fn seeded(values: FeeValues, gas_limit: u64, pinned: bool) -> Self {
        let input = |value: Option<U256>| FeeInput {
            value,
            manually_set: pinned && value.is_some(),
        };

        Self {
            gas_price: input(values.gas_price),
            max_fee_per_gas: input(values.max_fee_per_gas),
            max_priority_fee_per_gas: input(values.max_priority_fee_per_gas),
            gas_limit,
        }
    }

    pub fn get(&self, field: FeeField) -> FeeInput {
        match field {
            FeeField::GasPrice => self.gas_price,
            FeeField::MaxFeePerGas => self.max_fee_per_gas,
            FeeField::MaxPriorityFeePerGas => self.max_priority_fee_per_gas,
        }
    }

    fn get_mut(&mut self, field: FeeField) -> &mut FeeInput {
        match field {
            FeeField::GasPrice => &mut self.gas_price,
            FeeField::MaxFeePerGas => &mut self.max_fee_per_gas,
            FeeField::MaxPriorityFeePerGas => &mut self.max_priority_fee_per_gas,
        }
    }

    pub fn values(&self) -> FeeValues {
        FeeValues {
            gas_price: self.gas_price.value,
            max_fee_per_gas: self.max_fee_per_gas.value,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas.value,
        }
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    pub fn set_gas_limit(&mut self, gas_limit: u64) {
        self.gas_limit = gas_limit;
    }

    pub fn is_pinned(&self, field: FeeField) -> bool {
        self.get(field).manually_set
    }

    pub fn any_pinned(&self) -> bool {
        FeeField::ALL.iter().any(|field| self.is_pinned(*field))
    }

    /// Pins a field to a user value.
    pub fn pin(&mut self, field: FeeField, value: Option<U256>) {
        *self.get_mut(field) = FeeInput {
            value,
            manually_set: true,
        };
    }

    /// Drops every pin so the fields follow the estimate again. Values are
    /// kept as last-known until the next estimate overwrites them.
    pub fn clear_pins(&mut self) {
        for field in FeeField::ALL {
            self.get_mut(field).manually_set = false;
        }
    }

    /// Writes estimate values into every field that is not pinned. Returns
    /// whether anything changed.
    pub fn apply_estimate(&mut self, estimate: &FeeValues) -> bool {
        let mut changed = false;
        for (field, value) in [
            (FeeField::GasPrice, estimate.gas_price),
            (FeeField::MaxFeePerGas, estimate.max_fee_per_gas),
            (FeeField::MaxPriorityFeePerGas, estimate.max_priority_fee_per_gas),
        ] {
            let input = self.get_mut(field);
            if input.manually_set {
                continue;
            }
            if let Some(value) = value {
                if input.value != Some(value) {
                    input.value = Some(value);
                    changed = true;
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(gas_price: u64, max_fee: u64, priority: u64) -> FeeValues {
        FeeValues {
            gas_price: Some(U256::from(gas_price)),
            max_fee_per_gas: Some(U256::from(max_fee)),
            max_priority_fee_per_gas: Some(U256::from(priority)),
        }
    }

    #[test]
    fn test_seeded_pins_only_present_values() {
        let state = FeeInputState::seeded(
            FeeValues {
                max_fee_per_gas: Some(U256::from(10)),
                ..Default::default()
            },
            21_000,
            true,
        );
        assert!(state.is_pinned(FeeField::MaxFeePerGas));
        assert!(!state.is_pinned(FeeField::GasPrice));
        assert_eq!(state.gas_limit(), 21_000);
    }

    #[test]
    fn test_apply_estimate_skips_pinned_fields() {
        let mut state = FeeInputState::seeded(values(1, 2, 3), 21_000, false);
        state.pin(FeeField::MaxFeePerGas, Some(U256::from(99)));

        assert!(state.apply_estimate(&values(10, 20, 30)));

        let current = state.values();
        assert_eq!(current.gas_price, Some(U256::from(10)));
        assert_eq!(current.max_fee_per_gas, Some(U256::from(99)));
        assert_eq!(current.max_priority_fee_per_gas, Some(U256::from(30)));
    }

    #[test]
    fn test_missing_estimate_values_keep_last_known() {
        let mut state = FeeInputState::seeded(values(1, 2, 3), 21_000, false);
        assert!(!state.apply_estimate(&FeeValues::default()));
        assert_eq!(state.values(), values(1, 2, 3));
    }

    #[test]
    fn test_clear_pins() {
        let mut state = FeeInputState::seeded(values(1, 2, 3), 21_000, true);
        assert!(state.any_pinned());
        state.clear_pins();
        assert!(!state.any_pinned());
        assert_eq!(state.values(), values(1, 2, 3));
    }
}
