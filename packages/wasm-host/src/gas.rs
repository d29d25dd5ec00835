//! The gas register translates between ledger gas and VM gas and prices the
//! side effects a contract can cause.

use cosmwasm_std::Attribute;
use serde::{Deserialize, Serialize};

use crate::{
    error::HostError,
    msg::{Reply, SubMsgResult},
};

/// How many VM gas points equal one ledger gas point.
///
/// A store write costs ~3000 ledger gas at ~200us, and a contract read of
/// ~88k VM gas takes about the same time as one ledger read at ~1k gas.
pub const DEFAULT_GAS_MULTIPLIER: u64 = 100;
/// Ledger gas charged every time a contract instance is loaded.
/// Also acts as a brake on contracts calling contracts.
pub const DEFAULT_INSTANCE_COST: u64 = 40_000;
/// Ledger gas charged per byte of code compiled.
pub const DEFAULT_COMPILE_COST: u64 = 2;
/// Ledger gas charged per byte of event attribute data (`len(key) + len(value)`).
pub const DEFAULT_EVENT_ATTRIBUTE_DATA_COST: u64 = 1;
/// Ledger gas charged per event attribute.
pub const DEFAULT_PER_ATTRIBUTE_COST: u64 = 10;
/// Bytes of event attribute data that are not charged.
pub const DEFAULT_EVENT_ATTRIBUTE_DATA_FREE_TIER: u64 = 100;

/// The raw cost parameters of the gas register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasCostModel {
    /// Ledger gas per contract instance load (unless pinned).
    pub instance_cost: u64,
    /// Ledger gas per byte of compiled code.
    pub compile_cost_per_byte: u64,
    /// Ledger gas per billable byte of event attribute data.
    pub event_attribute_data_cost: u64,
    /// Ledger gas per event attribute.
    pub event_per_attribute_cost: u64,
    /// Attribute bytes that are not billed.
    pub event_attribute_data_free_tier: u64,
    /// VM gas points per ledger gas point.
    pub multiplier: u64,
}

impl Default for GasCostModel {
    fn default() -> Self {
        Self {
            instance_cost: DEFAULT_INSTANCE_COST,
            compile_cost_per_byte: DEFAULT_COMPILE_COST,
            event_attribute_data_cost: DEFAULT_EVENT_ATTRIBUTE_DATA_COST,
            event_per_attribute_cost: DEFAULT_PER_ATTRIBUTE_COST,
            event_attribute_data_free_tier: DEFAULT_EVENT_ATTRIBUTE_DATA_FREE_TIER,
            multiplier: DEFAULT_GAS_MULTIPLIER,
        }
    }
}

impl GasCostModel {
    /// Checks the cost model can be used by a [`GasRegister`].
    /// # Errors
    /// Returns an error if the multiplier is zero.
    pub fn validate(&self) -> Result<(), HostError> {
        if self.multiplier == 0 {
            return Err(HostError::InvalidConfig(
                "gas multiplier must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Converts gas units and prices contract side effects in ledger gas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasRegister {
    costs: GasCostModel,
}

impl Default for GasRegister {
    fn default() -> Self {
        Self {
            costs: GasCostModel::default(),
        }
    }
}

impl GasRegister {
    /// Create a register from a cost model.
    /// # Errors
    /// Returns an error if the cost model is invalid.
    pub fn new(costs: GasCostModel) -> Result<Self, HostError> {
        costs.validate()?;
        Ok(Self { costs })
    }

    /// The cost model this register prices with.
    #[must_use]
    pub const fn costs(&self) -> &GasCostModel {
        &self.costs
    }

    /// Ledger gas for loading a contract instance.
    ///
    /// `msg_len` is accepted so that message size can be priced later; it does
    /// not change the cost today.
    #[must_use]
    pub const fn instantiate_cost(&self, pinned: bool, _msg_len: usize) -> u64 {
        if pinned {
            return 0;
        }
        self.costs.instance_cost
    }

    /// Ledger gas for compiling `byte_len` bytes of code.
    /// # Errors
    /// Returns [`HostError::GasOverflow`] if the cost does not fit in u64.
    pub fn compile_cost(&self, byte_len: usize) -> Result<u64, HostError> {
        u64::try_from(byte_len)
            .ok()
            .and_then(|len| len.checked_mul(self.costs.compile_cost_per_byte))
            .ok_or(HostError::GasOverflow("compile cost"))
    }

    /// Ledger gas for storing the given event attributes.
    /// # Errors
    /// Returns [`HostError::GasOverflow`] if the cost does not fit in u64.
    pub fn event_costs(&self, attributes: &[Attribute]) -> Result<u64, HostError> {
        if attributes.is_empty() {
            return Ok(0);
        }

        let stored_bytes: u128 = attributes
            .iter()
            .map(|a| (a.key.len() + a.value.len()) as u128)
            .sum();
        let billable_bytes =
            stored_bytes.saturating_sub(u128::from(self.costs.event_attribute_data_free_tier));

        billable_bytes
            .checked_mul(u128::from(self.costs.event_attribute_data_cost))
            .and_then(|data_cost| {
                (attributes.len() as u128)
                    .checked_mul(u128::from(self.costs.event_per_attribute_cost))
                    .and_then(|count_cost| data_cost.checked_add(count_cost))
            })
            .and_then(|total| u64::try_from(total).ok())
            .ok_or(HostError::GasOverflow("event attributes"))
    }

    /// Ledger gas for handing a sub-message result back to the contract.
    /// # Errors
    /// Returns [`HostError::GasOverflow`] if the cost does not fit in u64.
    pub fn reply_cost(&self, pinned: bool, reply: &Reply) -> Result<u64, HostError> {
        let mut event_gas: u64 = 0;
        let msg_len = match &reply.result {
            SubMsgResult::Err(err) => err.len(),
            SubMsgResult::Ok(response) => {
                let mut len = response.data.as_ref().map_or(0, |d| d.len());
                for event in &response.events {
                    len += event.ty.len();
                    event_gas = event_gas
                        .checked_add(self.event_costs(&event.attributes)?)
                        .ok_or(HostError::GasOverflow("reply events"))?;
                }
                len
            }
        };

        event_gas
            .checked_add(self.instantiate_cost(pinned, msg_len))
            .ok_or(HostError::GasOverflow("reply cost"))
    }

    /// Converts ledger gas into VM gas.
    /// # Errors
    /// Returns [`HostError::GasOverflow`] if the product does not fit in u64.
    pub fn to_vm_gas(&self, ledger_gas: u64) -> Result<u64, HostError> {
        ledger_gas
            .checked_mul(self.costs.multiplier)
            .ok_or(HostError::GasOverflow("vm gas conversion"))
    }

    /// Converts VM gas into ledger gas.
    ///
    /// Fractions of a ledger gas point are dropped, never rounded up.
    #[must_use]
    pub const fn from_vm_gas(&self, vm_gas: u64) -> u64 {
        vm_gas / self.costs.multiplier
    }
}

/// Tracks ledger gas consumption of one transaction against its limit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GasMeter {
    limit: u64,
    consumed: u64,
}

impl GasMeter {
    /// Create a meter with the given limit.
    #[must_use]
    pub const fn new(limit: u64) -> Self {
        Self { limit, consumed: 0 }
    }

    /// Create a meter that never runs out.
    #[must_use]
    pub const fn infinite() -> Self {
        Self::new(u64::MAX)
    }

    /// Gas consumed so far.
    #[must_use]
    pub const fn consumed(&self) -> u64 {
        self.consumed
    }

    /// The gas limit.
    #[must_use]
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Gas left before the limit is hit.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.consumed)
    }

    /// Consume `amount` gas for `descriptor`.
    /// # Errors
    /// Returns [`HostError::OutOfGas`] once consumption exceeds the limit.
    pub fn consume(&mut self, amount: u64, descriptor: &str) -> Result<(), HostError> {
        self.consumed = self.consumed.saturating_add(amount);
        if self.consumed > self.limit {
            return Err(HostError::OutOfGas {
                descriptor: descriptor.to_string(),
                limit: self.limit,
                used: self.consumed,
            });
        }
        tracing::trace!(amount, descriptor, consumed = self.consumed, "gas consumed");
        Ok(())
    }
}
