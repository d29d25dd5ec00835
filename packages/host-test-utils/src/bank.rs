//! A minimal native token ledger used as the host's native router.

use std::collections::BTreeMap;

use cosmwasm_std::Event;
use cw_ibc_host::{
    dispatch::NativeRouter,
    msg::{BankMsg, Coin},
    HostError,
};

/// Balances per `(address, denom)`.
#[derive(Clone, Debug, Default)]
pub struct MockBank {
    balances: BTreeMap<(String, String), u128>,
}

impl MockBank {
    /// Create an empty bank.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` of `denom` to `address`.
    pub fn mint(&mut self, address: &str, denom: &str, amount: u128) {
        let balance = self
            .balances
            .entry((address.to_string(), denom.to_string()))
            .or_default();
        *balance = balance.saturating_add(amount);
    }

    /// The balance of `address` in `denom`.
    #[must_use]
    pub fn balance(&self, address: &str, denom: &str) -> u128 {
        self.balances
            .get(&(address.to_string(), denom.to_string()))
            .copied()
            .unwrap_or_default()
    }

    fn transfer(&mut self, from: &str, to: &str, coin: &Coin) -> Result<(), HostError> {
        let available = self.balance(from, &coin.denom);
        let remaining = available.checked_sub(coin.amount).ok_or_else(|| {
            HostError::NativeMessage(format!(
                "insufficient funds: {from} has {available}{denom}, needs {amount}{denom}",
                denom = coin.denom,
                amount = coin.amount
            ))
        })?;
        self.balances
            .insert((from.to_string(), coin.denom.clone()), remaining);
        self.mint(to, &coin.denom, coin.amount);
        Ok(())
    }
}

impl NativeRouter for MockBank {
    fn route_bank(&mut self, sender: &str, msg: &BankMsg) -> Result<Vec<Event>, HostError> {
        let BankMsg::Send { to_address, amount } = msg;
        let mut events = Vec::with_capacity(amount.len());
        for coin in amount {
            self.transfer(sender, to_address, coin)?;
            events.push(
                Event::new("transfer")
                    .add_attribute("sender", sender)
                    .add_attribute("recipient", to_address)
                    .add_attribute("amount", format!("{}{}", coin.amount, coin.denom)),
            );
        }
        Ok(events)
    }
}
