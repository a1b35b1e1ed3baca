//! Native value transfer.
//!
//! The ledger never moves value itself; it hands an amount to a
//! [`ValueTransfer`] after its own bookkeeping is already settled.

use crate::core::{AccountId, Amount, Error, Result};
use std::collections::HashMap;
use tracing::debug;

/// Moves native value in and out of escrow.
pub trait ValueTransfer: Send + Sync {
    /// Accept a payment that arrived with an operation.
    fn receive(&mut self, from: &AccountId, amount: Amount);

    /// Pay `amount` out of escrow. Must fail atomically.
    fn transfer(&mut self, to: &AccountId, amount: Amount) -> Result<()>;
}

/// In-process escrow holding every amount paid into the marketplace.
#[derive(Clone, Debug, Default)]
pub struct Vault {
    /// Value held in escrow; wide enough that summing payments cannot overflow
    balance: u128,
    /// Value received per account through transfers
    received: HashMap<AccountId, u128>,
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value currently held in escrow.
    pub fn balance(&self) -> u128 {
        self.balance
    }

    /// Total value transferred to `account`.
    pub fn received(&self, account: &AccountId) -> u128 {
        self.received.get(account).copied().unwrap_or(0)
    }
}

impl ValueTransfer for Vault {
    fn receive(&mut self, from: &AccountId, amount: Amount) {
        self.balance += u128::from(amount);
        debug!(from = %from, amount, escrow = %self.balance, "value escrowed");
    }

    fn transfer(&mut self, to: &AccountId, amount: Amount) -> Result<()> {
        let wanted = u128::from(amount);
        if wanted > self.balance {
            return Err(Error::InsufficientFunds {
                needed: amount,
                available: Amount::try_from(self.balance).unwrap_or(Amount::MAX),
            });
        }
        self.balance -= wanted;
        *self.received.entry(to.clone()).or_insert(0) += wanted;
        debug!(to = %to, amount, escrow = %self.balance, "value transferred");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_and_transfer() {
        let mut vault = Vault::new();
        let alice = AccountId::from("alice");

        vault.receive(&alice, 5);
        vault.transfer(&alice, 3).unwrap();

        assert_eq!(vault.balance(), 2);
        assert_eq!(vault.received(&alice), 3);
    }

    #[test]
    fn test_transfer_insufficient_funds() {
        let mut vault = Vault::new();
        let bob = AccountId::from("bob");
        vault.receive(&bob, 1);

        let result = vault.transfer(&bob, 2);
        assert_eq!(result, Err(Error::InsufficientFunds { needed: 2, available: 1 }));
        assert_eq!(vault.balance(), 1);
        assert_eq!(vault.received(&bob), 0);
    }

    #[test]
    fn test_large_deposits_accumulate() {
        let mut vault = Vault::new();
        let carol = AccountId::from("carol");
        vault.receive(&carol, Amount::MAX);
        vault.receive(&carol, Amount::MAX);
        assert_eq!(vault.balance(), 2 * u128::from(Amount::MAX));
    }
}
