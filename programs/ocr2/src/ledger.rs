//! The payment token as seen by the aggregator: balances and transfers of a single token.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::state::Address;
use crate::ErrorCode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("insufficient balance: {available} available, {requested} requested")]
    InsufficientBalance { available: u128, requested: u128 },

    #[error("account {0} is frozen")]
    Frozen(Address),
}

impl From<TransferError> for ErrorCode {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::InsufficientBalance { .. } => ErrorCode::InsufficientFunds,
            TransferError::Frozen(_) => ErrorCode::TransferFailed,
        }
    }
}

pub trait TokenLedger {
    /// Address of the token this ledger tracks.
    fn token(&self) -> Address;

    fn balance_of(&self, account: &Address) -> u128;

    fn transfer(&mut self, from: &Address, to: &Address, amount: u128)
        -> Result<(), TransferError>;

    /// Performs every transfer or none of them.
    fn transfer_batch(
        &mut self,
        from: &Address,
        transfers: &[(Address, u128)],
    ) -> Result<(), TransferError>;
}

/// In-memory token balances, with SPL-style account freezing.
#[derive(Clone, Debug, Default)]
pub struct MemoryLedger {
    token: Address,
    balances: HashMap<Address, u128>,
    frozen: HashSet<Address>,
}

impl MemoryLedger {
    pub fn new(token: Address) -> Self {
        Self {
            token,
            ..Self::default()
        }
    }

    pub fn mint(&mut self, to: &Address, amount: u128) {
        let balance = self.balances.entry(*to).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn freeze(&mut self, account: &Address) {
        self.frozen.insert(*account);
    }

    pub fn thaw(&mut self, account: &Address) {
        self.frozen.remove(account);
    }

    fn check_frozen(&self, account: &Address) -> Result<(), TransferError> {
        if self.frozen.contains(account) {
            return Err(TransferError::Frozen(*account));
        }
        Ok(())
    }

    fn move_unchecked(&mut self, from: &Address, to: &Address, amount: u128) {
        if let Some(balance) = self.balances.get_mut(from) {
            *balance -= amount;
        }
        let balance = self.balances.entry(*to).or_default();
        *balance = balance.saturating_add(amount);
    }
}

impl TokenLedger for MemoryLedger {
    fn token(&self) -> Address {
        self.token
    }

    fn balance_of(&self, account: &Address) -> u128 {
        self.balances.get(account).copied().unwrap_or_default()
    }

    fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        self.transfer_batch(from, &[(*to, amount)])
    }

    fn transfer_batch(
        &mut self,
        from: &Address,
        transfers: &[(Address, u128)],
    ) -> Result<(), TransferError> {
        self.check_frozen(from)?;
        let mut requested = 0u128;
        for (to, amount) in transfers {
            self.check_frozen(to)?;
            requested = requested.saturating_add(*amount);
        }
        let available = self.balance_of(from);
        if requested > available {
            return Err(TransferError::InsufficientBalance {
                available,
                requested,
            });
        }

        for (to, amount) in transfers {
            self.move_unchecked(from, to, *amount);
        }
        Ok(())
    }
}
