//! Oracle compensation: gas reimbursement and per-report payments accrue on every accepted
//! transmission and are paid out in the link token to each transmitter's payee.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::Context;
use crate::event;
use crate::ledger::TokenLedger;
use crate::signature::SignerRecovery;
use crate::state::Address;
use crate::{Aggregator, Result};

pub const GIGA: u128 = 1_000_000_000;
const WEI_PER_FEE_COIN: u128 = 1_000_000_000_000_000_000;

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
#[serde(deny_unknown_fields)]
pub struct Billing {
    /// Upper bound on the gas price reimbursed per unit of gas
    pub maximum_gas_price_gwei: u32,
    pub reasonable_gas_price_gwei: u32,
    pub observation_payment_gjuels: u32,
    pub transmission_payment_gjuels: u32,
    /// Announced to oracles with the other parameters; not charged on top of `gas_used`
    pub accounting_gas: u32,
}

/// What one accepted transmission earns the transmitter that submitted it, in juels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Payment {
    pub reimbursement_juels: u128,
    pub transmission_juels: u128,
    /// Per observation in the report
    pub observation_juels: u128,
    pub observation_count: usize,
}

impl Payment {
    pub fn total_juels(&self) -> u128 {
        self.observation_juels
            .saturating_mul(self.observation_count as u128)
            .saturating_add(self.reimbursement_juels)
            .saturating_add(self.transmission_juels)
    }
}

impl Billing {
    /// The price the transaction paid, capped at the maximum gas price.
    pub fn reimbursed_gas_price_wei(&self, tx_gas_price_wei: u128) -> u128 {
        let maximum = u128::from(self.maximum_gas_price_gwei) * GIGA;
        tx_gas_price_wei.min(maximum)
    }

    pub fn reimbursement_juels(
        &self,
        gas_used: u64,
        tx_gas_price_wei: u128,
        juels_per_fee_coin: u128,
    ) -> u128 {
        let cost_wei = self
            .reimbursed_gas_price_wei(tx_gas_price_wei)
            .saturating_mul(u128::from(gas_used));
        mul_div(cost_wei, juels_per_fee_coin, WEI_PER_FEE_COIN)
    }

    pub fn transmission_payment_juels(&self) -> u128 {
        u128::from(self.transmission_payment_gjuels) * GIGA
    }

    pub fn observation_payment_juels(&self) -> u128 {
        u128::from(self.observation_payment_gjuels) * GIGA
    }

    pub fn compute_payment(
        &self,
        gas_used: u64,
        tx_gas_price_wei: u128,
        juels_per_fee_coin: u128,
        observation_count: usize,
    ) -> Payment {
        Payment {
            reimbursement_juels: self.reimbursement_juels(
                gas_used,
                tx_gas_price_wei,
                juels_per_fee_coin,
            ),
            transmission_juels: self.transmission_payment_juels(),
            observation_juels: self.observation_payment_juels(),
            observation_count,
        }
    }
}

/// `a * b / d` rounded down, saturating at `u128::MAX`.
fn mul_div(a: u128, b: u128, d: u128) -> u128 {
    // a = q * d + r, so a * b / d = q * b + r * b / d
    let (q, r) = (a / d, a % d);
    q.saturating_mul(b)
        .saturating_add(r.saturating_mul(b) / d)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Payeeship {
    pub payee: Address,
    /// will be zeroed out if empty
    pub proposed_payee: Address,
}

/// Payees by transmitter. Survives reconfigurations so superseded oracles can still be paid.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Payees {
    entries: BTreeMap<Address, Payeeship>,
}

impl Payees {
    pub fn payee(&self, transmitter: &Address) -> Option<Address> {
        self.entries
            .get(transmitter)
            .map(|entry| entry.payee)
            .filter(|payee| !payee.is_zero())
    }

    pub fn proposed_payee(&self, transmitter: &Address) -> Option<Address> {
        self.entries
            .get(transmitter)
            .map(|entry| entry.proposed_payee)
            .filter(|payee| !payee.is_zero())
    }

    /// Validates a batch of initial assignments without applying it. A transmitter that
    /// already has a different payee can't be reassigned this way.
    pub fn check_assignments(&self, transmitters: &[Address], payees: &[Address]) -> Result<()> {
        require!(transmitters.len() == payees.len(), LengthMismatch);
        let mut staged = BTreeMap::new();
        for (transmitter, payee) in transmitters.iter().zip(payees) {
            require!(!transmitter.is_zero() && !payee.is_zero(), InvalidInput);
            let current = staged
                .get(transmitter)
                .copied()
                .or_else(|| self.payee(transmitter));
            require!(current.map_or(true, |current| current == *payee), PayeeAlreadySet);
            staged.insert(*transmitter, *payee);
        }
        Ok(())
    }

    /// Returns whether the payee changed.
    pub(crate) fn assign(&mut self, transmitter: Address, payee: Address) -> bool {
        let entry = self.entries.entry(transmitter).or_default();
        std::mem::replace(&mut entry.payee, payee) != payee
    }

    /// First half of the handshake, initiated by the current payee. Returns whether the
    /// proposal changed.
    pub fn propose(
        &mut self,
        authority: &Address,
        transmitter: &Address,
        proposed: Address,
    ) -> Result<bool> {
        let entry = self
            .entries
            .get_mut(transmitter)
            .filter(|entry| !entry.payee.is_zero());
        let Some(entry) = entry else {
            return Err(crate::ErrorCode::Unauthorized);
        };
        require!(entry.payee == *authority, Unauthorized);
        require!(proposed != *authority, InvalidInput);
        require!(!proposed.is_zero(), InvalidInput);
        Ok(std::mem::replace(&mut entry.proposed_payee, proposed) != proposed)
    }

    /// Second half of the handshake, completed by the proposed payee. Returns the previous
    /// payee.
    pub fn accept(&mut self, authority: &Address, transmitter: &Address) -> Result<Address> {
        let entry = self
            .entries
            .get_mut(transmitter)
            .filter(|entry| !entry.proposed_payee.is_zero());
        let Some(entry) = entry else {
            return Err(crate::ErrorCode::Unauthorized);
        };
        require!(entry.proposed_payee == *authority, Unauthorized);
        let proposed = std::mem::take(&mut entry.proposed_payee);
        Ok(std::mem::replace(&mut entry.payee, proposed))
    }
}

/// Balances accrued by oracles of superseded configurations, keyed by their transmitter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeftoverPayments {
    balances: BTreeMap<Address, u128>,
}

impl LeftoverPayments {
    pub fn archive(&mut self, transmitter: Address, amount: u128) {
        if amount == 0 {
            return;
        }
        let balance = self.balances.entry(transmitter).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn owed(&self, transmitter: &Address) -> u128 {
        self.balances.get(transmitter).copied().unwrap_or_default()
    }

    pub fn total(&self) -> u128 {
        self.balances
            .values()
            .fold(0u128, |total, amount| total.saturating_add(*amount))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &u128)> {
        self.balances.iter()
    }

    /// Deducts up to `amount` and returns the remainder that could not be covered.
    pub(crate) fn deduct(&mut self, transmitter: &Address, amount: u128) -> u128 {
        let Some(balance) = self.balances.get_mut(transmitter) else {
            return amount;
        };
        let covered = amount.min(*balance);
        *balance -= covered;
        if *balance == 0 {
            self.balances.remove(transmitter);
        }
        amount - covered
    }
}

/// One pending transfer to a payee.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Payout {
    pub transmitter: Address,
    pub payee: Address,
    pub amount: u128,
}

impl<R: SignerRecovery> Aggregator<R> {
    pub fn set_billing(&mut self, ctx: &Context, billing: Billing) -> Result<()> {
        self.require_billing_access(&ctx.sender)?;
        self.billing = billing;
        info!(?billing, "billing updated");
        self.emit(event::BillingSet { billing });
        Ok(())
    }

    pub fn set_payees(
        &mut self,
        ctx: &Context,
        transmitters: &[Address],
        payees: &[Address],
    ) -> Result<()> {
        self.ownership.require_owner(&ctx.sender)?;
        self.payees.check_assignments(transmitters, payees)?;

        for (&transmitter, &payee) in transmitters.iter().zip(payees) {
            if self.payees.assign(transmitter, payee) {
                self.emit(event::PayeeshipTransferred {
                    transmitter,
                    previous: Address::ZERO,
                    current: payee,
                });
            }
        }
        Ok(())
    }

    pub fn transfer_payeeship(
        &mut self,
        ctx: &Context,
        transmitter: Address,
        proposed: Address,
    ) -> Result<()> {
        if self.payees.propose(&ctx.sender, &transmitter, proposed)? {
            self.emit(event::PayeeshipTransferRequested {
                transmitter,
                current: ctx.sender,
                proposed,
            });
        }
        Ok(())
    }

    pub fn accept_payeeship(&mut self, ctx: &Context, transmitter: Address) -> Result<()> {
        let previous = self.payees.accept(&ctx.sender, &transmitter)?;
        self.emit(event::PayeeshipTransferred {
            transmitter,
            previous,
            current: ctx.sender,
        });
        Ok(())
    }

    /// Withdraws part of a transmitter's balance. Only its payee may do so, and the balance
    /// only decreases once the token transfer went through.
    pub fn withdraw_payment(
        &mut self,
        ctx: &Context,
        ledger: &mut dyn TokenLedger,
        transmitter: Address,
        recipient: Address,
        amount: u128,
    ) -> Result<()> {
        self.require_token(ledger)?;
        let payee = self
            .payees
            .payee(&transmitter)
            .ok_or(crate::ErrorCode::Unauthorized)?;
        require!(ctx.sender == payee, Unauthorized);
        require!(!recipient.is_zero(), InvalidInput);
        require!(amount <= self.owed_payment(&transmitter), InsufficientFunds);
        if amount == 0 {
            return Ok(());
        }

        ledger.transfer(&self.contract_address, &recipient, amount)?;

        self.deduct(&transmitter, amount);
        info!(%transmitter, %recipient, amount, "payment withdrawn");
        self.emit(event::OraclePaid {
            transmitter,
            payee,
            amount,
            link_token: self.link_token,
        });
        Ok(())
    }

    /// Pays every balance that has a payee. Either every transfer succeeds or nothing changes.
    pub fn pay_oracles(&mut self, ctx: &Context, ledger: &mut dyn TokenLedger) -> Result<u128> {
        self.require_billing_access(&ctx.sender)?;
        self.require_token(ledger)?;

        let payouts = self.pending_payouts();
        let total = payout_total(&payouts);
        require!(
            ledger.balance_of(&self.contract_address) >= total,
            InsufficientFunds
        );

        let transfers: Vec<(Address, u128)> = payouts
            .iter()
            .map(|payout| (payout.payee, payout.amount))
            .collect();
        ledger.transfer_batch(&self.contract_address, &transfers)?;
        self.settle(&payouts);

        info!(oracles = payouts.len(), total, "oracles paid");
        Ok(total)
    }

    /// Withdraws funds not owed to any oracle. Returns the amount actually transferred.
    pub fn withdraw_funds(
        &mut self,
        ctx: &Context,
        ledger: &mut dyn TokenLedger,
        recipient: Address,
        amount: u128,
    ) -> Result<u128> {
        self.require_billing_access(&ctx.sender)?;
        self.require_token(ledger)?;
        require!(!recipient.is_zero(), InvalidInput);

        let balance = ledger.balance_of(&self.contract_address);
        let due = self.total_owed();
        require!(balance >= due, InsufficientFunds);

        let amount = amount.min(balance - due);
        if amount > 0 {
            ledger.transfer(&self.contract_address, &recipient, amount)?;
        }
        info!(%recipient, amount, "funds withdrawn");
        Ok(amount)
    }

    /// Pays out every oracle in the current token, sweeps the rest of the balance to
    /// `recipient` and switches to `link_token`.
    pub fn set_link_token(
        &mut self,
        ctx: &Context,
        ledger: &mut dyn TokenLedger,
        link_token: Address,
        recipient: Address,
    ) -> Result<()> {
        self.ownership.require_owner(&ctx.sender)?;
        require!(!link_token.is_zero(), InvalidInput);
        if link_token == self.link_token {
            return Ok(());
        }
        self.require_token(ledger)?;
        require!(!recipient.is_zero(), InvalidInput);

        let payouts = self.pending_payouts();
        let total = payout_total(&payouts);
        let balance = ledger.balance_of(&self.contract_address);
        require!(balance >= total, InsufficientFunds);

        let mut transfers: Vec<(Address, u128)> = payouts
            .iter()
            .map(|payout| (payout.payee, payout.amount))
            .collect();
        if balance > total {
            transfers.push((recipient, balance - total));
        }
        ledger.transfer_batch(&self.contract_address, &transfers)?;
        self.settle(&payouts);

        let old = std::mem::replace(&mut self.link_token, link_token);
        info!(%old, current = %link_token, "link token switched");
        self.emit(event::LinkTokenSet {
            old,
            current: link_token,
        });
        Ok(())
    }

    /// Funds left once every accrued balance is covered. Negative when underfunded.
    pub fn link_available_for_payment(&self, ledger: &dyn TokenLedger) -> Result<i128> {
        self.require_token(ledger)?;
        let balance = ledger.balance_of(&self.contract_address);
        let due = self.total_owed();
        let available = if balance >= due {
            i128::try_from(balance - due).unwrap_or(i128::MAX)
        } else {
            i128::try_from(due - balance).map_or(i128::MIN, |shortfall| -shortfall)
        };
        Ok(available)
    }

    /// Active and archived balance of a transmitter.
    pub fn owed_payment(&self, transmitter: &Address) -> u128 {
        let active = self
            .config
            .oracle(transmitter)
            .map(|oracle| oracle.payment_juels)
            .unwrap_or_default();
        active.saturating_add(self.leftover_payments.owed(transmitter))
    }

    pub fn total_owed(&self) -> u128 {
        self.config
            .oracles
            .iter()
            .fold(self.leftover_payments.total(), |total, oracle| {
                total.saturating_add(oracle.payment_juels)
            })
    }

    pub(crate) fn require_token(&self, ledger: &dyn TokenLedger) -> Result<()> {
        require!(ledger.token() == self.link_token, InvalidTokenAccount);
        Ok(())
    }

    pub(crate) fn pending_payouts(&self) -> Vec<Payout> {
        let mut owed: BTreeMap<Address, u128> = BTreeMap::new();
        for oracle in self.config.oracles.iter() {
            *owed.entry(oracle.transmitter).or_default() += oracle.payment_juels;
        }
        for (transmitter, amount) in self.leftover_payments.iter() {
            let balance = owed.entry(*transmitter).or_default();
            *balance = balance.saturating_add(*amount);
        }

        owed.into_iter()
            .filter(|(_, amount)| *amount > 0)
            .filter_map(|(transmitter, amount)| {
                self.payees.payee(&transmitter).map(|payee| Payout {
                    transmitter,
                    payee,
                    amount,
                })
            })
            .collect()
    }

    pub(crate) fn settle(&mut self, payouts: &[Payout]) {
        for payout in payouts {
            self.deduct(&payout.transmitter, payout.amount);
            self.emit(event::OraclePaid {
                transmitter: payout.transmitter,
                payee: payout.payee,
                amount: payout.amount,
                link_token: self.link_token,
            });
        }
    }

    /// Archived balances are drawn down first. Callers guarantee `amount` is owed.
    fn deduct(&mut self, transmitter: &Address, amount: u128) {
        let remaining = self.leftover_payments.deduct(transmitter, amount);
        if remaining == 0 {
            return;
        }
        if let Some(index) = self.config.transmitter_index(transmitter) {
            let oracle = &mut self.config.oracles[index];
            oracle.payment_juels = oracle.payment_juels.saturating_sub(remaining);
        }
    }
}

fn payout_total(payouts: &[Payout]) -> u128 {
    payouts
        .iter()
        .fold(0u128, |total, payout| total.saturating_add(payout.amount))
}
