//! Flags feeds whose new answer moved too far from the previous one.

use std::mem;

use static_assertions::const_assert;
use thiserror::Error;
use tracing::{debug, info};

use arrayvec::arrayvec;

use ocr2::access_controller::AccessController;
use ocr2::validator::ValidatorError;
use ocr2::{Address, AggregatorValidator};

macro_rules! require {
    ($invariant:expr, $error:ident $(,)?) => {
        if !($invariant) {
            return Err(ErrorCode::$error);
        }
    };
}

/// Thresholds are expressed in units of 1/100000 of the previous answer.
pub const THRESHOLD_MULTIPLIER: u128 = 100000;

pub const MAX_FLAGS: usize = 128;

#[derive(Clone, Copy)]
pub struct Flags {
    xs: [Address; MAX_FLAGS],
    len: u64,
}
arrayvec!(Flags, Address, u64);
const_assert!(
    mem::size_of::<Flags>() == mem::size_of::<u64>() + mem::size_of::<Address>() * MAX_FLAGS
);

pub type Result<T, E = ErrorCode> = std::result::Result<T, E>;

pub struct Validator {
    address: Address,
    owner: Address,
    proposed_owner: Address,
    flagging_threshold: u32,
    raising_access_controller: AccessController,
    lowering_access_controller: AccessController,
    flags: Flags,
}

impl Validator {
    pub fn new(
        address: Address,
        owner: Address,
        flagging_threshold: u32,
        raising_access_controller: AccessController,
        lowering_access_controller: AccessController,
    ) -> Self {
        Self {
            address,
            owner,
            proposed_owner: Address::ZERO,
            flagging_threshold,
            raising_access_controller,
            lowering_access_controller,
            flags: Flags::new(),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn transfer_ownership(&mut self, authority: &Address, proposed_owner: Address) -> Result<()> {
        self.require_owner(authority)?;
        require!(!proposed_owner.is_zero(), InvalidInput);
        self.proposed_owner = proposed_owner;
        Ok(())
    }

    pub fn accept_ownership(&mut self, authority: &Address) -> Result<()> {
        require!(
            !self.proposed_owner.is_zero() && *authority == self.proposed_owner,
            Unauthorized
        );
        self.owner = mem::take(&mut self.proposed_owner);
        Ok(())
    }

    pub fn flagging_threshold(&self) -> u32 {
        self.flagging_threshold
    }

    pub fn set_flagging_threshold(&mut self, authority: &Address, threshold: u32) -> Result<()> {
        self.require_owner(authority)?;
        info!(previous = self.flagging_threshold, threshold, "flagging threshold updated");
        self.flagging_threshold = threshold;
        Ok(())
    }

    pub fn set_raising_access_controller(
        &mut self,
        authority: &Address,
        controller: AccessController,
    ) -> Result<()> {
        self.require_owner(authority)?;
        self.raising_access_controller = controller;
        Ok(())
    }

    pub fn set_lowering_access_controller(
        &mut self,
        authority: &Address,
        controller: AccessController,
    ) -> Result<()> {
        self.require_owner(authority)?;
        self.lowering_access_controller = controller;
        Ok(())
    }

    pub fn raising_access_controller_mut(&mut self) -> &mut AccessController {
        &mut self.raising_access_controller
    }

    pub fn lowering_access_controller_mut(&mut self) -> &mut AccessController {
        &mut self.lowering_access_controller
    }

    pub fn flags(&self) -> &[Address] {
        self.flags.as_slice()
    }

    pub fn is_flagged(&self, address: &Address) -> bool {
        self.flags.iter().any(|flag| flag == address)
    }

    /// Checks `answer` against `previous_answer` on behalf of `authority` and flags `address`
    /// if the deviation is too large. Returns whether the answer was within the threshold.
    pub fn check(
        &mut self,
        authority: &Address,
        address: Address,
        previous_answer: i128,
        answer: i128,
    ) -> Result<bool> {
        self.has_raising_access(authority)?;
        let is_valid = is_valid(self.flagging_threshold, previous_answer, answer);
        if !is_valid && !self.is_flagged(&address) {
            // if the len reaches array len, we're at capacity
            require!(self.flags.remaining_capacity() > 0, Full);
            self.flags.push(address);
            info!(%address, previous_answer, answer, "flag raised");
        }
        Ok(is_valid)
    }

    pub fn lower_flags(&mut self, authority: &Address, flags: &[Address]) -> Result<()> {
        self.has_lowering_access(authority)?;

        let positions: Vec<_> = self
            .flags
            .iter()
            .enumerate()
            .filter_map(|(i, flag)| flags.contains(flag).then_some(i))
            .collect();
        for index in positions.iter().rev() {
            // reverse so that subsequent positions aren't affected
            let address = self.flags.remove(*index);
            info!(%address, "flag lowered");
        }
        Ok(())
    }

    fn require_owner(&self, authority: &Address) -> Result<()> {
        require!(*authority == self.owner, Unauthorized);
        Ok(())
    }

    fn has_raising_access(&self, authority: &Address) -> Result<()> {
        let has_access =
            *authority == self.owner || self.raising_access_controller.has_access(authority);
        require!(has_access, Unauthorized);
        Ok(())
    }

    fn has_lowering_access(&self, authority: &Address) -> Result<()> {
        let has_access =
            *authority == self.owner || self.lowering_access_controller.has_access(authority);
        require!(has_access, Unauthorized);
        Ok(())
    }
}

impl AggregatorValidator for Validator {
    fn address(&self) -> Address {
        self.address
    }

    fn validate(
        &mut self,
        feed: &Address,
        _previous_round_id: u32,
        previous_answer: i128,
        round_id: u32,
        answer: i128,
    ) -> Result<bool, ValidatorError> {
        debug!(%feed, round_id, answer, "validating answer");
        Ok(self.check(feed, *feed, previous_answer, answer)?)
    }
}

/// Whether the change from `previous_answer` to `answer`, relative to `previous_answer`,
/// stays within `flagging_threshold / THRESHOLD_MULTIPLIER`.
pub fn is_valid(flagging_threshold: u32, previous_answer: i128, answer: i128) -> bool {
    if previous_answer == 0i128 {
        return true;
    }

    let change = previous_answer.abs_diff(answer);
    let ratio_numerator = match change.checked_mul(THRESHOLD_MULTIPLIER) {
        Some(ratio_numerator) => ratio_numerator,
        None => return false,
    };
    let ratio = ratio_numerator / previous_answer.unsigned_abs();
    ratio <= u128::from(flagging_threshold)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ErrorCode {
    #[error("Unauthorized")]
    Unauthorized = 0,

    #[error("Invalid input")]
    InvalidInput = 1,

    #[error("Flags list is full")]
    Full = 2,
}
