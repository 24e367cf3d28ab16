use std::fmt;
use std::sync::{Arc, Mutex};

use crate::state::Address;

pub type ValidatorError = Box<dyn std::error::Error + Send + Sync>;

/// Downstream hook notified of every new answer. Failures never affect the transmission.
pub trait AggregatorValidator {
    fn address(&self) -> Address;

    /// Returns whether the new answer is considered valid.
    fn validate(
        &mut self,
        feed: &Address,
        previous_round_id: u32,
        previous_answer: i128,
        round_id: u32,
        answer: i128,
    ) -> Result<bool, ValidatorError>;
}

impl<T: AggregatorValidator + ?Sized> AggregatorValidator for Box<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    fn validate(
        &mut self,
        feed: &Address,
        previous_round_id: u32,
        previous_answer: i128,
        round_id: u32,
        answer: i128,
    ) -> Result<bool, ValidatorError> {
        (**self).validate(feed, previous_round_id, previous_answer, round_id, answer)
    }
}

/// Lets a validator be shared between several aggregators.
impl<T: AggregatorValidator> AggregatorValidator for Arc<Mutex<T>> {
    fn address(&self) -> Address {
        match self.lock() {
            Ok(validator) => validator.address(),
            Err(poisoned) => poisoned.into_inner().address(),
        }
    }

    fn validate(
        &mut self,
        feed: &Address,
        previous_round_id: u32,
        previous_answer: i128,
        round_id: u32,
        answer: i128,
    ) -> Result<bool, ValidatorError> {
        let mut validator = self.lock().map_err(|_| "validator lock poisoned")?;
        validator.validate(feed, previous_round_id, previous_answer, round_id, answer)
    }
}

/// The configured validator and the gas budget it is called with. A zero gas limit disables
/// the call.
#[derive(Default)]
pub struct ValidatorConfig {
    pub(crate) validator: Option<Box<dyn AggregatorValidator + Send>>,
    pub(crate) gas_limit: u32,
}

impl ValidatorConfig {
    pub fn address(&self) -> Address {
        self.validator
            .as_ref()
            .map(|validator| validator.address())
            .unwrap_or_default()
    }

    pub fn gas_limit(&self) -> u32 {
        self.gas_limit
    }

    pub(crate) fn is_active(&self) -> bool {
        self.validator.is_some() && self.gas_limit > 0
    }
}

impl fmt::Debug for ValidatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorConfig")
            .field("validator", &self.address())
            .field("gas_limit", &self.gas_limit)
            .finish()
    }
}
