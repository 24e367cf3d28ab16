use crate::billing::Billing;
use crate::signature::SignerRecovery;
use crate::state::{Address, ConfigDigest};
use crate::{Aggregator, Result};

/// Bumped whenever the externally visible behavior changes.
pub const VERSION: u32 = 6;
pub const TYPE_AND_VERSION: &str = "OCR2Aggregator 1.0.0";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoundData {
    pub round_id: u32,
    pub answer: i128,
    pub started_at: u64,
    pub updated_at: u64,
    pub answered_in_round: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LatestConfig {
    pub config_count: u32,
    pub block_number: u64,
    pub config_digest: ConfigDigest,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConfigDigestAndEpoch {
    /// Always false, the epoch is stored rather than recovered from logs
    pub scan_logs: bool,
    pub config_digest: ConfigDigest,
    pub epoch: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransmissionDetails {
    pub config_digest: ConfigDigest,
    pub epoch: u32,
    pub round: u8,
    pub latest_answer: i128,
    pub latest_timestamp: u64,
}

impl<R: SignerRecovery> Aggregator<R> {
    /// Gates the query surface on the read access list.
    pub fn read_as(&self, caller: &Address) -> Result<&Self> {
        require!(self.read_access.has_access(caller), Unauthorized);
        Ok(self)
    }

    pub fn latest_round(&self) -> u32 {
        self.transmissions.latest_round_id()
    }

    pub fn latest_answer(&self) -> i128 {
        self.transmissions
            .latest()
            .map(|transmission| transmission.answer)
            .unwrap_or_default()
    }

    pub fn latest_timestamp(&self) -> u64 {
        self.transmissions
            .latest()
            .map(|transmission| transmission.transmission_timestamp)
            .unwrap_or_default()
    }

    pub fn latest_round_data(&self) -> RoundData {
        let round_id = self.transmissions.latest_round_id();
        match self.transmissions.latest() {
            Some(transmission) => RoundData {
                round_id,
                answer: transmission.answer,
                started_at: transmission.timestamp,
                updated_at: transmission.transmission_timestamp,
                answered_in_round: round_id,
            },
            None => RoundData::default(),
        }
    }

    /// Zeroed outside the retention window.
    pub fn get_round_data(&self, round_id: u32) -> RoundData {
        match self.transmissions.fetch(round_id) {
            Some((answered_in_round, transmission)) => RoundData {
                round_id,
                answer: transmission.answer,
                started_at: transmission.timestamp,
                updated_at: transmission.transmission_timestamp,
                answered_in_round,
            },
            None => RoundData::default(),
        }
    }

    pub fn get_answer(&self, round_id: u32) -> i128 {
        self.get_round_data(round_id).answer
    }

    pub fn get_timestamp(&self, round_id: u32) -> u64 {
        self.get_round_data(round_id).updated_at
    }

    pub fn latest_config_details(&self) -> LatestConfig {
        LatestConfig {
            config_count: self.config.config_count,
            block_number: self.config.latest_config_block_number,
            config_digest: self.config.latest_config_digest,
        }
    }

    pub fn latest_config_digest_and_epoch(&self) -> ConfigDigestAndEpoch {
        ConfigDigestAndEpoch {
            scan_logs: false,
            config_digest: self.config.latest_config_digest,
            epoch: self.transmissions.epoch(),
        }
    }

    /// Epoch and round are those of the latest report under the current configuration.
    pub fn latest_transmission_details(&self) -> TransmissionDetails {
        TransmissionDetails {
            config_digest: self.config.latest_config_digest,
            epoch: self.transmissions.epoch(),
            round: self.transmissions.round(),
            latest_answer: self.latest_answer(),
            latest_timestamp: self.latest_timestamp(),
        }
    }

    pub fn get_billing(&self) -> Billing {
        self.billing
    }

    pub fn get_transmitters(&self) -> Vec<Address> {
        self.config.transmitters()
    }

    pub fn get_signers(&self) -> Vec<Address> {
        self.config.signers()
    }

    /// Observations since the oracle joined the current committee; zero for non-members.
    pub fn oracle_observation_count(&self, transmitter: &Address) -> u32 {
        self.config
            .oracle(transmitter)
            .map(|oracle| oracle.observation_count)
            .unwrap_or_default()
    }

    pub fn payee(&self, transmitter: &Address) -> Option<Address> {
        self.payees.payee(transmitter)
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn version(&self) -> u32 {
        VERSION
    }

    pub fn type_and_version(&self) -> &'static str {
        TYPE_AND_VERSION
    }

    pub fn get_link_token(&self) -> Address {
        self.link_token
    }

    pub fn get_validator_config(&self) -> (Address, u32) {
        (self.validator.address(), self.validator.gas_limit())
    }

    pub fn get_billing_access_controller(&self) -> Address {
        self.billing_access_controller
            .as_ref()
            .map(|controller| controller.address())
            .unwrap_or_default()
    }

    pub fn get_requester_access_controller(&self) -> Address {
        self.requester_access_controller
            .as_ref()
            .map(|controller| controller.address())
            .unwrap_or_default()
    }

    pub fn has_access(&self, user: &Address) -> bool {
        self.read_access.has_access(user)
    }

    pub fn owner(&self) -> Address {
        self.ownership.owner()
    }

    pub fn min_answer(&self) -> i128 {
        self.min_answer
    }

    pub fn max_answer(&self) -> i128 {
        self.max_answer
    }
}
