//! OCR2 aggregator: accepts threshold-signed reports from a committee of oracles, records
//! the median of their observations and compensates them in the link token.

use thiserror::Error;
use tracing::info;

macro_rules! require {
    ($invariant:expr, $error:ident $(,)?) => {
        if !($invariant) {
            return Err($crate::ErrorCode::$error.into());
        }
    };
}

pub mod access_controller;
pub mod billing;
pub mod config;
pub mod context;
pub mod event;
pub mod ledger;
pub mod query;
pub mod report;
pub mod shared;
pub mod signature;
pub mod state;
pub mod store;
mod transmit;
pub mod validator;

use crate::access_controller::{AccessController, AccessPolicy};
use crate::billing::{Billing, LeftoverPayments, Payees};
use crate::event::Event;
use crate::report::MedianPolicy;
use crate::signature::{Secp256k1Recovery, SignaturePolicy, SignerRecovery};
use crate::state::{ConfigStore, Ownership};
use crate::store::Transmissions;
use crate::validator::ValidatorConfig;

pub use crate::config::AggregatorConfig;
pub use crate::context::Context;
pub use crate::ledger::{MemoryLedger, TokenLedger};
pub use crate::shared::SharedAggregator;
pub use crate::state::{Address, ConfigArgs, ConfigDigest, MAX_ORACLES};
pub use crate::validator::AggregatorValidator;

pub type Result<T, E = ErrorCode> = std::result::Result<T, E>;

pub struct Aggregator<R = Secp256k1Recovery> {
    chain_id: u64,
    contract_address: Address,
    ownership: Ownership,
    link_token: Address,
    min_answer: i128,
    max_answer: i128,
    decimals: u8,
    description: String,
    signature_policy: SignaturePolicy,
    median_policy: MedianPolicy,

    billing: Billing,
    config: ConfigStore,
    transmissions: Transmissions,
    leftover_payments: LeftoverPayments,
    payees: Payees,

    read_access: AccessPolicy,
    /// Consulted for `set_billing`, `pay_oracles` and `withdraw_funds`
    billing_access_controller: Option<AccessController>,
    /// Consulted for `request_new_round`
    requester_access_controller: Option<AccessController>,
    validator: ValidatorConfig,

    recovery: R,
    events: Vec<Event>,
}

impl Aggregator<Secp256k1Recovery> {
    pub fn new(config: AggregatorConfig) -> Result<Self> {
        Self::with_recovery(config, Secp256k1Recovery)
    }
}

impl<R: SignerRecovery> Aggregator<R> {
    pub fn with_recovery(config: AggregatorConfig, recovery: R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            chain_id: config.chain_id,
            contract_address: config.contract_address,
            ownership: Ownership::new(config.owner),
            link_token: config.link_token,
            min_answer: config.min_answer,
            max_answer: config.max_answer,
            decimals: config.decimals,
            description: config.description,
            signature_policy: config.signature_policy,
            median_policy: config.median_policy,
            billing: config.billing,
            config: ConfigStore::default(),
            transmissions: Transmissions::new(&config.store)?,
            leftover_payments: LeftoverPayments::default(),
            payees: Payees::default(),
            read_access: AccessPolicy::default(),
            billing_access_controller: None,
            requester_access_controller: None,
            validator: ValidatorConfig::default(),
            recovery,
            events: Vec::new(),
        })
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Events emitted so far, oldest first.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn emit(&mut self, event: impl Into<Event>) {
        self.events.push(event.into());
    }

    // -- Ownership

    pub fn transfer_ownership(&mut self, ctx: &Context, proposed_owner: Address) -> Result<()> {
        self.ownership.transfer(&ctx.sender, proposed_owner)?;
        self.emit(event::OwnershipTransferRequested {
            from: ctx.sender,
            to: proposed_owner,
        });
        Ok(())
    }

    pub fn accept_ownership(&mut self, ctx: &Context) -> Result<()> {
        let previous = self.ownership.accept(&ctx.sender)?;
        info!(from = %previous, to = %ctx.sender, "ownership transferred");
        self.emit(event::OwnershipTransferred {
            from: previous,
            to: ctx.sender,
        });
        Ok(())
    }

    // -- Configuration

    /// Replaces the committee. Balances accrued under the previous committee move to the
    /// pay-later ledger and the new configuration starts counting epochs from zero.
    pub fn set_config(&mut self, ctx: &Context, args: ConfigArgs) -> Result<ConfigDigest> {
        self.ownership.require_owner(&ctx.sender)?;
        let next = self.config.next(
            args,
            ctx.block_number,
            self.chain_id,
            &self.contract_address,
        )?;

        for oracle in self.config.oracles.iter() {
            self.leftover_payments
                .archive(oracle.transmitter, oracle.payment_juels);
        }
        let previous = std::mem::replace(&mut self.config, next);
        self.transmissions.reset_epoch_and_round();

        let config = &self.config;
        info!(
            config_count = config.config_count,
            digest = %hex::encode(config.latest_config_digest),
            n = config.oracles.len(),
            f = config.f,
            "config set"
        );
        let event = event::ConfigSet {
            previous_config_block_number: previous.latest_config_block_number,
            config_digest: config.latest_config_digest,
            config_count: config.config_count,
            signers: config.signers(),
            transmitters: config.transmitters(),
            f: config.f,
            onchain_config: config.onchain_config.clone(),
            offchain_config_version: config.offchain_config_version,
            offchain_config: config.offchain_config.clone(),
        };
        let digest = config.latest_config_digest;
        self.emit(event);
        Ok(digest)
    }

    // -- Access control

    pub fn set_billing_access_controller(
        &mut self,
        ctx: &Context,
        controller: Option<AccessController>,
    ) -> Result<()> {
        self.ownership.require_owner(&ctx.sender)?;
        let old = self.get_billing_access_controller();
        self.billing_access_controller = controller;
        let current = self.get_billing_access_controller();
        if old != current {
            self.emit(event::BillingAccessControllerSet { old, current });
        }
        Ok(())
    }

    pub fn billing_access_controller_mut(&mut self) -> Option<&mut AccessController> {
        self.billing_access_controller.as_mut()
    }

    pub fn set_requester_access_controller(
        &mut self,
        ctx: &Context,
        controller: Option<AccessController>,
    ) -> Result<()> {
        self.ownership.require_owner(&ctx.sender)?;
        let old = self.get_requester_access_controller();
        self.requester_access_controller = controller;
        let current = self.get_requester_access_controller();
        if old != current {
            self.emit(event::RequesterAccessControllerSet { old, current });
        }
        Ok(())
    }

    pub fn requester_access_controller_mut(&mut self) -> Option<&mut AccessController> {
        self.requester_access_controller.as_mut()
    }

    pub fn add_access(&mut self, ctx: &Context, user: Address) -> Result<()> {
        self.ownership.require_owner(&ctx.sender)?;
        if self.read_access.add(user)? {
            self.emit(event::AddedAccess { user });
        }
        Ok(())
    }

    pub fn remove_access(&mut self, ctx: &Context, user: Address) -> Result<()> {
        self.ownership.require_owner(&ctx.sender)?;
        if self.read_access.remove(&user) {
            self.emit(event::RemovedAccess { user });
        }
        Ok(())
    }

    pub fn enable_access_check(&mut self, ctx: &Context) -> Result<()> {
        self.ownership.require_owner(&ctx.sender)?;
        if self.read_access.set_check_enabled(true) {
            self.emit(event::CheckAccessEnabled);
        }
        Ok(())
    }

    pub fn disable_access_check(&mut self, ctx: &Context) -> Result<()> {
        self.ownership.require_owner(&ctx.sender)?;
        if self.read_access.set_check_enabled(false) {
            self.emit(event::CheckAccessDisabled);
        }
        Ok(())
    }

    pub(crate) fn require_billing_access(&self, sender: &Address) -> Result<()> {
        let has_access = self.ownership.is_owner(sender)
            || self
                .billing_access_controller
                .as_ref()
                .is_some_and(|controller| controller.has_access(sender));
        require!(has_access, Unauthorized);
        Ok(())
    }

    // -- Rounds

    /// Asks the committee for a fresh report. Returns the round id the next report will get.
    pub fn request_new_round(&mut self, ctx: &Context) -> Result<u32> {
        let has_access = self.ownership.is_owner(&ctx.sender)
            || self
                .requester_access_controller
                .as_ref()
                .is_some_and(|controller| controller.has_access(&ctx.sender));
        require!(has_access, Unauthorized);

        let round_id = self.transmissions.next_round_id()?;
        self.emit(event::RoundRequested {
            requester: ctx.sender,
            config_digest: self.config.latest_config_digest,
            epoch: self.transmissions.epoch(),
            round: self.transmissions.round(),
        });
        Ok(round_id)
    }

    pub fn set_validator_config(
        &mut self,
        ctx: &Context,
        validator: Option<Box<dyn AggregatorValidator + Send>>,
        gas_limit: u32,
    ) -> Result<()> {
        self.ownership.require_owner(&ctx.sender)?;
        let (previous_validator, previous_gas_limit) = self.get_validator_config();
        self.validator = ValidatorConfig {
            validator,
            gas_limit,
        };
        let (current_validator, current_gas_limit) = self.get_validator_config();
        if (previous_validator, previous_gas_limit) != (current_validator, current_gas_limit) {
            self.emit(event::ValidatorConfigSet {
                previous_validator,
                previous_gas_limit,
                current_validator,
                current_gas_limit,
            });
        }
        Ok(())
    }

    /// Round history as bytes, see [`Transmissions::snapshot`].
    pub fn snapshot_rounds(&self) -> Vec<u8> {
        self.transmissions.snapshot()
    }

    pub fn restore_rounds(&mut self, ctx: &Context, data: &[u8]) -> Result<()> {
        self.ownership.require_owner(&ctx.sender)?;
        self.transmissions = Transmissions::restore(data)?;
        // epoch and round only order reports within the configuration that produced them
        if self.transmissions.latest_config_digest() != self.config.latest_config_digest {
            self.transmissions.reset_epoch_and_round();
        }
        info!(
            latest_round_id = self.transmissions.latest_round_id(),
            "round history restored"
        );
        Ok(())
    }
}

/// Broad classes of failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Authorization,
    Validation,
    Staleness,
    Funds,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ErrorCode {
    #[error("Unauthorized")]
    Unauthorized = 0,

    #[error("Invalid input")]
    InvalidInput = 1,

    #[error("Too many oracles")]
    TooManyOracles = 2,

    #[error("Stale report")]
    StaleReport = 3,

    #[error("Config digest mismatch")]
    StaleConfig = 4,

    #[error("Wrong number of signatures")]
    InvalidSignatureCount = 5,

    #[error("Overflow")]
    Overflow = 6,

    #[error("Median out of range")]
    AnswerOutOfBounds = 7,

    #[error("Duplicate signer")]
    DuplicateSigner,

    #[error("Duplicate transmitter")]
    DuplicateTransmitter,

    #[error("Payee already set")]
    PayeeAlreadySet,

    #[error("Invalid token account")]
    InvalidTokenAccount,

    #[error("Oracle signer key not found")]
    UnauthorizedSigner,

    #[error("Oracle transmitter key not found")]
    UnauthorizedTransmitter,

    #[error("Fault tolerance must satisfy 0 < 3f < n")]
    InvalidFaultTolerance,

    #[error("Length mismatch")]
    LengthMismatch,

    #[error("Aggregator is not configured")]
    NotConfigured,

    #[error("Duplicate signature")]
    DuplicateSignature,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Malformed report")]
    MalformedReport,

    #[error("Too few observations")]
    TooFewObservations,

    #[error("Too many observations")]
    TooManyObservations,

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Token transfer failed")]
    TransferFailed,

    #[error("Access list is full")]
    Full,
}

impl ErrorCode {
    /// Stable numeric code.
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn kind(self) -> ErrorKind {
        use ErrorCode::*;
        match self {
            Unauthorized | UnauthorizedSigner | UnauthorizedTransmitter | InvalidSignature
            | DuplicateSignature => ErrorKind::Authorization,
            StaleReport | StaleConfig => ErrorKind::Staleness,
            InsufficientFunds | TransferFailed | InvalidTokenAccount => ErrorKind::Funds,
            InvalidInput | TooManyOracles | InvalidSignatureCount | Overflow
            | AnswerOutOfBounds | DuplicateSigner | DuplicateTransmitter | PayeeAlreadySet
            | InvalidFaultTolerance | LengthMismatch | NotConfigured | MalformedReport
            | TooFewObservations | TooManyObservations | Full => ErrorKind::Validation,
        }
    }
}
