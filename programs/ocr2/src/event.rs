use borsh::{BorshDeserialize, BorshSerialize};

use crate::billing::Billing;
use crate::state::{Address, ConfigDigest};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ConfigSet {
    pub previous_config_block_number: u64,
    pub config_digest: ConfigDigest,
    pub config_count: u32,
    pub signers: Vec<Address>,
    pub transmitters: Vec<Address>,
    pub f: u8,
    pub onchain_config: Vec<u8>,
    pub offchain_config_version: u64,
    pub offchain_config: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NewTransmission {
    pub round_id: u32,
    pub answer: i128,
    pub transmitter: Address,
    pub observations_timestamp: u32,
    pub observations: Vec<i128>,
    pub observers: Vec<u8>,
    pub juels_per_fee_coin: u128,
    pub config_digest: ConfigDigest,
    /// epoch << 8 | round
    pub epoch_and_round: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Transmitted {
    pub config_digest: ConfigDigest,
    pub epoch: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AnswerUpdated {
    pub current: i128,
    pub round_id: u32,
    pub updated_at: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NewRound {
    pub round_id: u32,
    pub started_by: Address,
    pub started_at: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BillingSet {
    pub billing: Billing,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct OraclePaid {
    pub transmitter: Address,
    pub payee: Address,
    pub amount: u128,
    pub link_token: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PayeeshipTransferRequested {
    pub transmitter: Address,
    pub current: Address,
    pub proposed: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PayeeshipTransferred {
    pub transmitter: Address,
    pub previous: Address,
    pub current: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BillingAccessControllerSet {
    pub old: Address,
    pub current: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RequesterAccessControllerSet {
    pub old: Address,
    pub current: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct LinkTokenSet {
    pub old: Address,
    pub current: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ValidatorConfigSet {
    pub previous_validator: Address,
    pub previous_gas_limit: u32,
    pub current_validator: Address,
    pub current_gas_limit: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RoundRequested {
    pub requester: Address,
    pub config_digest: ConfigDigest,
    pub epoch: u32,
    pub round: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct OwnershipTransferRequested {
    pub from: Address,
    pub to: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct OwnershipTransferred {
    pub from: Address,
    pub to: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AddedAccess {
    pub user: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RemovedAccess {
    pub user: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CheckAccessEnabled;

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CheckAccessDisabled;

macro_rules! events {
    ($($name:ident),* $(,)?) => {
        /// Everything the aggregator emits, in emission order.
        #[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
        pub enum Event {
            $($name($name),)*
        }

        impl Event {
            pub fn name(&self) -> &'static str {
                match self {
                    $(Event::$name(_) => stringify!($name),)*
                }
            }
        }

        $(
            impl From<$name> for Event {
                fn from(event: $name) -> Self {
                    Event::$name(event)
                }
            }
        )*
    };
}

events!(
    ConfigSet,
    NewTransmission,
    Transmitted,
    AnswerUpdated,
    NewRound,
    BillingSet,
    OraclePaid,
    PayeeshipTransferRequested,
    PayeeshipTransferred,
    BillingAccessControllerSet,
    RequesterAccessControllerSet,
    LinkTokenSet,
    ValidatorConfigSet,
    RoundRequested,
    OwnershipTransferRequested,
    OwnershipTransferred,
    AddedAccess,
    RemovedAccess,
    CheckAccessEnabled,
    CheckAccessDisabled,
);

impl Event {
    pub fn encode(&self) -> std::io::Result<Vec<u8>> {
        borsh::to_vec(self)
    }

    pub fn decode(data: &[u8]) -> std::io::Result<Self> {
        borsh::from_slice(data)
    }
}
