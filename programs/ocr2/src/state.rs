use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use arrayvec::arrayvec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use static_assertions::const_assert;

use crate::signature::keccak256_concat;
use crate::{ErrorCode, Result};

pub const MAX_ORACLES: usize = 31;
// OCR2 is designed for a maximum of 31 oracles, and there are various assumptions made around this value.
// Signer and observer bitmasks are u32.
const_assert!(MAX_ORACLES <= 31);

pub const DIGEST_SIZE: usize = 32;

/// Digest prefix identifying EVM-style configurations.
pub const CONFIG_DIGEST_PREFIX: [u8; 2] = [0x00, 0x01];

pub type ConfigDigest = [u8; DIGEST_SIZE];

/// A 20 byte account identity (signer, transmitter, payee, owner or contract).
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Address {
    type Err = ErrorCode;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| ErrorCode::InvalidInput)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Owner plus a pending owner; ownership moves only once the proposed owner accepts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ownership {
    owner: Address,
    proposed_owner: Address,
}

impl Ownership {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            proposed_owner: Address::ZERO,
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn proposed_owner(&self) -> Address {
        self.proposed_owner
    }

    pub fn is_owner(&self, authority: &Address) -> bool {
        *authority == self.owner
    }

    pub fn require_owner(&self, authority: &Address) -> Result<()> {
        require!(self.is_owner(authority), Unauthorized);
        Ok(())
    }

    pub fn transfer(&mut self, authority: &Address, proposed_owner: Address) -> Result<()> {
        self.require_owner(authority)?;
        require!(!proposed_owner.is_zero(), InvalidInput);
        require!(proposed_owner != self.owner, InvalidInput);
        self.proposed_owner = proposed_owner;
        Ok(())
    }

    /// Returns the previous owner.
    pub fn accept(&mut self, authority: &Address) -> Result<Address> {
        require!(
            !self.proposed_owner.is_zero() && *authority == self.proposed_owner,
            Unauthorized
        );
        let proposed = std::mem::take(&mut self.proposed_owner);
        Ok(std::mem::replace(&mut self.owner, proposed))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Oracle {
    pub transmitter: Address,
    /// secp256k1 signing key for submissions, as an Ethereum address
    pub signer: Address,
    /// Observations included in accepted reports since joining the committee
    pub observation_count: u32,
    /// Accrued and not yet withdrawn, in juels
    pub payment_juels: u128,
}

#[derive(Clone, Copy)]
pub struct Oracles {
    xs: [Oracle; MAX_ORACLES],
    len: u8,
}
arrayvec!(Oracles, Oracle, u8);

/// The active committee and the configuration it was set with.
#[derive(Clone, Debug, Default)]
pub struct ConfigStore {
    pub f: u8,
    pub config_count: u32,
    pub latest_config_digest: ConfigDigest,
    pub latest_config_block_number: u64,
    pub onchain_config: Vec<u8>,
    pub offchain_config_version: u64,
    pub offchain_config: Vec<u8>,
    pub oracles: Oracles,
    signers: HashMap<Address, u8>,
    transmitters: HashMap<Address, u8>,
}

/// Arguments of a configuration change, as submitted by the owner.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigArgs {
    pub signers: Vec<Address>,
    pub transmitters: Vec<Address>,
    pub f: u8,
    pub onchain_config: Vec<u8>,
    pub offchain_config_version: u64,
    pub offchain_config: Vec<u8>,
}

impl ConfigArgs {
    pub fn validate(&self) -> Result<()> {
        let n = self.signers.len();
        require!(n == self.transmitters.len(), LengthMismatch);
        require!(n <= MAX_ORACLES, TooManyOracles);
        require!(self.f != 0, InvalidFaultTolerance);
        require!(3 * usize::from(self.f) < n, InvalidFaultTolerance);

        let zero_identity = self
            .signers
            .iter()
            .chain(&self.transmitters)
            .any(Address::is_zero);
        require!(!zero_identity, InvalidInput);

        let mut signers = self.signers.clone();
        signers.sort_unstable();
        let duplicate_signer = signers.windows(2).any(|pair| pair[0] == pair[1]);
        require!(!duplicate_signer, DuplicateSigner);

        let mut transmitters = self.transmitters.clone();
        transmitters.sort_unstable();
        let duplicate_transmitter = transmitters.windows(2).any(|pair| pair[0] == pair[1]);
        require!(!duplicate_transmitter, DuplicateTransmitter);

        Ok(())
    }
}

impl ConfigStore {
    pub fn is_configured(&self) -> bool {
        self.config_count > 0
    }

    pub fn signer_index(&self, signer: &Address) -> Option<usize> {
        self.signers.get(signer).map(|&index| usize::from(index))
    }

    pub fn transmitter_index(&self, transmitter: &Address) -> Option<usize> {
        self.transmitters
            .get(transmitter)
            .map(|&index| usize::from(index))
    }

    pub fn oracle(&self, transmitter: &Address) -> Option<&Oracle> {
        self.transmitter_index(transmitter)
            .map(|index| &self.oracles[index])
    }

    pub fn transmitters(&self) -> Vec<Address> {
        self.oracles.iter().map(|oracle| oracle.transmitter).collect()
    }

    pub fn signers(&self) -> Vec<Address> {
        self.oracles.iter().map(|oracle| oracle.signer).collect()
    }

    /// Builds the configuration that supersedes this one. Observation counters and balances
    /// start from zero; archiving the current balances is up to the caller.
    pub fn next(
        &self,
        args: ConfigArgs,
        block_number: u64,
        chain_id: u64,
        contract_address: &Address,
    ) -> Result<ConfigStore> {
        args.validate()?;

        let mut oracles = Oracles::new();
        let mut signers = HashMap::with_capacity(args.signers.len());
        let mut transmitters = HashMap::with_capacity(args.transmitters.len());
        for (index, (&signer, &transmitter)) in
            args.signers.iter().zip(&args.transmitters).enumerate()
        {
            // index < MAX_ORACLES, so it fits in u8
            signers.insert(signer, index as u8);
            transmitters.insert(transmitter, index as u8);
            oracles
                .try_push(Oracle {
                    transmitter,
                    signer,
                    ..Oracle::default()
                })
                .map_err(|_| ErrorCode::TooManyOracles)?;
        }

        let mut config = ConfigStore {
            f: args.f,
            config_count: self
                .config_count
                .checked_add(1)
                .ok_or(ErrorCode::Overflow)?,
            latest_config_digest: [0u8; DIGEST_SIZE],
            latest_config_block_number: block_number,
            onchain_config: args.onchain_config,
            offchain_config_version: args.offchain_config_version,
            offchain_config: args.offchain_config,
            oracles,
            signers,
            transmitters,
        };
        config.latest_config_digest = config.config_digest_from_data(chain_id, contract_address);
        Ok(config)
    }

    pub fn config_digest_from_data(
        &self,
        chain_id: u64,
        contract_address: &Address,
    ) -> ConfigDigest {
        let mut data: Vec<&[u8]> = Vec::with_capacity(10 + 2 * self.oracles.len());
        let chain_id = chain_id.to_be_bytes();
        data.push(&chain_id);
        data.push(contract_address.as_ref());
        let count = self.config_count.to_be_bytes();
        data.push(&count);
        let n = [self.oracles.len() as u8]; // safe because it will always fit in MAX_ORACLES
        data.push(&n);
        for oracle in self.oracles.iter() {
            data.push(oracle.signer.as_ref());
        }
        for oracle in self.oracles.iter() {
            data.push(oracle.transmitter.as_ref());
        }
        let f = [self.f];
        data.push(&f);
        let onchain_config_len = (self.onchain_config.len() as u32).to_be_bytes();
        data.push(&onchain_config_len);
        data.push(&self.onchain_config);
        let offchain_version = self.offchain_config_version.to_be_bytes();
        data.push(&offchain_version);
        let offchain_config_len = (self.offchain_config.len() as u32).to_be_bytes();
        data.push(&offchain_config_len);
        data.push(&self.offchain_config);

        let mut result = keccak256_concat(&data);
        // prefix masking
        result[..2].copy_from_slice(&CONFIG_DIGEST_PREFIX);
        result
    }
}
