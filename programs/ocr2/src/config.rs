use serde::{Deserialize, Serialize};

use crate::billing::Billing;
use crate::report::MedianPolicy;
use crate::signature::SignaturePolicy;
use crate::state::Address;
use crate::store::StoreConfig;
use crate::Result;

/// Raw UTF-8 byte string limit for descriptions
pub const MAX_DESCRIPTION_LEN: usize = 32;

/// Deployment parameters of an aggregator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregatorConfig {
    pub chain_id: u64,
    pub contract_address: Address,
    pub owner: Address,
    pub link_token: Address,
    pub min_answer: i128,
    pub max_answer: i128,
    #[serde(default)]
    pub decimals: u8,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub billing: Billing,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub signature_policy: SignaturePolicy,
    #[serde(default)]
    pub median_policy: MedianPolicy,
}

impl AggregatorConfig {
    pub fn new(
        chain_id: u64,
        contract_address: Address,
        owner: Address,
        link_token: Address,
        min_answer: i128,
        max_answer: i128,
    ) -> Self {
        Self {
            chain_id,
            contract_address,
            owner,
            link_token,
            min_answer,
            max_answer,
            decimals: 0,
            description: String::new(),
            billing: Billing::default(),
            store: StoreConfig::default(),
            signature_policy: SignaturePolicy::default(),
            median_policy: MedianPolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        require!(self.min_answer <= self.max_answer, InvalidInput);
        require!(!self.owner.is_zero(), InvalidInput);
        require!(!self.contract_address.is_zero(), InvalidInput);
        require!(!self.link_token.is_zero(), InvalidInput);
        require!(self.description.len() <= MAX_DESCRIPTION_LEN, InvalidInput);
        self.store.validate()
    }
}
