use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

use ocr2::state::ConfigStore;
use ocr2::{Address, ConfigArgs};

use super::{decode_hex, read_json};

#[derive(Parser, Debug)]
pub struct DigestArgs {
    /// JSON committee file
    pub committee: PathBuf,
}

/// A committee as submitted to `set_config`, plus where and when it is applied.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Committee {
    pub chain_id: u64,
    pub contract_address: Address,
    /// Count the configuration will have once applied, starting at 1
    pub config_count: u32,
    pub signers: Vec<Address>,
    pub transmitters: Vec<Address>,
    pub f: u8,
    #[serde(default)]
    pub onchain_config: String,
    #[serde(default)]
    pub offchain_config_version: u64,
    #[serde(default)]
    pub offchain_config: String,
}

#[derive(Debug, Serialize)]
pub struct DigestOutput {
    pub config_digest: String,
    pub config_count: u32,
    pub n: usize,
    pub f: u8,
}

pub fn execute(args: &DigestArgs) -> Result<DigestOutput> {
    let committee: Committee = read_json(&args.committee)?;
    compute(committee)
}

pub fn compute(committee: Committee) -> Result<DigestOutput> {
    let previous_count = committee
        .config_count
        .checked_sub(1)
        .ok_or_else(|| anyhow!("config_count starts at 1"))?;
    let args = ConfigArgs {
        signers: committee.signers,
        transmitters: committee.transmitters,
        f: committee.f,
        onchain_config: decode_hex(&committee.onchain_config)?,
        offchain_config_version: committee.offchain_config_version,
        offchain_config: decode_hex(&committee.offchain_config)?,
    };

    let mut previous = ConfigStore::default();
    previous.config_count = previous_count;
    let config = previous
        .next(args, 0, committee.chain_id, &committee.contract_address)
        .map_err(|err| anyhow!("invalid committee: {err}"))?;
    tracing::debug!(n = config.oracles.len(), "committee validated");

    Ok(DigestOutput {
        config_digest: hex::encode(config.latest_config_digest),
        config_count: config.config_count,
        n: config.oracles.len(),
        f: config.f,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committee(config_count: u32) -> Committee {
        serde_json::from_value(serde_json::json!({
            "chain_id": 1,
            "contract_address": "0xcccccccccccccccccccccccccccccccccccccccc",
            "config_count": config_count,
            "signers": [
                "0x0101010101010101010101010101010101010101",
                "0x0202020202020202020202020202020202020202",
                "0x0303030303030303030303030303030303030303",
                "0x0404040404040404040404040404040404040404"
            ],
            "transmitters": [
                "0x4040404040404040404040404040404040404040",
                "0x4141414141414141414141414141414141414141",
                "0x4242424242424242424242424242424242424242",
                "0x4343434343434343434343434343434343434343"
            ],
            "f": 1,
            "onchain_config": "0x01",
            "offchain_config_version": 2,
            "offchain_config": "0a0b"
        }))
        .unwrap()
    }

    #[test]
    fn matches_aggregator_digest() {
        let output = compute(committee(1)).unwrap();
        assert_eq!(output.config_count, 1);
        assert_eq!((output.n, output.f), (4, 1));
        assert!(output.config_digest.starts_with("0001"));

        let committee = committee(1);
        let mut aggregator = ocr2::Aggregator::new(ocr2::AggregatorConfig::new(
            1,
            committee.contract_address,
            Address([0xaa; 20]),
            Address([0x11; 20]),
            0,
            1,
        ))
        .unwrap();
        let digest = aggregator
            .set_config(
                &ocr2::Context::new(Address([0xaa; 20])),
                ConfigArgs {
                    signers: committee.signers,
                    transmitters: committee.transmitters,
                    f: 1,
                    onchain_config: vec![1],
                    offchain_config_version: 2,
                    offchain_config: vec![10, 11],
                },
            )
            .unwrap();
        assert_eq!(output.config_digest, hex::encode(digest));
    }

    #[test]
    fn count_changes_digest() {
        let first = compute(committee(1)).unwrap();
        let second = compute(committee(2)).unwrap();
        assert_ne!(first.config_digest, second.config_digest);
        assert!(compute(committee(0)).is_err());
    }

    #[test]
    fn rejects_invalid_committee() {
        let mut committee = committee(1);
        committee.f = 2;
        assert!(compute(committee).is_err());
    }
}
