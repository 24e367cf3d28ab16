#![allow(dead_code)]

use ocr2::billing::{Billing, GIGA};
use ocr2::report::{Report, ReportContext};
use ocr2::signature::{pack_signatures, OnchainKeyring};
use ocr2::store::StoreConfig;
use ocr2::{Address, Aggregator, AggregatorConfig, ConfigArgs, Context, MemoryLedger, Result};

pub const OWNER: Address = Address([0xaa; 20]);
pub const CONTRACT: Address = Address([0xcc; 20]);
pub const LINK: Address = Address([0x11; 20]);
pub const OUTSIDER: Address = Address([0xee; 20]);

pub const OBSERVATIONS_TIMESTAMP: u32 = 1_700_000_000;
/// One juel per wei keeps reimbursements easy to follow.
pub const JUELS_PER_FEE_COIN: u128 = 1_000_000_000_000_000_000;
pub const GAS_PRICE_WEI: u128 = 10 * GIGA;
pub const GAS_USED: u64 = 100_000;
/// GAS_PRICE_WEI * GAS_USED at one juel per wei
pub const REIMBURSEMENT: u128 = 1_000_000_000_000_000;
pub const OBSERVATION_PAYMENT: u128 = GIGA;
pub const TRANSMISSION_PAYMENT: u128 = 2 * GIGA;

pub fn transmitter(i: usize) -> Address {
    Address([0x40 + i as u8; 20])
}

pub fn payee(i: usize) -> Address {
    Address([0x80 + i as u8; 20])
}

pub fn keyring(i: usize) -> OnchainKeyring {
    OnchainKeyring::from_secret(&[i as u8 + 1; 32]).unwrap()
}

pub fn billing() -> Billing {
    Billing {
        maximum_gas_price_gwei: 100,
        reasonable_gas_price_gwei: 10,
        observation_payment_gjuels: 1,
        transmission_payment_gjuels: 2,
        accounting_gas: 0,
    }
}

pub fn aggregator_config(min_answer: i128, max_answer: i128) -> AggregatorConfig {
    AggregatorConfig {
        decimals: 8,
        description: "ETH / USD".to_string(),
        billing: billing(),
        store: StoreConfig {
            live_length: 8,
            historical_length: 4,
            granularity: 4,
        },
        ..AggregatorConfig::new(1, CONTRACT, OWNER, LINK, min_answer, max_answer)
    }
}

pub fn owner() -> Context {
    Context::new(OWNER).at(100, 1_000)
}

/// Committee of `n` oracles; oracle `i` signs with `keyring(i)` and transmits as
/// `transmitter(i)`. `offset` shifts which keys and transmitters are used.
pub fn committee_args(n: usize, f: u8, offset: usize) -> ConfigArgs {
    ConfigArgs {
        signers: (offset..offset + n).map(|i| keyring(i).address()).collect(),
        transmitters: (offset..offset + n).map(transmitter).collect(),
        f,
        onchain_config: vec![1],
        offchain_config_version: 1,
        offchain_config: vec![2, 3],
    }
}

pub struct Harness {
    pub aggregator: Aggregator,
    pub ledger: MemoryLedger,
    /// First oracle of the active committee
    pub offset: usize,
    pub timestamp: u64,
}

impl Harness {
    pub fn new(n: usize, f: u8) -> Self {
        Self::with_config(aggregator_config(0, 1_000_000), n, f)
    }

    pub fn with_config(config: AggregatorConfig, n: usize, f: u8) -> Self {
        let mut aggregator = Aggregator::new(config).unwrap();
        aggregator
            .set_config(&owner(), committee_args(n, f, 0))
            .unwrap();
        Self {
            aggregator,
            ledger: MemoryLedger::new(LINK),
            offset: 0,
            timestamp: 2_000,
        }
    }

    pub fn reconfigure(&mut self, n: usize, f: u8, offset: usize) {
        self.aggregator
            .set_config(&owner(), committee_args(n, f, offset))
            .unwrap();
        self.offset = offset;
    }

    pub fn report(observations: &[i128]) -> Vec<u8> {
        Report {
            observations_timestamp: OBSERVATIONS_TIMESTAMP,
            juels_per_fee_coin: JUELS_PER_FEE_COIN,
            observers: (0..observations.len() as u8).collect(),
            observations: observations.to_vec(),
        }
        .pack()
        .unwrap()
    }

    pub fn report_context(&self, epoch: u32, round: u8) -> ReportContext {
        ReportContext {
            config_digest: self.aggregator.latest_config_details().config_digest,
            epoch,
            round,
            extra_hash: [0; 32],
        }
    }

    /// Transmission context for committee member `i`.
    pub fn ctx(&self, i: usize) -> Context {
        Context::new(transmitter(self.offset + i))
            .at(200, self.timestamp)
            .with_gas(GAS_PRICE_WEI, GAS_USED)
    }

    pub fn transmit_signed(
        &mut self,
        ctx: &Context,
        context: &ReportContext,
        report: &[u8],
        signers: &[usize],
    ) -> Result<u32> {
        let signatures: Vec<_> = signers
            .iter()
            .map(|&i| keyring(i).sign(context, report).unwrap())
            .collect();
        let (rs, ss, raw_vs) = pack_signatures(&signatures)?;
        self.aggregator
            .transmit(ctx, &context.to_words(), report, &rs, &ss, &raw_vs)
    }

    /// Member `from` transmits a report signed by committee members `signers`.
    pub fn transmit(
        &mut self,
        from: usize,
        epoch: u32,
        round: u8,
        observations: &[i128],
        signers: &[usize],
    ) -> Result<u32> {
        let ctx = self.ctx(from);
        let context = self.report_context(epoch, round);
        let report = Self::report(observations);
        let signers: Vec<usize> = signers.iter().map(|i| self.offset + i).collect();
        self.timestamp += 1;
        self.transmit_signed(&ctx, &context, &report, &signers)
    }
}
