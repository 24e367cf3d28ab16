use std::path::PathBuf;

use anyhow::{anyhow, ensure, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;

use ocr2::billing::Billing;
use ocr2::report::{Report, ReportContext};
use ocr2::signature::{pack_signatures, OnchainKeyring};
use ocr2::{Address, Aggregator, AggregatorConfig, ConfigArgs, Context, MemoryLedger, TokenLedger};

use super::read_json;

const OWNER: Address = Address([0xaa; 20]);
const CONTRACT: Address = Address([0xcc; 20]);
const LINK: Address = Address([0x11; 20]);

#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// JSON aggregator configuration; a permissive default is used when absent
    #[arg(long, env = "OCR2_AGGREGATOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Committee size
    #[arg(short = 'n', long, default_value_t = 4)]
    pub oracles: usize,

    /// Faulty oracles tolerated
    #[arg(short, long, default_value_t = 1)]
    pub faulty: u8,

    /// Rounds to transmit
    #[arg(short, long, default_value_t = 5)]
    pub rounds: u32,

    /// Observations timestamp of the first round, in seconds
    #[arg(long, default_value_t = 1_700_000_000)]
    pub start_timestamp: u32,

    /// Observations are spread around this value
    #[arg(long, default_value_t = 100_000_000, allow_hyphen_values = true)]
    pub answer: i128,

    /// Maximum distance of an observation from `answer`
    #[arg(long, default_value_t = 1_000)]
    pub spread: u32,

    /// Transaction gas price in wei
    #[arg(long, default_value_t = 20_000_000_000)]
    pub gas_price_wei: u128,

    /// Gas used per transmission
    #[arg(long, default_value_t = 120_000)]
    pub gas_used: u64,

    /// Pay the oracles out at the end
    #[arg(long)]
    pub pay: bool,
}

#[derive(Debug, Serialize)]
pub struct SimulatedRound {
    pub round_id: u32,
    pub epoch: u32,
    pub round: u8,
    pub transmitter: Address,
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct SimulatedOracle {
    pub transmitter: Address,
    pub signer: Address,
    pub observations: u32,
    pub owed_juels: String,
    pub paid_juels: String,
}

#[derive(Debug, Serialize)]
pub struct Simulation {
    pub config_digest: String,
    pub rounds: Vec<SimulatedRound>,
    pub oracles: Vec<SimulatedOracle>,
    pub total_owed_juels: String,
    pub events: usize,
}

pub fn execute(args: &SimulateArgs) -> Result<Simulation> {
    let config = match &args.config {
        Some(path) => read_json(path)?,
        None => default_config(),
    };
    simulate(config, args)
}

fn default_config() -> AggregatorConfig {
    AggregatorConfig {
        decimals: 8,
        description: "SIM / USD".to_string(),
        billing: Billing {
            maximum_gas_price_gwei: 100,
            reasonable_gas_price_gwei: 30,
            observation_payment_gjuels: 1,
            transmission_payment_gjuels: 1,
            accounting_gas: 10_000,
        },
        ..AggregatorConfig::new(1, CONTRACT, OWNER, LINK, i128::MIN, i128::MAX)
    }
}

fn keyring(i: usize) -> Result<OnchainKeyring> {
    let seed = u8::try_from(i + 1).map_err(|_| anyhow!("too many oracles"))?;
    OnchainKeyring::from_secret(&[seed; 32]).map_err(|err| anyhow!("keyring {i}: {err}"))
}

fn transmitter(i: usize) -> Address {
    let mut address = [0x40; 20];
    address[19] = i as u8;
    Address(address)
}

fn payee(i: usize) -> Address {
    let mut address = [0x80; 20];
    address[19] = i as u8;
    Address(address)
}

pub fn simulate(config: AggregatorConfig, args: &SimulateArgs) -> Result<Simulation> {
    ensure!(args.oracles <= ocr2::MAX_ORACLES, "at most {} oracles", ocr2::MAX_ORACLES);
    ensure!(args.spread > 0, "spread must be positive");

    let owner = Context::new(config.owner);
    let contract = config.contract_address;
    let link = config.link_token;
    let mut aggregator =
        Aggregator::new(config).map_err(|err| anyhow!("invalid aggregator config: {err}"))?;
    let keyrings = (0..args.oracles)
        .map(keyring)
        .collect::<Result<Vec<_>>>()?;
    let transmitters: Vec<_> = (0..args.oracles).map(transmitter).collect();

    let config_digest = aggregator
        .set_config(
            &owner,
            ConfigArgs {
                signers: keyrings.iter().map(OnchainKeyring::address).collect(),
                transmitters: transmitters.clone(),
                f: args.faulty,
                onchain_config: Vec::new(),
                offchain_config_version: 1,
                offchain_config: Vec::new(),
            },
        )
        .map_err(|err| anyhow!("set_config: {err}"))?;
    let payees: Vec<_> = (0..args.oracles).map(payee).collect();
    aggregator
        .set_payees(&owner, &transmitters, &payees)
        .map_err(|err| anyhow!("set_payees: {err}"))?;

    let signers = usize::from(args.faulty) + 1;
    let mut rounds = Vec::new();
    for i in 0..args.rounds {
        // 256 rounds per epoch
        let epoch = i / 256 + 1;
        let round = (i % 256) as u8;
        let context = ReportContext {
            config_digest,
            epoch,
            round,
            extra_hash: [0; 32],
        };

        let mut observations: Vec<i128> = (0..args.oracles)
            .map(|oracle| {
                let offset = (i as u64 * 7919 + oracle as u64 * 104_729) % u64::from(args.spread);
                args.answer.saturating_add(i128::from(offset))
            })
            .collect();
        observations.sort_unstable();
        let timestamp = args
            .start_timestamp
            .checked_add(i)
            .ok_or_else(|| anyhow!("round {i}: observation timestamp overflows"))?;
        let report = Report {
            observations_timestamp: timestamp,
            juels_per_fee_coin: 1_000_000_000_000_000_000,
            observers: (0..args.oracles as u8).collect(),
            observations,
        }
        .pack()
        .map_err(|err| anyhow!("report: {err}"))?;

        let signatures = keyrings
            .iter()
            .take(signers)
            .map(|keyring| keyring.sign(&context, &report))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| anyhow!("signing: {err}"))?;
        let (rs, ss, raw_vs) =
            pack_signatures(&signatures).map_err(|err| anyhow!("signatures: {err}"))?;

        let from = i as usize % args.oracles;
        let ctx = Context::new(transmitters[from])
            .at(u64::from(i) + 1, u64::from(timestamp))
            .with_gas(args.gas_price_wei, args.gas_used);
        let round_id = aggregator
            .transmit(&ctx, &context.to_words(), &report, &rs, &ss, &raw_vs)
            .map_err(|err| anyhow!("round {i}: {err}"))?;
        let answer = aggregator.latest_answer();
        info!(round_id, answer, epoch, round, "round transmitted");

        rounds.push(SimulatedRound {
            round_id,
            epoch,
            round,
            transmitter: transmitters[from],
            answer: answer.to_string(),
        });
    }

    let mut ledger = MemoryLedger::new(link);
    let owed: Vec<_> = transmitters
        .iter()
        .map(|transmitter| aggregator.owed_payment(transmitter))
        .collect();
    if args.pay {
        ledger.mint(&contract, aggregator.total_owed());
        let total = aggregator
            .pay_oracles(&owner, &mut ledger)
            .map_err(|err| anyhow!("pay_oracles: {err}"))?;
        info!(total, "oracles paid");
    }

    let oracles = transmitters
        .iter()
        .zip(&keyrings)
        .zip(&payees)
        .zip(owed)
        .map(|(((transmitter, keyring), payee), owed)| SimulatedOracle {
            transmitter: *transmitter,
            signer: keyring.address(),
            observations: aggregator.oracle_observation_count(transmitter),
            owed_juels: owed.to_string(),
            paid_juels: ledger.balance_of(payee).to_string(),
        })
        .collect();

    Ok(Simulation {
        config_digest: hex::encode(config_digest),
        rounds,
        oracles,
        total_owed_juels: aggregator.total_owed().to_string(),
        events: aggregator.events().len(),
    })
}
