use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Serialize;

use ocr2::report::{MedianPolicy, Report};

use super::{decode_hex, Median};

#[derive(Parser, Debug)]
pub struct DecodeReportArgs {
    /// Hex encoded report
    pub report: String,

    /// Median selection for an even number of observations
    #[arg(long, value_enum, default_value_t = Median::Lower)]
    pub median: Median,

    /// Also check the report against a committee of this size
    #[arg(short = 'n', long)]
    pub committee_size: Option<usize>,

    /// Fault tolerance of that committee
    #[arg(short, long, default_value_t = 1)]
    pub f: u8,
}

#[derive(Debug, Serialize)]
pub struct DecodedReport {
    pub observations_timestamp: u32,
    /// As a string since JSON numbers can't carry u128
    pub juels_per_fee_coin: String,
    pub observers: Vec<u8>,
    pub observations: Vec<String>,
    pub median: String,
}

pub fn execute(args: &DecodeReportArgs) -> Result<DecodedReport> {
    let raw = decode_hex(&args.report)?;
    let report = match args.committee_size {
        Some(n) => Report::decode(&raw, n, args.f),
        None => Report::unpack(&raw),
    }
    .map_err(|err| anyhow!("invalid report: {err}"))?;
    let median = report
        .median(MedianPolicy::from(args.median))
        .map_err(|err| anyhow!("no median: {err}"))?;

    Ok(DecodedReport {
        observations_timestamp: report.observations_timestamp,
        juels_per_fee_coin: report.juels_per_fee_coin.to_string(),
        observers: report.observers,
        observations: report.observations.iter().map(i128::to_string).collect(),
        median: median.to_string(),
    })
}
