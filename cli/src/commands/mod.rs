//! Subcommand definitions. Each subcommand lives in its own module.

pub mod decode_report;
pub mod digest;
pub mod simulate;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Serialize;

use ocr2::report::MedianPolicy;

#[derive(Parser, Debug)]
#[command(name = "ocr2-cli")]
#[command(version)]
#[command(about = "OCR2 aggregator tools", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose logging (can be repeated)
    #[arg(global = true, short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Pretty-print JSON output
    #[arg(global = true, long)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute the config digest of a committee file
    Digest(digest::DigestArgs),

    /// Decode a hex encoded report and print its median
    DecodeReport(decode_report::DecodeReportArgs),

    /// Run an in-memory aggregator through a number of signed rounds
    Simulate(simulate::SimulateArgs),
}

/// Median selection for even observation counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Median {
    #[default]
    Lower,
    Upper,
}

impl From<Median> for MedianPolicy {
    fn from(median: Median) -> Self {
        match median {
            Median::Lower => MedianPolicy::LowerMiddle,
            Median::Upper => MedianPolicy::UpperMiddle,
        }
    }
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Digest(args) => print(&digest::execute(&args)?, cli.pretty),
        Commands::DecodeReport(args) => print(&decode_report::execute(&args)?, cli.pretty),
        Commands::Simulate(args) => print(&simulate::execute(&args)?, cli.pretty),
    }
}

fn print<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

/// Decodes hex with or without a `0x` prefix.
pub(crate) fn decode_hex(data: &str) -> Result<Vec<u8>> {
    let data = data.trim();
    let data = data.strip_prefix("0x").unwrap_or(data);
    hex::decode(data).context("invalid hex")
}
