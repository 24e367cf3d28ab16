//! Command line tools around the OCR2 aggregator: config digests, report decoding and an
//! in-memory simulation of signed rounds.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    commands::run(cli)
}

/// Logs go to stderr so command output stays machine readable.
fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn,ocr2=info,ocr2_cli=info",
        1 => "info,ocr2=debug,ocr2_cli=debug",
        _ => "debug,ocr2=trace,ocr2_cli=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(env_filter)
        .init();
}
