//! dhtcell CLI Binary
//!
//! Command-line interface for hosting and calling dhtcell instances.

use anyhow::Context;
use clap::Parser;
use dhtcell::logging::init_logging;
use dhtcell::tooling::cli::{Cli, CliContext};
use std::process;

fn init(cli: &Cli) -> anyhow::Result<CliContext> {
    let context = CliContext::new(cli.config.clone()).context("Error loading configuration")?;
    let logging = cli
        .logging_config(&context.config().logging)
        .context("Error resolving log file")?;
    init_logging(Some(&logging)).context("Error initializing logging")?;
    Ok(context)
}

fn main() {
    let cli = Cli::parse();

    let context = match init(&cli) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    };

    match context.execute(&cli.command) {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
