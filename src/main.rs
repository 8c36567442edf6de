//! tradelens: trade dashboard views on the command line
//!
//! Loads the built-in trade table, computes the selected view and prints it.

use anyhow::Result;
use clap::Parser;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tradelens::{dispatch, sample_trade_table, Args};

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = args.dashboard_config()?;
    let start_time = Instant::now();

    let data = sample_trade_table()?;
    info!(rows = data.height(), view = ?args.view, "trade table loaded");

    let output = dispatch(&data, args.view, &config)?;
    println!("{}", output);

    debug!(elapsed_ms = start_time.elapsed().as_millis() as u64, "view computed");
    Ok(())
}
