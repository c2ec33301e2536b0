//! stratumctl - operator CLI for the stratum control plane
//!
//! Starts and follows the deployment pipeline and inspects the planned
//! topology over the control plane's HTTP API.

use anyhow::Result;
use clap::Parser;

mod client;
mod commands;
mod error;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
