//! CLI commands.

mod logs;
mod network;
mod pipeline;
mod scale;
mod vms;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::output::OutputFormat;

/// stratumctl - drive deployments and inspect the planned topology.
#[derive(Debug, Parser)]
#[command(name = "stratumctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Control plane base URL.
    #[arg(
        long,
        global = true,
        env = "STRATUM_API_URL",
        default_value = "http://127.0.0.1:8080"
    )]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the deployment pipeline.
    Start(pipeline::StartArgs),

    /// Show pipeline and unit status.
    Status,

    /// Show the log entries of one unit run.
    Logs(logs::LogsArgs),

    /// List virtual machines.
    Vms(vms::VmsArgs),

    /// Re-plan the topology for a target number of concurrent users.
    Scale(scale::ScaleArgs),

    /// List derived DNS records.
    Dns,

    /// List derived network flows.
    Flows,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let ctx = CommandContext {
            api_url: self.api_url,
            format: OutputFormat::parse(&self.format),
        };

        match self.command {
            Commands::Start(args) => pipeline::start(ctx, args).await,
            Commands::Status => pipeline::status(ctx).await,
            Commands::Logs(args) => logs::run(ctx, args).await,
            Commands::Vms(args) => vms::run(ctx, args).await,
            Commands::Scale(args) => scale::run(ctx, args).await,
            Commands::Dns => network::dns(ctx).await,
            Commands::Flows => network::flows(ctx).await,
        }
    }
}

/// Context passed to all commands.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub api_url: String,
    pub format: OutputFormat,
}

impl CommandContext {
    pub fn client(&self) -> Result<ApiClient> {
        ApiClient::new(&self.api_url)
    }
}

/// List envelope returned by the control plane.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

fn display_option<T: std::fmt::Display>(opt: &Option<T>) -> String {
    opt.as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from(["stratumctl", "--format", "json", "vms", "--tier", "VAULT"])
            .unwrap();
        assert_eq!(cli.format, "json");
        assert!(matches!(cli.command, Commands::Vms(_)));

        let cli = Cli::try_parse_from(["stratumctl", "scale", "500"]).unwrap();
        assert!(matches!(cli.command, Commands::Scale(_)));

        assert!(Cli::try_parse_from(["stratumctl", "scale", "many"]).is_err());
        assert!(Cli::try_parse_from(["stratumctl", "logs"]).is_err());
    }
}
