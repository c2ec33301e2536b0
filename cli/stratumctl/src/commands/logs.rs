//! Unit log command.

use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::error::CliError;
use crate::output::{print_output, print_single, OutputFormat};

use super::{CommandContext, ListResponse};

#[derive(Debug, Args)]
pub struct LogsArgs {
    /// Correlation ID of the unit run.
    correlation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Tabled)]
struct LogEntry {
    #[tabled(rename = "#")]
    id: i64,

    #[tabled(rename = "Event")]
    event: String,

    #[tabled(rename = "Task")]
    task: String,

    #[tabled(rename = "Output")]
    stdout: String,
}

pub async fn run(ctx: CommandContext, args: LogsArgs) -> Result<()> {
    let client = ctx.client()?;

    let response: ListResponse<LogEntry> = client
        .get(&format!("/v1/logs/{}", args.correlation_id))
        .await
        .map_err(|e| match e {
            CliError::Api { status: 404, .. } => {
                CliError::NotFound(format!("No run with correlation ID '{}'", args.correlation_id))
            }
            other => other,
        })?;

    match ctx.format {
        OutputFormat::Table => print_output(&response.items, ctx.format),
        OutputFormat::Json => print_single(&response, ctx.format),
    }
    Ok(())
}
