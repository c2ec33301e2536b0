//! Scale command.

use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::output::{print_single, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct ScaleArgs {
    /// Target number of concurrent users.
    users: u32,
}

#[derive(Debug, Serialize)]
struct ScaleRequest {
    scale: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct MaterializeReport {
    scale: u32,
    vms: Vec<serde_json::Value>,
    replaced: usize,
    dns_records: usize,
    flow_rules: usize,
}

pub async fn run(ctx: CommandContext, args: ScaleArgs) -> Result<()> {
    let client = ctx.client()?;

    let report: MaterializeReport = client
        .put("/v1/configuration/scale", &ScaleRequest { scale: args.users })
        .await?;

    match ctx.format {
        OutputFormat::Json => print_single(&report, ctx.format),
        OutputFormat::Table => print_success(&format!(
            "Planned {} VMs for {} users ({} replaced, {} DNS records, {} flows)",
            report.vms.len(),
            report.scale,
            report.replaced,
            report.dns_records,
            report.flow_rules
        )),
    }
    Ok(())
}
