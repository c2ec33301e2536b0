//! Virtual machine listing.

use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::output::{print_output, print_single, OutputFormat};

use super::{CommandContext, ListResponse};

#[derive(Debug, Args)]
pub struct VmsArgs {
    /// Only show VMs of this tier (e.g. RKEAPPS_WORKER).
    #[arg(long)]
    tier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Tabled)]
struct Vm {
    #[tabled(rename = "ID")]
    id: i64,

    #[tabled(rename = "Hostname")]
    hostname: String,

    #[tabled(rename = "Tier")]
    tier: String,

    #[tabled(rename = "IP")]
    ip: String,

    #[tabled(rename = "CPU")]
    cpu: u32,

    #[tabled(rename = "RAM (MiB)")]
    ram: u32,

    #[tabled(rename = "OS disk")]
    os_disk: u32,

    #[tabled(rename = "Data disk")]
    data_disk: u32,

    #[tabled(rename = "Status")]
    status: String,
}

pub async fn run(ctx: CommandContext, args: VmsArgs) -> Result<()> {
    let client = ctx.client()?;

    let path = match &args.tier {
        Some(tier) => format!("/v1/virtual-machines?tier={tier}"),
        None => "/v1/virtual-machines".to_string(),
    };
    let response: ListResponse<Vm> = client.get(&path).await?;

    match ctx.format {
        OutputFormat::Table => print_output(&response.items, ctx.format),
        OutputFormat::Json => print_single(&response, ctx.format),
    }
    Ok(())
}
