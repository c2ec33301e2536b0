//! DNS and flow listings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::output::{print_output, print_single, OutputFormat};

use super::{CommandContext, ListResponse};

#[derive(Debug, Clone, Serialize, Deserialize, Tabled)]
struct DnsRecord {
    #[tabled(rename = "Name")]
    name: String,

    #[tabled(rename = "Host")]
    hostname: String,

    #[tabled(rename = "IP")]
    ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Tabled)]
struct FlowRule {
    #[tabled(rename = "ID")]
    id: i64,

    #[tabled(rename = "Source")]
    source: String,

    #[tabled(rename = "Destination")]
    destination: String,

    #[tabled(rename = "Port")]
    port: u16,

    #[tabled(rename = "Proto")]
    protocol: String,

    #[tabled(rename = "Open")]
    is_open: bool,

    #[tabled(rename = "Description")]
    description: String,
}

async fn list<T>(ctx: CommandContext, path: &str) -> Result<()>
where
    T: Serialize + for<'de> Deserialize<'de> + Tabled,
{
    let client = ctx.client()?;
    let response: ListResponse<T> = client.get(path).await?;

    match ctx.format {
        OutputFormat::Table => print_output(&response.items, ctx.format),
        OutputFormat::Json => print_single(&response, ctx.format),
    }
    Ok(())
}

pub async fn dns(ctx: CommandContext) -> Result<()> {
    list::<DnsRecord>(ctx, "/v1/dns").await
}

pub async fn flows(ctx: CommandContext) -> Result<()> {
    list::<FlowRule>(ctx, "/v1/flows").await
}
