//! Pipeline commands.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::output::{colorize_status, print_info, print_output, print_single, print_success, OutputFormat};

use super::{display_option, CommandContext};

#[derive(Debug, Args)]
pub struct StartArgs {
    /// Poll until the pipeline finishes.
    #[arg(long)]
    wait: bool,

    /// Poll interval in seconds when waiting.
    #[arg(long, default_value = "5")]
    interval: u64,
}

/// Pipeline job as reported by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Job {
    id: String,
    started_at: String,
    state: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    report: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Tabled)]
struct Unit {
    #[tabled(rename = "Order")]
    order: i64,

    #[tabled(rename = "Unit")]
    name: String,

    #[tabled(rename = "Status", display = "display_status")]
    status: String,

    #[tabled(rename = "Correlation ID", display = "display_option")]
    correlation_id: Option<String>,
}

fn display_status(status: &str) -> String {
    colorize_status(status).to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct PipelineResponse {
    job: Option<Job>,
    units: Vec<Unit>,
}

/// Start the pipeline.
pub async fn start(ctx: CommandContext, args: StartArgs) -> Result<()> {
    let client = ctx.client()?;
    let response: PipelineResponse = client.post_empty("/v1/pipeline/start").await?;

    if let Some(job) = &response.job {
        match ctx.format {
            OutputFormat::Json if !args.wait => print_single(&response, ctx.format),
            OutputFormat::Json => {}
            OutputFormat::Table => {
                print_success(&format!("Pipeline job {} started", job.id));
                print_output(&response.units, ctx.format);
            }
        }
    }

    if args.wait {
        loop {
            tokio::time::sleep(Duration::from_secs(args.interval.max(1))).await;
            let current: PipelineResponse = client.get("/v1/pipeline").await?;
            let running = current
                .job
                .as_ref()
                .map(|job| job.state == "running")
                .unwrap_or(false);
            if !running {
                render(&current, ctx.format);
                break;
            }
        }
    }
    Ok(())
}

/// Show pipeline and unit status.
pub async fn status(ctx: CommandContext) -> Result<()> {
    let client = ctx.client()?;
    let response: PipelineResponse = client.get("/v1/pipeline").await?;
    render(&response, ctx.format);
    Ok(())
}

fn render(response: &PipelineResponse, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_single(response, format),
        OutputFormat::Table => {
            match &response.job {
                Some(job) => {
                    print_info(&format!(
                        "Job {} started {}: {}",
                        job.id,
                        job.started_at,
                        colorize_status(&job.state)
                    ));
                    if let Some(error) = &job.error {
                        print_info(&format!("Error: {error}"));
                    }
                    if let Some(halted) = job
                        .report
                        .as_ref()
                        .and_then(|r| r["halted_at"].as_str())
                    {
                        print_info(&format!("Halted at {halted}"));
                    }
                }
                None => print_info("No pipeline has been started"),
            }
            print_output(&response.units, format);
        }
    }
}
