//! Engine adapter that runs an external program per unit.
//!
//! The program is invoked as
//! `<command> <args..> --unit <name> --ident <correlation id> --workdir <dir>
//! --vars <file> --inventory <file>` and writes one JSON [`EngineEvent`] per
//! line on stdout.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use stratum_events::{decode_line, EngineEvent, EventError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use super::engine::{AutomationEngine, EngineError, EngineRequest, EventSink};

/// Spawns the configured program for each unit.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl AutomationEngine for CommandEngine {
    async fn invoke(&self, request: EngineRequest, events: EventSink) -> Result<(), EngineError> {
        let run_dir = request
            .workdir
            .join(&request.unit)
            .join(&request.correlation_id);
        tokio::fs::create_dir_all(&run_dir).await?;

        let vars_path = run_dir.join("vars.json");
        let inventory_path = run_dir.join("inventory.json");
        tokio::fs::write(&vars_path, serde_json::to_vec_pretty(&request.vars)?).await?;
        tokio::fs::write(&inventory_path, serde_json::to_vec_pretty(&request.inventory)?).await?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--unit")
            .arg(&request.unit)
            .arg("--ident")
            .arg(&request.correlation_id)
            .arg("--workdir")
            .arg(&request.workdir)
            .arg("--vars")
            .arg(&vars_path)
            .arg("--inventory")
            .arg(&inventory_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(EngineError::Spawn)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Other("engine stdout was not captured".to_string()))?;

        let mut lines = BufReader::new(stdout).lines();
        let mut saw_status = false;
        while let Some(line) = lines.next_line().await? {
            match decode_line(&line) {
                Ok(event) => {
                    saw_status |= matches!(event, EngineEvent::StatusChanged { .. });
                    events.emit(event);
                }
                Err(EventError::Empty) => {}
                Err(e) => warn!(unit = %request.unit, error = %e, "Ignoring undecodable engine output"),
            }
        }

        let status = child.wait().await?;
        debug!(unit = %request.unit, code = ?status.code(), "Engine process exited");

        if !status.success() && !saw_status {
            return Err(EngineError::Exited {
                code: status.code(),
            });
        }
        Ok(())
    }
}
