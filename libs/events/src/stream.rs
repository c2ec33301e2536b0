//! Structured event stream emitted by an engine invocation.

use serde::{Deserialize, Serialize};

use crate::{EventError, UnitStatus};

// =============================================================================
// Engine Event Type Names
// =============================================================================

/// Raw event type names reported inside task events.
pub mod event_types {
    pub const VERBOSE: &str = "verbose";
    pub const PLAYBOOK_ON_START: &str = "playbook_on_start";
    pub const RUNNER_ON_START: &str = "runner_on_start";
    pub const PLAYBOOK_ON_STATS: &str = "playbook_on_stats";

    /// Engine bookkeeping that never becomes a log entry.
    pub const NOISY: &[&str] = &[VERBOSE, PLAYBOOK_ON_START, RUNNER_ON_START];
}

/// Task name recorded on the summary log entry.
pub const RUN_RECAP_TASK: &str = "PLAY RECAP";

// =============================================================================
// Events
// =============================================================================

/// One event from the automation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The unit's lifecycle status changed.
    StatusChanged {
        correlation_id: String,
        status: UnitStatus,
    },

    /// A task-level event.
    TaskEvent {
        correlation_id: String,
        event: String,
        #[serde(default)]
        task: Option<String>,
        #[serde(default)]
        stdout: String,
    },

    /// Aggregate recap emitted once when the run completes.
    RunSummary {
        correlation_id: String,
        #[serde(default)]
        stdout: String,
    },
}

impl EngineEvent {
    pub fn correlation_id(&self) -> &str {
        match self {
            Self::StatusChanged { correlation_id, .. }
            | Self::TaskEvent { correlation_id, .. }
            | Self::RunSummary { correlation_id, .. } => correlation_id,
        }
    }

    /// Convert this event into the log entry it should produce, if any.
    ///
    /// Status changes and noisy or task-less task events yield `None`.
    pub fn to_log_line(&self) -> Option<LogLine> {
        match self {
            Self::StatusChanged { .. } => None,
            Self::TaskEvent {
                correlation_id,
                event,
                task,
                stdout,
            } => {
                if event_types::NOISY.contains(&event.as_str()) {
                    return None;
                }
                let task = task.as_deref()?;
                Some(LogLine {
                    correlation_id: correlation_id.clone(),
                    event: event.clone(),
                    task: task.to_string(),
                    stdout: stdout.clone(),
                })
            }
            Self::RunSummary {
                correlation_id,
                stdout,
            } => Some(LogLine {
                correlation_id: correlation_id.clone(),
                event: event_types::PLAYBOOK_ON_STATS.to_string(),
                task: RUN_RECAP_TASK.to_string(),
                stdout: stdout.clone(),
            }),
        }
    }
}

/// A log entry derived from an engine event, ready to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub correlation_id: String,
    pub event: String,
    pub task: String,
    pub stdout: String,
}

/// Decode one NDJSON line written by a process-backed engine.
pub fn decode_line(line: &str) -> Result<EngineEvent, EventError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(EventError::Empty);
    }
    Ok(serde_json::from_str(line)?)
}
