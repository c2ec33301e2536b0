//! Automation engine interface.
//!
//! The engine installs software for one unit at a time. It reports progress
//! through an [`EventSink`] and returns once the unit has finished; any
//! timeout is the engine's own business.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};
use stratum_events::EngineEvent;
use thiserror::Error;
use tokio::sync::mpsc;

/// Everything an engine needs to run one unit.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub unit: String,
    /// Identifier the engine should stamp on every event of this run.
    pub correlation_id: String,
    pub workdir: PathBuf,
    pub vars: Map<String, Value>,
    /// Ansible-style nested inventory.
    pub inventory: Value,
}

/// Engine invocation failures that are not a reported unit status.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to launch engine: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("engine I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write engine inputs: {0}")]
    Inputs(#[from] serde_json::Error),

    /// The engine exited unsuccessfully without reporting a status.
    #[error("engine exited with {code:?} before reporting a status")]
    Exited { code: Option<i32> },

    #[error("engine task aborted: {0}")]
    Aborted(String),

    #[error("{0}")]
    Other(String),
}

/// Sending half of an engine's event stream.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EventSink {
    /// Create a sink and the receiver the sequencer drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Forward one event. Events sent after the sequencer stopped listening
    /// are dropped.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

/// External automation engine.
#[async_trait]
pub trait AutomationEngine: Send + Sync {
    /// Run `request.unit` to completion, emitting events along the way.
    async fn invoke(&self, request: EngineRequest, events: EventSink) -> Result<(), EngineError>;
}
