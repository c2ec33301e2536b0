//! Background pipeline jobs.
//!
//! A trigger prepares the run synchronously, then executes it on a spawned
//! task. Callers get a [`JobHandle`] they can poll or await; at most one
//! pipeline is in flight at a time.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

use super::sequencer::{RunReport, Sequencer};
use crate::db::StoreError;

/// State of a pipeline job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed { report: RunReport },
    Failed { error: String },
}

impl JobState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("pipeline job {0} is already running")]
    AlreadyRunning(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Pollable handle to a spawned pipeline run.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    state: watch::Receiver<JobState>,
}

/// Serializable view of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: JobState,
}

impl JobHandle {
    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().is_running()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            started_at: self.started_at,
            state: self.state(),
        }
    }

    /// Wait until the job leaves `running`.
    pub async fn wait(&self) -> JobState {
        let mut rx = self.state.clone();
        let done = rx
            .wait_for(|state| !state.is_running())
            .await
            .map(|state| state.clone());
        match done {
            Ok(state) => state,
            Err(_) => rx.borrow().clone(),
        }
    }
}

/// Single-flight pipeline launcher.
pub struct PipelineJobs {
    sequencer: Sequencer,
    units: Vec<String>,
    current: Mutex<Option<JobHandle>>,
}

impl PipelineJobs {
    pub fn new(sequencer: Sequencer, units: Vec<String>) -> Self {
        Self {
            sequencer,
            units,
            current: Mutex::new(None),
        }
    }

    /// Configured unit list, before monitoring units are appended.
    pub fn units(&self) -> &[String] {
        &self.units
    }

    /// Most recently triggered job.
    pub fn current(&self) -> Option<JobHandle> {
        self.current.lock().ok().and_then(|guard| guard.clone())
    }

    /// Prepare the run and start it in the background.
    pub fn trigger(self: &Arc<Self>) -> Result<JobHandle, TriggerError> {
        let mut current = self.current.lock().map_err(|_| StoreError::Poisoned)?;
        if let Some(job) = current.as_ref().filter(|job| job.is_running()) {
            return Err(TriggerError::AlreadyRunning(job.id));
        }

        self.sequencer.prepare(&self.units)?;

        let (tx, rx) = watch::channel(JobState::Running);
        let handle = JobHandle {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            state: rx,
        };
        let job_id = handle.id;
        let sequencer = self.sequencer.clone();

        tokio::spawn(async move {
            let state = match sequencer.run().await {
                Ok(report) => {
                    info!(job_id = %job_id, halted_at = ?report.halted_at, "Pipeline job finished");
                    JobState::Completed { report }
                }
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Pipeline job failed");
                    JobState::Failed {
                        error: e.to_string(),
                    }
                }
            };
            let _ = tx.send(state);
        });

        info!(job_id = %job_id, "Pipeline job started");
        *current = Some(handle.clone());
        Ok(handle)
    }
}
