//! Deployment sequencer.
//!
//! Runs the enqueued units one at a time in ascending order. Each unit's
//! engine invocation is dispatched onto a bounded pool and its event stream
//! is applied to the store as it arrives; the next unit only starts once the
//! previous one has returned and its persisted status has been re-read. The
//! first unit that does not end `successful` halts the run.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use stratum_events::{EngineEvent, UnitStatus};
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::engine::{AutomationEngine, EngineError, EngineRequest, EventSink};
use super::registry::{ResolverError, UnitRegistry};
use super::units::MONITORING_UNITS;
use crate::db::{DeploymentUnit, Store, StoreError};

/// Default size of the engine worker pool.
pub const DEFAULT_WORKERS: usize = 4;

/// Pipeline failures other than a unit ending unsuccessfully.
#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("unit '{unit}' inputs could not be resolved: {source}")]
    UnitResolver {
        unit: String,
        #[source]
        source: ResolverError,
    },

    #[error("engine invocation for unit '{unit}' failed: {source}")]
    EngineInvocation {
        unit: String,
        #[source]
        source: EngineError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Final state of one executed unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitOutcome {
    pub unit: String,
    pub correlation_id: String,
    pub status: UnitStatus,
}

/// Result of a completed pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    /// Units that were executed, in order.
    pub units: Vec<UnitOutcome>,
    /// Unit whose status stopped the run, if any.
    pub halted_at: Option<String>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.halted_at.is_none()
    }
}

/// Executes enqueued units against an automation engine.
#[derive(Clone)]
pub struct Sequencer {
    store: Store,
    registry: Arc<UnitRegistry>,
    engine: Arc<dyn AutomationEngine>,
    pool: Arc<Semaphore>,
    workdir: PathBuf,
}

impl Sequencer {
    pub fn new(
        store: Store,
        registry: Arc<UnitRegistry>,
        engine: Arc<dyn AutomationEngine>,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            registry,
            engine,
            pool: Arc::new(Semaphore::new(DEFAULT_WORKERS)),
            workdir: workdir.into(),
        }
    }

    /// Bound concurrent engine invocations to `workers` (at least one).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.pool = Arc::new(Semaphore::new(workers.max(1)));
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    /// Clear prior run state and enqueue `names` at status `init`.
    ///
    /// When embedded monitoring is enabled, the monitoring units are
    /// appended unless already listed.
    #[instrument(skip(self))]
    pub fn prepare(&self, names: &[String]) -> Result<Vec<DeploymentUnit>, StoreError> {
        let monitoring = match self.store.get_settings() {
            Ok(settings) => settings.monitoring_enabled,
            Err(StoreError::NotFound(_)) => false,
            Err(e) => return Err(e),
        };

        let mut names = names.to_vec();
        if monitoring {
            for unit in MONITORING_UNITS {
                if !names.iter().any(|n| n == unit) {
                    names.push(unit.to_string());
                }
            }
        }

        let units = self.store.replace_units(&names)?;
        info!(units = units.len(), monitoring, "Pipeline prepared");
        Ok(units)
    }

    /// Execute the enqueued units in order, stopping at the first one that
    /// does not end `successful`.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<RunReport, SequencerError> {
        let mut report = RunReport::default();

        for unit in self.store.list_units()? {
            let outcome = self.run_unit(&unit.name).await?;
            let halted = !outcome.status.is_successful();
            report.units.push(outcome);

            if halted {
                warn!(unit = %unit.name, "Pipeline halted");
                report.halted_at = Some(unit.name);
                break;
            }
        }

        if report.succeeded() {
            info!(units = report.units.len(), "Pipeline completed");
        }
        Ok(report)
    }

    #[instrument(skip(self))]
    async fn run_unit(&self, name: &str) -> Result<UnitOutcome, SequencerError> {
        let entry = match self.registry.get(name) {
            Some(entry) => entry.clone(),
            None => {
                return Err(self.resolver_failed(
                    name,
                    ResolverError::Missing {
                        unit: name.to_string(),
                    },
                ))
            }
        };

        let inputs = match entry.resolver.get_inputs(&self.store).await {
            Ok(inputs) => inputs.validate(name),
            Err(e) => Err(e),
        };
        let inputs = match inputs {
            Ok(inputs) => inputs,
            Err(e) => return Err(self.resolver_failed(name, e)),
        };

        let correlation_id = Uuid::new_v4().to_string();
        info!(unit = %name, correlation_id = %correlation_id, "Unit started");

        let request = EngineRequest {
            unit: name.to_string(),
            correlation_id: correlation_id.clone(),
            workdir: self.workdir.clone(),
            vars: inputs.vars,
            inventory: inputs.inventory,
        };
        let (sink, events) = EventSink::channel();

        let permit = self
            .pool
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| SequencerError::EngineInvocation {
                unit: name.to_string(),
                source: EngineError::Aborted(e.to_string()),
            })?;
        let engine = self.engine.clone();
        let invocation = tokio::spawn(async move {
            let _permit = permit;
            engine.invoke(request, sink).await
        });

        self.apply_events(name, events).await;

        let result = match invocation.await {
            Ok(result) => result,
            Err(e) => Err(EngineError::Aborted(e.to_string())),
        };
        if let Err(source) = result {
            if !self.store.get_status(name)?.is_terminal() {
                self.store.mark_failed(name)?;
            }
            warn!(unit = %name, correlation_id = %correlation_id, error = %source, "Engine invocation failed");
            return Err(SequencerError::EngineInvocation {
                unit: name.to_string(),
                source,
            });
        }

        if let Some(hook) = &entry.hook {
            if let Err(e) = hook.post_install(&self.store).await {
                warn!(unit = %name, error = %e, "Post-install hook failed");
            }
        }

        let unit = self.store.get_unit(name)?;
        info!(unit = %name, correlation_id = %correlation_id, status = %unit.status, "Unit finished");

        Ok(UnitOutcome {
            unit: unit.name,
            correlation_id: unit.correlation_id.unwrap_or(correlation_id),
            status: unit.status,
        })
    }

    /// Apply events until the engine drops its sink.
    async fn apply_events(&self, name: &str, mut events: mpsc::UnboundedReceiver<EngineEvent>) {
        while let Some(event) = events.recv().await {
            let applied = match &event {
                EngineEvent::StatusChanged {
                    correlation_id,
                    status,
                } => {
                    debug!(unit = %name, status = %status, "Status changed");
                    self.store.record_status(name, correlation_id, status)
                }
                _ => match event.to_log_line() {
                    Some(line) => self
                        .store
                        .append_log(&line.correlation_id, &line.event, &line.task, &line.stdout)
                        .map(|_| ()),
                    None => Ok(()),
                },
            };

            if let Err(e) = applied {
                warn!(unit = %name, error = %e, "Failed to persist engine event");
            }
        }
    }

    fn resolver_failed(&self, name: &str, source: ResolverError) -> SequencerError {
        if let Err(e) = self.store.mark_failed(name) {
            warn!(unit = %name, error = %e, "Failed to mark unit failed");
        }
        warn!(unit = %name, error = %source, "Unit inputs could not be resolved");
        SequencerError::UnitResolver {
            unit: name.to_string(),
            source,
        }
    }
}
