//! Deployment pipeline: unit registry, engine adapters, sequencing and jobs.

pub mod command;
pub mod engine;
pub mod jobs;
pub mod registry;
pub mod sequencer;
pub mod units;
pub mod vault;

pub use command::CommandEngine;
pub use engine::{AutomationEngine, EngineError, EngineRequest, EventSink};
pub use jobs::{JobHandle, JobSnapshot, JobState, PipelineJobs, TriggerError};
pub use registry::{InputResolver, PostInstallHook, ResolverError, UnitInputs, UnitRegistry};
pub use sequencer::{RunReport, Sequencer, SequencerError, UnitOutcome};
pub use units::{builtin_registry, DEFAULT_UNITS, MONITORING_UNITS};
pub use vault::VaultBootstrap;
