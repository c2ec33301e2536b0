//! # stratum-events
//!
//! Types exchanged between the deployment sequencer and the automation
//! engine that installs software for each unit.
//!
//! ## Event Stream
//!
//! An engine invocation reports progress as a single stream of tagged
//! [`EngineEvent`] variants:
//! - `status_changed`: the unit's lifecycle status moved
//! - `task_event`: a task-level event with captured stdout
//! - `run_summary`: the final recap emitted once the run completes
//!
//! Process-backed engines write one JSON event per line on stdout;
//! [`decode_line`] turns such a line back into an event.

mod error;
mod status;
mod stream;

pub use error::EventError;
pub use status::UnitStatus;
pub use stream::*;
