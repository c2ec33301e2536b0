//! Application state shared across request handlers.

use std::sync::Arc;

use crate::db::Store;
use crate::deploy::PipelineJobs;
use crate::topology::Topology;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Store,
    topology: Topology,
    jobs: Arc<PipelineJobs>,
}

impl AppState {
    pub fn new(store: Store, topology: Topology, jobs: Arc<PipelineJobs>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store,
                topology,
                jobs,
            }),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn topology(&self) -> &Topology {
        &self.inner.topology
    }

    pub fn jobs(&self) -> &Arc<PipelineJobs> {
        &self.inner.jobs
    }
}
