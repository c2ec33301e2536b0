//! Shared harness for control-plane integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use stratum_control_plane::{
    api,
    config::TopologyFile,
    db::{Settings, Store},
    deploy::{
        builtin_registry, AutomationEngine, EngineError, EngineRequest, EventSink, PipelineJobs,
        Sequencer, UnitRegistry, VaultBootstrap,
    },
    state::AppState,
    topology::{Planner, Topology},
};
use stratum_events::{EngineEvent, UnitStatus};
use tower::ServiceExt;

/// Engine that replays a fixed event script per unit.
#[derive(Default)]
pub struct ScriptedEngine {
    outcomes: HashMap<String, UnitStatus>,
    calls: Mutex<Vec<String>>,
    hold: bool,
}

impl ScriptedEngine {
    /// Engine whose invocations never return.
    pub fn holding() -> Self {
        Self {
            hold: true,
            ..Self::default()
        }
    }

    pub fn with_outcome(mut self, unit: &str, status: UnitStatus) -> Self {
        self.outcomes.insert(unit.to_string(), status);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AutomationEngine for ScriptedEngine {
    async fn invoke(&self, request: EngineRequest, events: EventSink) -> Result<(), EngineError> {
        self.calls.lock().unwrap().push(request.unit.clone());
        if self.hold {
            std::future::pending::<()>().await;
        }
        let cid = request.correlation_id;
        let status = self
            .outcomes
            .get(&request.unit)
            .cloned()
            .unwrap_or(UnitStatus::Successful);

        for step in [UnitStatus::Starting, UnitStatus::Running] {
            events.emit(EngineEvent::StatusChanged {
                correlation_id: cid.clone(),
                status: step,
            });
        }
        events.emit(EngineEvent::TaskEvent {
            correlation_id: cid.clone(),
            event: "runner_on_start".to_string(),
            task: Some("Install packages".to_string()),
            stdout: String::new(),
        });
        events.emit(EngineEvent::TaskEvent {
            correlation_id: cid.clone(),
            event: "runner_on_ok".to_string(),
            task: Some("Install packages".to_string()),
            stdout: format!("{} installed", request.unit),
        });
        events.emit(EngineEvent::RunSummary {
            correlation_id: cid.clone(),
            stdout: "ok=1 changed=1 failed=0".to_string(),
        });
        events.emit(EngineEvent::StatusChanged {
            correlation_id: cid,
            status,
        });
        Ok(())
    }
}

pub fn test_settings() -> Settings {
    Settings {
        scale: 100,
        base_domain: "example.org".to_string(),
        env_prefix: "test".to_string(),
        monitoring_enabled: false,
    }
}

/// In-memory store with settings and the built-in zones.
pub fn seeded_store(settings: &Settings) -> Store {
    let store = Store::open_in_memory().unwrap();
    store.seed_settings(settings).unwrap();
    store.seed_zones(&TopologyFile::builtin().zones).unwrap();
    store
}

pub struct Harness {
    pub store: Store,
    pub topology: Topology,
    pub jobs: Arc<PipelineJobs>,
    pub engine: Arc<ScriptedEngine>,
    pub router: Router,
}

impl Harness {
    pub fn new(engine: ScriptedEngine, units: &[&str]) -> Self {
        Self::with_settings(engine, units, test_settings())
    }

    pub fn with_settings(engine: ScriptedEngine, units: &[&str], settings: Settings) -> Self {
        let registry = builtin_registry(VaultBootstrap::new().unwrap());
        Self::with_registry(engine, units, settings, registry)
    }

    pub fn with_registry(
        engine: ScriptedEngine,
        units: &[&str],
        settings: Settings,
        registry: UnitRegistry,
    ) -> Self {
        let store = seeded_store(&settings);
        let topology = Topology::new(store.clone(), Planner::default());
        let engine = Arc::new(engine);
        let sequencer = Sequencer::new(
            store.clone(),
            Arc::new(registry),
            engine.clone(),
            std::env::temp_dir(),
        );
        let jobs = Arc::new(PipelineJobs::new(
            sequencer,
            units.iter().map(|u| u.to_string()).collect(),
        ));
        let router = api::create_router(AppState::new(
            store.clone(),
            topology.clone(),
            jobs.clone(),
        ));

        Self {
            store,
            topology,
            jobs,
            engine,
            router,
        }
    }

    /// Send a request and decode the JSON body.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (u16, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status().as_u16();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}
