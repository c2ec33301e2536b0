//! Static registry of deployment units.
//!
//! Each unit name maps to an [`InputResolver`] that builds the engine's
//! variables and inventory from the store, plus an optional
//! [`PostInstallHook`] run after the engine returns.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::db::{Store, StoreError};
use crate::topology::VmType;

/// Inputs for one engine invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitInputs {
    pub vars: Map<String, Value>,
    pub inventory: Value,
}

impl UnitInputs {
    /// Reject an inventory that would give the engine nothing to run against.
    pub fn validate(self, unit: &str) -> Result<Self, ResolverError> {
        match &self.inventory {
            Value::Object(groups) if !groups.is_empty() => Ok(self),
            _ => Err(ResolverError::Empty {
                unit: unit.to_string(),
            }),
        }
    }
}

/// Failures while building a unit's inputs.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("no resolver registered for unit '{unit}'")]
    Missing { unit: String },

    #[error("resolver for unit '{unit}' returned an empty inventory")]
    Empty { unit: String },

    #[error("unit '{unit}' needs at least one {tier} VM")]
    MissingTier { unit: String, tier: VmType },

    #[error("unit '{unit}': {reason}")]
    Invalid { unit: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Builds `(vars, inventory)` for a unit.
#[async_trait]
pub trait InputResolver: Send + Sync {
    async fn get_inputs(&self, store: &Store) -> Result<UnitInputs, ResolverError>;
}

/// Runs after a unit's engine invocation. Failures are logged only.
#[async_trait]
pub trait PostInstallHook: Send + Sync {
    async fn post_install(&self, store: &Store) -> anyhow::Result<()>;
}

/// Resolver and optional hook of one unit.
#[derive(Clone)]
pub struct UnitEntry {
    pub resolver: Arc<dyn InputResolver>,
    pub hook: Option<Arc<dyn PostInstallHook>>,
}

/// Unit name to implementation map, fixed at startup.
#[derive(Clone, Default)]
pub struct UnitRegistry {
    units: BTreeMap<String, UnitEntry>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit without a post-install hook.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        resolver: impl InputResolver + 'static,
    ) -> &mut Self {
        self.units.insert(
            name.into(),
            UnitEntry {
                resolver: Arc::new(resolver),
                hook: None,
            },
        );
        self
    }

    /// Register a unit with a post-install hook.
    pub fn register_with_hook(
        &mut self,
        name: impl Into<String>,
        resolver: impl InputResolver + 'static,
        hook: impl PostInstallHook + 'static,
    ) -> &mut Self {
        self.units.insert(
            name.into(),
            UnitEntry {
                resolver: Arc::new(resolver),
                hook: Some(Arc::new(hook)),
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&UnitEntry> {
        self.units.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    /// Registered unit names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }
}
