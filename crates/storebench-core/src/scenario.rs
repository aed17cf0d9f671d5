//! Scenario registry.
//!
//! A scenario is one named benchmark case carrying an operation descriptor per
//! backend. Names are the join key when results from different backends are
//! merged, so the registry rejects duplicates.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::{BackendId, Operation};
use crate::error::ScenarioError;

/// Which runner a scenario is measured by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    Read,
    Write,
    Load,
}

/// How a scenario is driven.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "workload", rename_all = "snake_case")]
pub enum Workload {
    /// Sequential reads, each timed individually.
    Read { iterations: u32 },
    /// Sequential write cycles (write plus compensating delete).
    Write {
        iterations: u32,
        /// Multiplier turning a per-cycle latency into records per second.
        batch_size: u32,
        #[serde(default = "default_compensate")]
        compensate: bool,
    },
    /// Fixed worker pool hammering the store until a deadline.
    Load { duration_ms: u64, concurrency: usize },
}

fn default_compensate() -> bool {
    true
}

impl Workload {
    pub fn kind(&self) -> WorkloadKind {
        match self {
            Workload::Read { .. } => WorkloadKind::Read,
            Workload::Write { .. } => WorkloadKind::Write,
            Workload::Load { .. } => WorkloadKind::Load,
        }
    }

    /// Load duration, for load workloads.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Workload::Load { duration_ms, .. } => Some(Duration::from_millis(*duration_ms)),
            _ => None,
        }
    }
}

/// Immutable definition of one benchmark case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub name: String,
    #[serde(flatten)]
    pub workload: Workload,
    #[serde(default)]
    pub operations: BTreeMap<BackendId, Operation>,
}

impl ScenarioSpec {
    pub fn read(name: impl Into<String>, iterations: u32) -> Self {
        Self::new(name, Workload::Read { iterations })
    }

    pub fn write(name: impl Into<String>, iterations: u32, batch_size: u32) -> Self {
        Self::new(
            name,
            Workload::Write {
                iterations,
                batch_size,
                compensate: true,
            },
        )
    }

    pub fn load(name: impl Into<String>, duration: Duration, concurrency: usize) -> Self {
        Self::new(
            name,
            Workload::Load {
                duration_ms: duration.as_millis() as u64,
                concurrency,
            },
        )
    }

    fn new(name: impl Into<String>, workload: Workload) -> Self {
        Self {
            name: name.into(),
            workload,
            operations: BTreeMap::new(),
        }
    }

    /// Bind the operation a backend executes for this scenario.
    pub fn with_operation(mut self, backend: impl Into<BackendId>, operation: Operation) -> Self {
        self.operations.insert(backend.into(), operation);
        self
    }

    pub fn operation_for(&self, backend: &BackendId) -> Option<&Operation> {
        self.operations.get(backend)
    }

    pub fn kind(&self) -> WorkloadKind {
        self.workload.kind()
    }

    fn validate(&self) -> Result<(), ScenarioError> {
        match self.workload {
            Workload::Read { iterations } | Workload::Write { iterations, .. }
                if iterations == 0 =>
            {
                Err(ScenarioError::ZeroIterations(self.name.clone()))
            }
            Workload::Write { batch_size: 0, .. } => {
                Err(ScenarioError::ZeroBatchSize(self.name.clone()))
            }
            Workload::Load { concurrency: 0, .. } => {
                Err(ScenarioError::ZeroConcurrency(self.name.clone()))
            }
            Workload::Load { duration_ms: 0, .. } => {
                Err(ScenarioError::ZeroDuration(self.name.clone()))
            }
            _ => Ok(()),
        }
    }
}

/// Ordered set of scenarios with unique names.
#[derive(Debug, Clone, Default)]
pub struct ScenarioRegistry {
    scenarios: Vec<ScenarioSpec>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scenario, validating its name and counts.
    pub fn register(&mut self, spec: ScenarioSpec) -> Result<(), ScenarioError> {
        spec.validate()?;
        if self.get(&spec.name).is_some() {
            return Err(ScenarioError::DuplicateName(spec.name));
        }
        self.scenarios.push(spec);
        Ok(())
    }

    /// Build a registry from a JSON array of scenarios.
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        let specs: Vec<ScenarioSpec> = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for spec in specs {
            registry.register(spec)?;
        }
        Ok(registry)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn get(&self, name: &str) -> Option<&ScenarioSpec> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScenarioSpec> {
        self.scenarios.iter()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Backends that some scenario lacks an operation for.
    pub fn coverage_gaps<'a>(
        &'a self,
        backends: &'a [BackendId],
    ) -> impl Iterator<Item = (&'a str, &'a BackendId)> + 'a {
        self.scenarios.iter().flat_map(move |spec| {
            backends
                .iter()
                .filter(move |b| spec.operation_for(b).is_none())
                .map(move |b| (spec.name.as_str(), b))
        })
    }
}

impl<'a> IntoIterator for &'a ScenarioRegistry {
    type Item = &'a ScenarioSpec;
    type IntoIter = std::slice::Iter<'a, ScenarioSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.scenarios.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = ScenarioRegistry::new();
        registry
            .register(ScenarioSpec::read("price range", 10))
            .unwrap();
        let err = registry
            .register(ScenarioSpec::read("price range", 20))
            .unwrap_err();
        assert!(matches!(err, ScenarioError::DuplicateName(name) if name == "price range"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_rejects_zero_counts() {
        let mut registry = ScenarioRegistry::new();
        assert!(matches!(
            registry.register(ScenarioSpec::read("a", 0)),
            Err(ScenarioError::ZeroIterations(_))
        ));
        assert!(matches!(
            registry.register(ScenarioSpec::write("b", 10, 0)),
            Err(ScenarioError::ZeroBatchSize(_))
        ));
        assert!(matches!(
            registry.register(ScenarioSpec::load("c", Duration::from_secs(1), 0)),
            Err(ScenarioError::ZeroConcurrency(_))
        ));
        assert!(matches!(
            registry.register(ScenarioSpec::load("d", Duration::ZERO, 4)),
            Err(ScenarioError::ZeroDuration(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_from_json() {
        let registry = ScenarioRegistry::from_json(
            r#"[
                {
                    "name": "simple",
                    "workload": "read",
                    "iterations": 100,
                    "operations": {
                        "sqlite": {"kind": "sql", "statement": "SELECT 1"}
                    }
                },
                {
                    "name": "single write",
                    "workload": "write",
                    "iterations": 10,
                    "batch_size": 100,
                    "operations": {}
                },
                {
                    "name": "concurrent",
                    "workload": "load",
                    "duration_ms": 2000,
                    "concurrency": 8
                }
            ]"#,
        )
        .unwrap();

        assert_eq!(registry.len(), 3);
        let simple = registry.get("simple").unwrap();
        assert_eq!(simple.workload, Workload::Read { iterations: 100 });
        assert!(simple.operation_for(&BackendId::from("sqlite")).is_some());

        let write = registry.get("single write").unwrap();
        assert_eq!(
            write.workload,
            Workload::Write {
                iterations: 10,
                batch_size: 100,
                compensate: true
            }
        );

        let load = registry.get("concurrent").unwrap();
        assert_eq!(load.workload.duration(), Some(Duration::from_secs(2)));
        assert_eq!(load.kind(), WorkloadKind::Load);
    }

    #[test]
    fn test_coverage_gaps() {
        let mut registry = ScenarioRegistry::new();
        registry
            .register(
                ScenarioSpec::read("only sqlite", 1)
                    .with_operation("sqlite", Operation::custom("q")),
            )
            .unwrap();

        let backends = vec![BackendId::from("sqlite"), BackendId::from("document")];
        let gaps: Vec<_> = registry.coverage_gaps(&backends).collect();
        assert_eq!(gaps, vec![("only sqlite", &BackendId::from("document"))]);
    }
}
