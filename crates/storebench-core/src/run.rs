//! Run orchestration.
//!
//! A [`Harness`] drives every registered scenario against every configured
//! backend. One backend failing to connect, or one scenario failing outright,
//! only blanks the affected cells; the run itself fails only when no backend
//! could be connected at all.

use std::time::Duration;

use crate::backend::{Backend, BackendId, Connector};
use crate::config::HarnessConfig;
use crate::error::RunError;
use crate::metrics::summarize;
use crate::report::{Cell, ComparisonReport, ReportBuilder, ResultStore, ScenarioResult, Unavailable};
use crate::runner::{run_load, run_serial};
use crate::scenario::{ScenarioRegistry, ScenarioSpec, Workload};

/// Benchmark run over a fixed registry and set of connectors.
pub struct Harness {
    config: HarnessConfig,
    registry: ScenarioRegistry,
    connectors: Vec<Box<dyn Connector>>,
}

impl Harness {
    pub fn new(config: HarnessConfig, registry: ScenarioRegistry) -> Self {
        Self {
            config,
            registry,
            connectors: Vec::new(),
        }
    }

    /// Add a connector. Its id should appear in the configured backends.
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connectors.push(Box::new(connector));
        self
    }

    pub fn add_connector(&mut self, connector: Box<dyn Connector>) {
        self.connectors.push(connector);
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn registry(&self) -> &ScenarioRegistry {
        &self.registry
    }

    /// Backends in report column order, each listed once.
    ///
    /// The configured list wins; without one, connectors are used in the order
    /// they were added.
    fn backends(&self) -> Vec<BackendId> {
        let listed: Vec<&BackendId> = if self.config.backends.is_empty() {
            self.connectors.iter().map(|c| c.id()).collect()
        } else {
            self.config.backends.iter().collect()
        };

        let mut backends: Vec<BackendId> = Vec::with_capacity(listed.len());
        for id in listed {
            if backends.contains(id) {
                tracing::warn!(backend = %id, "backend listed twice, running it once");
            } else {
                backends.push(id.clone());
            }
        }
        backends
    }

    fn connector(&self, id: &BackendId) -> Option<&dyn Connector> {
        self.connectors
            .iter()
            .find(|c| c.id() == id)
            .map(|c| c.as_ref())
    }

    /// Run every scenario on every backend and build the comparison report.
    pub fn run(&self) -> Result<ComparisonReport, RunError> {
        let backends = self.backends();
        let mut results = ResultStore::new();
        let mut connected = 0usize;

        for id in &backends {
            let Some(connector) = self.connector(id) else {
                tracing::warn!(backend = %id, "no connector registered, skipping backend");
                self.fill(&mut results, id, |_| Unavailable::ConnectionFailed {
                    message: "no connector registered".to_string(),
                })?;
                continue;
            };

            let mut primary = match connector.connect() {
                Ok(backend) => backend,
                Err(e) => {
                    tracing::error!(backend = %id, error = %e, "backend unavailable for this run");
                    self.fill(&mut results, id, |_| Unavailable::ConnectionFailed {
                        message: e.message.clone(),
                    })?;
                    continue;
                }
            };
            connected += 1;
            tracing::info!(backend = %id, scenarios = self.registry.len(), "running scenarios");

            for spec in &self.registry {
                let cell = self.run_scenario(connector, primary.as_mut(), spec);
                results.record(id, &spec.name, cell)?;
            }
        }

        if connected == 0 {
            return Err(RunError::NoBackendAvailable {
                attempted: backends.len(),
            });
        }

        let mut config = self.config.clone();
        config.backends = backends;
        Ok(ReportBuilder::new(&config).build(&self.registry, results))
    }

    fn fill(
        &self,
        results: &mut ResultStore,
        id: &BackendId,
        reason: impl Fn(&ScenarioSpec) -> Unavailable,
    ) -> Result<(), RunError> {
        for spec in &self.registry {
            results.record(id, &spec.name, Cell::unavailable(reason(spec)))?;
        }
        Ok(())
    }

    fn run_scenario(
        &self,
        connector: &dyn Connector,
        backend: &mut dyn Backend,
        spec: &ScenarioSpec,
    ) -> Cell {
        let id = connector.id();
        let Some(operation) = spec.operation_for(id) else {
            tracing::debug!(backend = %id, scenario = %spec.name, "no operation for backend");
            return Cell::unavailable(Unavailable::MissingOperation);
        };

        if !backend.capabilities().allows(spec.kind()) {
            tracing::debug!(backend = %id, scenario = %spec.name, "workload not supported");
            return Cell::unavailable(Unavailable::Unsupported);
        }

        let threshold = self.config.degraded_threshold;

        let (iterations, batch_size, compensate) = match self.config.effective_workload(spec) {
            Workload::Read { iterations } => (iterations, None, false),
            Workload::Write {
                iterations,
                batch_size,
                compensate,
            } => (iterations, Some(batch_size), compensate),
            Workload::Load {
                duration_ms,
                concurrency,
            } => {
                let duration = Duration::from_millis(duration_ms);
                return match run_load(connector, operation, duration, concurrency) {
                    Ok(run) if run.completions() == 0 && run.failures() > 0 => {
                        Cell::unavailable(Unavailable::NoSuccessfulCalls {
                            failures: run.failures(),
                        })
                    }
                    Ok(run) => {
                        let result = ScenarioResult::load(&run, threshold);
                        tracing::info!(
                            backend = %id,
                            scenario = %spec.name,
                            workers = run.workers_finished(),
                            completions = run.completions(),
                            concurrent_qps = run.concurrent_qps(),
                            "load scenario complete"
                        );
                        Cell::Measured(result)
                    }
                    Err(e) => {
                        tracing::warn!(backend = %id, scenario = %spec.name, error = %e, "load scenario failed");
                        Cell::unavailable(Unavailable::ConnectionFailed { message: e.message })
                    }
                };
            }
        };

        let run = run_serial(backend, operation, iterations, compensate);
        let summary = match summarize(&run.sample) {
            Ok(summary) => summary,
            Err(_) => {
                tracing::warn!(
                    backend = %id,
                    scenario = %spec.name,
                    failures = run.failures,
                    "every call failed"
                );
                return Cell::unavailable(Unavailable::NoSuccessfulCalls {
                    failures: run.failures,
                });
            }
        };

        let result = match batch_size {
            Some(batch) => ScenarioResult::write(&run, &summary, batch, threshold),
            None => ScenarioResult::read(&run, &summary, threshold),
        };

        tracing::info!(
            backend = %id,
            scenario = %spec.name,
            avg_ms = summary.avg_ms,
            p95_ms = summary.p95_ms,
            throughput = result.throughput.value(),
            failures = run.failures,
            "scenario complete"
        );
        if result.is_degraded() {
            tracing::warn!(
                backend = %id,
                scenario = %spec.name,
                failure_rate = run.failure_rate(),
                "result degraded"
            );
        }

        Cell::Measured(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Capabilities, Operation};
    use crate::report::Throughput;
    use crate::testing::{SimulatedConnector, INSERT};

    fn registry() -> ScenarioRegistry {
        let mut registry = ScenarioRegistry::new();
        registry
            .register(ScenarioSpec::read("read", 20).with_operation("sim", Operation::custom("read")))
            .unwrap();
        registry
            .register(
                ScenarioSpec::write("write", 10, 100)
                    .with_operation("sim", Operation::custom(INSERT)),
            )
            .unwrap();
        registry
            .register(ScenarioSpec::read("other-only", 5).with_operation("other", Operation::custom("read")))
            .unwrap();
        registry
    }

    #[test]
    fn test_missing_operation_is_marked() {
        let harness = Harness::new(HarnessConfig::new(["sim"]), registry())
            .with_connector(SimulatedConnector::new("sim"));
        let report = harness.run().unwrap();

        assert_eq!(
            report.row("other-only").unwrap().cell(&"sim".into()),
            Some(&Cell::unavailable(Unavailable::MissingOperation))
        );
        let read = report.row("read").unwrap().cell(&"sim".into()).unwrap();
        assert_eq!(read.result().unwrap().iteration_count, 20);
        let write = report.row("write").unwrap().cell(&"sim".into()).unwrap();
        assert!(matches!(
            write.result().unwrap().throughput,
            Throughput::ThroughputPerSec(_)
        ));
    }

    #[test]
    fn test_read_only_backend_skips_writes() {
        let connector = SimulatedConnector::new("sim").with_capabilities(Capabilities::READ_ONLY);
        let harness =
            Harness::new(HarnessConfig::new(["sim"]), registry()).with_connector(connector.clone());
        let report = harness.run().unwrap();

        assert_eq!(
            report.row("write").unwrap().cell(&"sim".into()),
            Some(&Cell::unavailable(Unavailable::Unsupported))
        );
        assert_eq!(connector.record_count(), 0);
    }

    #[test]
    fn test_no_backend_available() {
        let harness = Harness::new(HarnessConfig::new(["sim"]), registry())
            .with_connector(SimulatedConnector::new("sim").refusing());
        let err = harness.run().unwrap_err();
        assert!(matches!(err, RunError::NoBackendAvailable { attempted: 1 }));
    }

    #[test]
    fn test_backend_without_connector() {
        let harness = Harness::new(HarnessConfig::new(["sim", "ghost"]), registry())
            .with_connector(SimulatedConnector::new("sim"));
        let report = harness.run().unwrap();

        let row = report.row("read").unwrap();
        assert!(matches!(
            row.cell(&"ghost".into()),
            Some(Cell::Unavailable {
                unavailable: Unavailable::ConnectionFailed { .. }
            })
        ));
    }

    #[test]
    fn test_all_calls_failing() {
        let harness = Harness::new(HarnessConfig::new(["sim"]), registry())
            .with_connector(SimulatedConnector::new("sim").with_failure_every(1));
        let report = harness.run().unwrap();

        assert_eq!(
            report.row("read").unwrap().cell(&"sim".into()),
            Some(&Cell::unavailable(Unavailable::NoSuccessfulCalls { failures: 20 }))
        );
    }

    #[test]
    fn test_repeated_backend_runs_once() {
        let sim = SimulatedConnector::new("sim");
        let harness = Harness::new(HarnessConfig::new(["sim", "other", "sim"]), registry())
            .with_connector(sim.clone())
            .with_connector(SimulatedConnector::new("other"));
        let report = harness.run().unwrap();

        assert_eq!(
            report.metadata.backends,
            vec![BackendId::from("sim"), BackendId::from("other")]
        );
        let row = report.row("read").unwrap();
        assert_eq!(row.cells.len(), 2);
        assert!(row.cell(&"sim".into()).unwrap().is_available());
        // read (20) plus write (10), once each
        assert_eq!(sim.calls(), 30);
    }

    #[test]
    fn test_backends_default_to_connector_order() {
        let harness = Harness::new(HarnessConfig::default(), registry())
            .with_connector(SimulatedConnector::new("sim"));
        let report = harness.run().unwrap();
        assert_eq!(report.metadata.backends, vec![BackendId::from("sim")]);
    }
}
