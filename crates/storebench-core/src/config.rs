//! Harness configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::backend::BackendId;
use crate::scenario::{ScenarioSpec, Workload};

/// Default fraction of failed calls above which a result is degraded.
pub const DEFAULT_DEGRADED_THRESHOLD: f64 = 0.1;

/// Default path of the serialized report artifact.
pub const DEFAULT_REPORT_PATH: &str = "performance_results.json";

/// How degraded results appear in comparison rows.
///
/// Raw results always keep the measurement; this only affects the rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedPolicy {
    /// Show the metric, tagged as degraded.
    #[default]
    Include,
    /// Replace the metric with an "unavailable (degraded)" marker.
    Suppress,
}

/// Harness configuration.
#[derive(Debug, Clone, Serialize)]
pub struct HarnessConfig {
    /// Overrides the iteration count of every read and write scenario.
    pub iterations: Option<u32>,

    /// Overrides the duration of every load scenario.
    pub load_duration: Option<Duration>,

    /// Overrides the worker count of every load scenario.
    pub concurrency: Option<usize>,

    /// Backends under test, in report column order.
    pub backends: Vec<BackendId>,

    /// Failure fraction above which a result is marked degraded.
    pub degraded_threshold: f64,

    /// Whether degraded results show up in comparison rows.
    pub degraded_policy: DegradedPolicy,

    /// Where the serialized report is written.
    pub report_path: PathBuf,
}

impl HarnessConfig {
    /// Create a configuration for the given backends.
    pub fn new<I, B>(backends: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<BackendId>,
    {
        Self {
            iterations: None,
            load_duration: None,
            concurrency: None,
            backends: backends.into_iter().map(Into::into).collect(),
            degraded_threshold: DEFAULT_DEGRADED_THRESHOLD,
            degraded_policy: DegradedPolicy::default(),
            report_path: PathBuf::from(DEFAULT_REPORT_PATH),
        }
    }

    /// Set the iteration count for serial scenarios.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = Some(iterations.max(1));
        self
    }

    /// Set the duration of load scenarios.
    pub fn with_load_duration(mut self, duration: Duration) -> Self {
        self.load_duration = Some(duration);
        self
    }

    /// Set the worker count of load scenarios.
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = Some(workers.max(1));
        self
    }

    /// Set the degraded failure threshold (clamped to `0.0..=1.0`).
    pub fn with_degraded_threshold(mut self, threshold: f64) -> Self {
        self.degraded_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set how degraded results appear in comparison rows.
    pub fn with_degraded_policy(mut self, policy: DegradedPolicy) -> Self {
        self.degraded_policy = policy;
        self
    }

    /// Set the report artifact path.
    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = path.into();
        self
    }

    /// Apply the configured overrides to a scenario.
    pub fn effective_workload(&self, spec: &ScenarioSpec) -> Workload {
        match spec.workload.clone() {
            Workload::Read { iterations } => Workload::Read {
                iterations: self.iterations.unwrap_or(iterations),
            },
            Workload::Write {
                iterations,
                batch_size,
                compensate,
            } => Workload::Write {
                iterations: self.iterations.unwrap_or(iterations),
                batch_size,
                compensate,
            },
            Workload::Load {
                duration_ms,
                concurrency,
            } => Workload::Load {
                duration_ms: self
                    .load_duration
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(duration_ms)
                    .max(1),
                concurrency: self.concurrency.unwrap_or(concurrency),
            },
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::new(Vec::<BackendId>::new())
    }
}
