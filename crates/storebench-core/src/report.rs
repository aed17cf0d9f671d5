//! Result store and comparison report.
//!
//! Results are keyed backend → scenario and written once per key. The
//! builder joins them by scenario name into rows holding one cell per
//! configured backend, so a missing measurement shows up as an explicit
//! "unavailable" marker rather than a missing row.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use comfy_table::{Cell as TableCell, Table};
use serde::Serialize;

use crate::backend::BackendId;
use crate::config::{DegradedPolicy, HarnessConfig};
use crate::error::RunError;
use crate::metrics::LatencySummary;
use crate::runner::{LoadRun, SerialRun};
use crate::scenario::{ScenarioRegistry, WorkloadKind};

/// The throughput figure of a result; which one depends on the runner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Throughput {
    /// Serial reads: `n / (sum_ms / 1000)`.
    Qps(f64),
    /// Serial write cycles: `1000 / avg_ms * batch_size`.
    ThroughputPerSec(f64),
    /// Load run: completions over the observed window.
    ConcurrentQps(f64),
}

impl Throughput {
    pub fn value(&self) -> f64 {
        match *self {
            Throughput::Qps(v) | Throughput::ThroughputPerSec(v) | Throughput::ConcurrentQps(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Ok,
    /// Failures exceeded the configured fraction of attempts.
    Degraded,
}

/// Metrics of one (backend, scenario) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p95_ms: Option<f64>,
    #[serde(flatten)]
    pub throughput: Throughput,
    /// Successful calls measured.
    pub iteration_count: u64,
    pub failures: u64,
    pub status: ResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_secs: Option<f64>,
}

impl ScenarioResult {
    /// Result of a serial read run.
    pub fn read(run: &SerialRun, summary: &LatencySummary, degraded_threshold: f64) -> Self {
        Self::serial(run, summary, Throughput::Qps(summary.qps()), degraded_threshold)
    }

    /// Result of a serial write run.
    pub fn write(
        run: &SerialRun,
        summary: &LatencySummary,
        batch_size: u32,
        degraded_threshold: f64,
    ) -> Self {
        let throughput = Throughput::ThroughputPerSec(summary.throughput_per_sec(batch_size));
        Self::serial(run, summary, throughput, degraded_threshold)
    }

    fn serial(
        run: &SerialRun,
        summary: &LatencySummary,
        throughput: Throughput,
        degraded_threshold: f64,
    ) -> Self {
        Self {
            avg_ms: Some(summary.avg_ms),
            median_ms: Some(summary.median_ms),
            p95_ms: Some(summary.p95_ms),
            throughput,
            iteration_count: summary.count as u64,
            failures: run.failures,
            status: status_for(run.failure_rate(), degraded_threshold),
            workers: None,
            window_secs: None,
        }
    }

    /// Result of a load run.
    pub fn load(run: &LoadRun, degraded_threshold: f64) -> Self {
        let mut status = status_for(run.failure_rate(), degraded_threshold);
        if run.workers_finished() < run.concurrency {
            let missing = (run.concurrency - run.workers_finished()) as f64 / run.concurrency as f64;
            status = status.max(status_for(missing, degraded_threshold));
        }

        Self {
            avg_ms: None,
            median_ms: None,
            p95_ms: None,
            throughput: Throughput::ConcurrentQps(run.concurrent_qps()),
            iteration_count: run.completions(),
            failures: run.failures(),
            status,
            workers: Some(run.workers_finished()),
            window_secs: Some(run.window.as_secs_f64()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.status == ResultStatus::Degraded
    }
}

impl ResultStatus {
    fn max(self, other: ResultStatus) -> ResultStatus {
        if self == ResultStatus::Degraded || other == ResultStatus::Degraded {
            ResultStatus::Degraded
        } else {
            ResultStatus::Ok
        }
    }
}

fn status_for(failure_rate: f64, threshold: f64) -> ResultStatus {
    if failure_rate > threshold {
        ResultStatus::Degraded
    } else {
        ResultStatus::Ok
    }
}

/// Why a cell holds no metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Unavailable {
    /// The backend could not be connected for this run.
    ConnectionFailed { message: String },
    /// The scenario defines no operation for the backend.
    MissingOperation,
    /// The backend lacks the capability the workload needs.
    Unsupported,
    /// Every call failed, so there was nothing to aggregate.
    NoSuccessfulCalls { failures: u64 },
    /// Degraded result hidden by [`DegradedPolicy::Suppress`].
    Degraded,
    /// No runner produced a result for this cell.
    NotRun,
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unavailable::ConnectionFailed { .. } => write!(f, "connection failed"),
            Unavailable::MissingOperation => write!(f, "no operation"),
            Unavailable::Unsupported => write!(f, "unsupported"),
            Unavailable::NoSuccessfulCalls { failures } => {
                write!(f, "all {} calls failed", failures)
            }
            Unavailable::Degraded => write!(f, "degraded"),
            Unavailable::NotRun => write!(f, "not run"),
        }
    }
}

/// One cell of the result grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Measured(ScenarioResult),
    Unavailable { unavailable: Unavailable },
}

impl Cell {
    pub fn unavailable(reason: Unavailable) -> Self {
        Cell::Unavailable {
            unavailable: reason,
        }
    }

    pub fn result(&self) -> Option<&ScenarioResult> {
        match self {
            Cell::Measured(result) => Some(result),
            Cell::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Cell::Measured(_))
    }
}

/// Per-run results, written once per (backend, scenario) key.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ResultStore {
    cells: BTreeMap<BackendId, BTreeMap<String, Cell>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cell. Fails if the key was already written.
    pub fn record(
        &mut self,
        backend: &BackendId,
        scenario: &str,
        cell: Cell,
    ) -> Result<(), RunError> {
        let scenarios = self.cells.entry(backend.clone()).or_default();
        if scenarios.contains_key(scenario) {
            return Err(RunError::DuplicateResult {
                backend: backend.clone(),
                scenario: scenario.to_string(),
            });
        }
        scenarios.insert(scenario.to_string(), cell);
        Ok(())
    }

    pub fn get(&self, backend: &BackendId, scenario: &str) -> Option<&Cell> {
        self.cells.get(backend).and_then(|s| s.get(scenario))
    }

    pub fn backends(&self) -> impl Iterator<Item = &BackendId> {
        self.cells.keys()
    }
}

/// One backend's cell in a comparison row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowCell {
    pub backend: BackendId,
    pub cell: Cell,
}

/// All backends' figures for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub scenario: String,
    pub kind: WorkloadKind,
    pub cells: Vec<RowCell>,
}

impl ComparisonRow {
    pub fn cell(&self, backend: &BackendId) -> Option<&Cell> {
        self.cells
            .iter()
            .find(|c| &c.backend == backend)
            .map(|c| &c.cell)
    }
}

/// Host the run was measured on.
#[derive(Debug, Clone, Serialize)]
pub struct HostInfo {
    pub os: String,
    pub arch: String,
    pub cpus: usize,
}

impl HostInfo {
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpus: std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(1),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub generated_at: String,
    pub host: HostInfo,
    pub backends: Vec<BackendId>,
    pub degraded_threshold: f64,
    pub degraded_policy: DegradedPolicy,
}

/// Comparison of every scenario across every configured backend.
///
/// Serializes to the report artifact: run metadata plus the full nested
/// backend → scenario → result mapping.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub metadata: ReportMetadata,
    #[serde(skip)]
    pub rows: Vec<ComparisonRow>,
    pub results: ResultStore,
}

impl ComparisonReport {
    pub fn row(&self, scenario: &str) -> Option<&ComparisonRow> {
        self.rows.iter().find(|r| r.scenario == scenario)
    }

    /// Render the comparison as a text table.
    pub fn render_table(&self) -> String {
        let mut table = Table::new();

        let mut header = vec!["Scenario".to_string(), "Metric".to_string()];
        header.extend(self.metadata.backends.iter().map(|b| b.to_string()));
        table.set_header(header);

        for row in &self.rows {
            let mut cells = vec![
                TableCell::new(&row.scenario),
                TableCell::new(metric_label(row.kind)),
            ];
            cells.extend(row.cells.iter().map(|c| TableCell::new(format_cell(&c.cell))));
            table.add_row(cells);
        }

        table.to_string()
    }

    /// Serialize the report artifact.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the report artifact to `path`.
    pub fn write_artifact(&self, path: impl AsRef<Path>) -> Result<(), RunError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

fn metric_label(kind: WorkloadKind) -> &'static str {
    match kind {
        WorkloadKind::Read => "QPS / delay",
        WorkloadKind::Write => "insertions per second",
        WorkloadKind::Load => "concurrent QPS",
    }
}

fn format_cell(cell: &Cell) -> String {
    let result = match cell {
        Cell::Measured(result) => result,
        Cell::Unavailable { unavailable } => return format!("N/A ({})", unavailable),
    };

    let mut text = match result.throughput {
        Throughput::Qps(qps) => format!(
            "{:.2} qps, avg {:.2} ms, p95 {:.2} ms",
            qps,
            result.avg_ms.unwrap_or_default(),
            result.p95_ms.unwrap_or_default()
        ),
        Throughput::ThroughputPerSec(per_sec) => format!(
            "{:.2}/s, avg {:.2} ms",
            per_sec,
            result.avg_ms.unwrap_or_default()
        ),
        Throughput::ConcurrentQps(qps) => format!("{:.2} qps", qps),
    };

    if result.is_degraded() {
        text.push_str(&format!(" [degraded: {} failed]", result.failures));
    }
    text
}

/// Joins a [`ResultStore`] into comparison rows.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    backends: Vec<BackendId>,
    degraded_threshold: f64,
    degraded_policy: DegradedPolicy,
}

impl ReportBuilder {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            backends: config.backends.clone(),
            degraded_threshold: config.degraded_threshold,
            degraded_policy: config.degraded_policy,
        }
    }

    /// Build the report: one row per scenario, one cell per backend.
    pub fn build(&self, registry: &ScenarioRegistry, results: ResultStore) -> ComparisonReport {
        let rows = registry
            .iter()
            .map(|spec| ComparisonRow {
                scenario: spec.name.clone(),
                kind: spec.kind(),
                cells: self
                    .backends
                    .iter()
                    .map(|backend| RowCell {
                        backend: backend.clone(),
                        cell: self.row_cell(results.get(backend, &spec.name)),
                    })
                    .collect(),
            })
            .collect();

        ComparisonReport {
            metadata: ReportMetadata {
                generated_at: chrono::Utc::now().to_rfc3339(),
                host: HostInfo::collect(),
                backends: self.backends.clone(),
                degraded_threshold: self.degraded_threshold,
                degraded_policy: self.degraded_policy,
            },
            rows,
            results,
        }
    }

    fn row_cell(&self, cell: Option<&Cell>) -> Cell {
        match cell {
            None => Cell::unavailable(Unavailable::NotRun),
            Some(Cell::Measured(result))
                if result.is_degraded() && self.degraded_policy == DegradedPolicy::Suppress =>
            {
                Cell::unavailable(Unavailable::Degraded)
            }
            Some(cell) => cell.clone(),
        }
    }
}
