//! Storebench Core - cross-backend latency and throughput harness.
//!
//! Runs the same named scenarios against structurally different data stores
//! and merges the measurements into one comparison report.
//!
//! # Components
//!
//! - **Backend adapter** ([`backend`]): executes one opaque operation descriptor
//! - **Scenario registry** ([`scenario`]): named, backend-parameterized cases
//! - **Runners** ([`runner`]): serial latency sampling and concurrent load
//! - **Metrics** ([`metrics`]): mean, median, p95 and QPS over a latency sample
//! - **Report** ([`report`]): comparison rows, table rendering, JSON artifact
//! - **Run** ([`run`]): per-run orchestration with failure isolation

pub mod backend;
pub mod config;
pub mod error;
pub mod metrics;
pub mod report;
pub mod run;
pub mod runner;
pub mod scenario;
pub mod testing;

pub use backend::{
    Backend, BackendId, Capabilities, Connector, DocumentOperation, Operation, RecordKey,
    ResultSet, SqlOperation, SqlValue, UnreachableConnector,
};
pub use config::{DegradedPolicy, HarnessConfig};
pub use error::{ConnectionError, EmptySampleError, OperationError, RunError, ScenarioError};
pub use metrics::{summarize, LatencySample, LatencySummary};
pub use report::{
    Cell, ComparisonReport, ComparisonRow, ReportBuilder, ResultStatus, ResultStore,
    ScenarioResult, Throughput, Unavailable,
};
pub use run::Harness;
pub use runner::{run_load, run_serial, LoadRun, SerialRun};
pub use scenario::{ScenarioRegistry, ScenarioSpec, Workload, WorkloadKind};
