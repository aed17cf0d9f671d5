//! Command-line arguments.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use storebench_backends::fixtures::DEFAULT_ROWS;
use storebench_backends::housing::{DOCUMENT, POSTGRES, SQLITE};
use storebench_core::config::{DEFAULT_DEGRADED_THRESHOLD, DEFAULT_REPORT_PATH};
use storebench_core::{DegradedPolicy, HarnessConfig};

/// Backend families the CLI can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// SQLite database file
    Sqlite,
    /// Embedded document store
    Document,
    /// PostgreSQL server (needs the `postgres` feature)
    Postgres,
}

impl BackendKind {
    pub fn id(&self) -> &'static str {
        match self {
            BackendKind::Sqlite => SQLITE,
            BackendKind::Document => DOCUMENT,
            BackendKind::Postgres => POSTGRES,
        }
    }
}

/// Output format for the comparison printed to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON report artifact
    Json,
}

/// storebench command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "storebench")]
#[command(version, about = "Compare data stores on shared latency and throughput scenarios", long_about = None)]
pub struct Args {
    /// Backend to benchmark; repeat for several. Defaults to sqlite and document.
    #[arg(short, long = "backend", value_enum)]
    pub backends: Vec<BackendKind>,

    /// Override the iteration count of every read and write scenario.
    #[arg(short, long)]
    pub iterations: Option<u32>,

    /// Override the duration of every load scenario, in seconds.
    #[arg(long)]
    pub duration_secs: Option<f64>,

    /// Override the worker count of every load scenario.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Where to write the JSON report.
    #[arg(short, long, default_value = DEFAULT_REPORT_PATH)]
    pub output: PathBuf,

    /// Load scenarios from a JSON file instead of the built-in housing set.
    #[arg(long)]
    pub scenarios: Option<PathBuf>,

    /// Failure fraction above which a result is marked degraded.
    #[arg(long, default_value_t = DEFAULT_DEGRADED_THRESHOLD)]
    pub degraded_threshold: f64,

    /// Show degraded results as unavailable in the comparison.
    #[arg(long)]
    pub suppress_degraded: bool,

    /// SQLite database file (default: a scratch file removed on exit).
    #[arg(long)]
    pub sqlite_path: Option<PathBuf>,

    /// Document store directory (default: a scratch directory removed on exit).
    #[arg(long)]
    pub document_path: Option<PathBuf>,

    /// PostgreSQL connection URL. Falls back to DATABASE_URL.
    #[arg(long)]
    pub postgres_url: Option<String>,

    /// Housing records written into empty embedded stores.
    #[arg(long, default_value_t = DEFAULT_ROWS)]
    pub seed_rows: usize,

    /// Never seed the embedded stores.
    #[arg(long)]
    pub no_seed: bool,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,
}

/// Where each store lives and how it is prepared.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub sqlite_path: Option<PathBuf>,
    pub document_path: Option<PathBuf>,
    pub postgres_url: Option<String>,
    /// Rows to seed into empty embedded stores; zero disables seeding.
    pub seed_rows: usize,
}

/// Everything a run needs, resolved from [`Args`].
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub harness: HarnessConfig,
    pub kinds: Vec<BackendKind>,
    pub stores: StoreOptions,
    pub scenarios: Option<PathBuf>,
    pub format: OutputFormat,
}

impl Args {
    /// Convert command-line arguments to a run configuration.
    pub fn into_config(self) -> RunConfig {
        let mut kinds = if self.backends.is_empty() {
            vec![BackendKind::Sqlite, BackendKind::Document]
        } else {
            self.backends
        };
        let mut seen = Vec::with_capacity(kinds.len());
        kinds.retain(|kind| {
            if seen.contains(kind) {
                false
            } else {
                seen.push(*kind);
                true
            }
        });

        let mut harness = HarnessConfig::new(kinds.iter().map(|k| k.id()))
            .with_degraded_threshold(self.degraded_threshold)
            .with_report_path(self.output);
        if let Some(iterations) = self.iterations {
            harness = harness.with_iterations(iterations);
        }
        if let Some(secs) = self.duration_secs.filter(|s| s.is_finite() && *s > 0.0) {
            harness = harness.with_load_duration(Duration::from_secs_f64(secs));
        }
        if let Some(workers) = self.concurrency {
            harness = harness.with_concurrency(workers);
        }
        if self.suppress_degraded {
            harness = harness.with_degraded_policy(DegradedPolicy::Suppress);
        }

        let postgres_url = self
            .postgres_url
            .or_else(|| std::env::var("DATABASE_URL").ok());

        RunConfig {
            harness,
            kinds,
            stores: StoreOptions {
                sqlite_path: self.sqlite_path,
                document_path: self.document_path,
                postgres_url,
                seed_rows: if self.no_seed { 0 } else { self.seed_rows },
            },
            scenarios: self.scenarios,
            format: self.format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storebench_core::BackendId;

    fn parse(args: &[&str]) -> RunConfig {
        Args::try_parse_from(std::iter::once("storebench").chain(args.iter().copied()))
            .unwrap()
            .into_config()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.kinds, vec![BackendKind::Sqlite, BackendKind::Document]);
        assert_eq!(
            config.harness.backends,
            vec![BackendId::from(SQLITE), BackendId::from(DOCUMENT)]
        );
        assert_eq!(config.harness.report_path, PathBuf::from(DEFAULT_REPORT_PATH));
        assert_eq!(config.harness.degraded_policy, DegradedPolicy::Include);
        assert!(config.harness.iterations.is_none());
        assert_eq!(config.stores.seed_rows, DEFAULT_ROWS);
        assert_eq!(config.format, OutputFormat::Table);
    }

    #[test]
    fn test_overrides() {
        let config = parse(&[
            "--backend",
            "postgres",
            "--backend",
            "sqlite",
            "--backend",
            "postgres",
            "--iterations",
            "10",
            "--duration-secs",
            "0.5",
            "--concurrency",
            "8",
            "--output",
            "out.json",
            "--suppress-degraded",
            "--degraded-threshold",
            "0.25",
            "--no-seed",
            "--format",
            "json",
            "--postgres-url",
            "postgres://localhost/bench",
        ]);

        assert_eq!(config.kinds, vec![BackendKind::Postgres, BackendKind::Sqlite]);
        assert_eq!(config.harness.iterations, Some(10));
        assert_eq!(config.harness.load_duration, Some(Duration::from_millis(500)));
        assert_eq!(config.harness.concurrency, Some(8));
        assert_eq!(config.harness.report_path, PathBuf::from("out.json"));
        assert_eq!(config.harness.degraded_policy, DegradedPolicy::Suppress);
        assert_eq!(config.harness.degraded_threshold, 0.25);
        assert_eq!(config.stores.seed_rows, 0);
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(
            config.stores.postgres_url.as_deref(),
            Some("postgres://localhost/bench")
        );
    }

    #[test]
    fn test_non_positive_duration_ignored() {
        let config = parse(&["--duration-secs", "0"]);
        assert!(config.harness.load_duration.is_none());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(Args::try_parse_from(["storebench", "--backend", "mongo"]).is_err());
    }
}
