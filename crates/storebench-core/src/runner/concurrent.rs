//! Concurrent load runner.

use std::thread;
use std::time::{Duration, Instant};

use crate::backend::{Connector, Operation};
use crate::error::ConnectionError;
use crate::metrics::load_qps;

/// Per-worker counters, read only after the worker has joined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerTally {
    pub completions: u64,
    pub failures: u64,
}

/// How one load worker ended.
#[derive(Debug, Clone)]
pub enum WorkerOutcome {
    /// Ran until the deadline.
    Finished(WorkerTally),
    /// Could not open its own handle; contributed nothing.
    ConnectFailed(ConnectionError),
    /// The worker thread could not be started or panicked.
    Aborted(String),
}

/// Aggregate outcome of a load run.
#[derive(Debug, Clone)]
pub struct LoadRun {
    /// Workers requested.
    pub concurrency: usize,
    /// Nominal duration every worker ran against.
    pub duration: Duration,
    /// Observed wall-clock window, pool start to last join.
    pub window: Duration,
    pub outcomes: Vec<WorkerOutcome>,
}

impl LoadRun {
    /// Successful executions summed over all finished workers.
    pub fn completions(&self) -> u64 {
        self.tallies().map(|t| t.completions).sum()
    }

    /// Failed executions summed over all finished workers.
    pub fn failures(&self) -> u64 {
        self.tallies().map(|t| t.failures).sum()
    }

    /// Workers that ran to the deadline.
    pub fn workers_finished(&self) -> usize {
        self.tallies().count()
    }

    /// `completions / observed window`.
    pub fn concurrent_qps(&self) -> f64 {
        load_qps(self.completions(), self.window)
    }

    /// Fraction of failed calls among attempted ones.
    pub fn failure_rate(&self) -> f64 {
        let attempts = self.completions() + self.failures();
        if attempts == 0 {
            return 0.0;
        }
        self.failures() as f64 / attempts as f64
    }

    fn tallies(&self) -> impl Iterator<Item = &WorkerTally> {
        self.outcomes.iter().filter_map(|o| match o {
            WorkerOutcome::Finished(tally) => Some(tally),
            _ => None,
        })
    }
}

/// Drive `operation` from `concurrency` OS threads until `duration` elapses.
///
/// Every worker opens and drops its own handle. Workers check the shared
/// deadline between operations only, so an in-flight call always completes.
/// Counts are summed after all workers have joined.
///
/// Fails only when no worker managed to connect.
pub fn run_load(
    connector: &dyn Connector,
    operation: &Operation,
    duration: Duration,
    concurrency: usize,
) -> Result<LoadRun, ConnectionError> {
    let concurrency = concurrency.max(1);
    let start = Instant::now();
    let deadline = start + duration;

    let outcomes: Vec<WorkerOutcome> = thread::scope(|scope| {
        let handles: Vec<_> = (0..concurrency)
            .map(|worker| {
                thread::Builder::new()
                    .name(format!("load-{}-{}", connector.id(), worker))
                    .spawn_scoped(scope, move || run_worker(connector, operation, deadline, worker))
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle {
                Ok(handle) => handle
                    .join()
                    .unwrap_or_else(|_| WorkerOutcome::Aborted("worker panicked".to_string())),
                Err(e) => WorkerOutcome::Aborted(format!("failed to spawn worker: {}", e)),
            })
            .collect()
    });

    let window = start.elapsed();

    let run = LoadRun {
        concurrency,
        duration,
        window,
        outcomes,
    };

    if run.workers_finished() == 0 {
        let cause = run
            .outcomes
            .iter()
            .find_map(|o| match o {
                WorkerOutcome::ConnectFailed(e) => Some(e.clone()),
                _ => None,
            })
            .unwrap_or_else(|| {
                ConnectionError::new(connector.id().clone(), "no load worker could start")
            });
        return Err(cause);
    }

    Ok(run)
}

fn run_worker(
    connector: &dyn Connector,
    operation: &Operation,
    deadline: Instant,
    worker: usize,
) -> WorkerOutcome {
    let mut backend = match connector.connect() {
        Ok(backend) => backend,
        Err(e) => {
            tracing::warn!(backend = %connector.id(), worker, error = %e, "load worker failed to connect");
            return WorkerOutcome::ConnectFailed(e);
        }
    };

    let mut tally = WorkerTally::default();
    while Instant::now() < deadline {
        match backend.execute(operation) {
            Ok(_) => tally.completions += 1,
            Err(e) => {
                tally.failures += 1;
                tracing::debug!(backend = %connector.id(), worker, error = %e, "load operation failed");
            }
        }
    }

    WorkerOutcome::Finished(tally)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimulatedConnector;

    #[test]
    fn test_qps_matches_counts_and_window() {
        let connector = SimulatedConnector::new("sim").with_latency(Duration::from_millis(1));
        let duration = Duration::from_millis(200);
        let run = run_load(&connector, &Operation::custom("read"), duration, 4).unwrap();

        assert_eq!(run.workers_finished(), 4);
        assert!(run.window >= duration);
        assert!(run.completions() > 0);
        let expected = run.completions() as f64 / run.window.as_secs_f64();
        assert!((run.concurrent_qps() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_every_worker_opens_and_releases_a_handle() {
        let connector = SimulatedConnector::new("sim").with_latency(Duration::from_millis(1));
        run_load(&connector, &Operation::custom("read"), Duration::from_millis(50), 6).unwrap();

        assert_eq!(connector.connections_opened(), 6);
        assert_eq!(connector.connections_open(), 0);
    }

    #[test]
    fn test_partial_connect_failure_keeps_other_counts() {
        let connector = SimulatedConnector::new("sim")
            .with_latency(Duration::from_millis(1))
            .with_refused_connections(2);
        let run = run_load(&connector, &Operation::custom("read"), Duration::from_millis(100), 5)
            .unwrap();

        assert_eq!(run.workers_finished(), 3);
        let refused = run
            .outcomes
            .iter()
            .filter(|o| matches!(o, WorkerOutcome::ConnectFailed(_)))
            .count();
        assert_eq!(refused, 2);
        assert!(run.completions() > 0);
        assert!(run.window >= Duration::from_millis(100));
    }

    #[test]
    fn test_all_workers_refused() {
        let connector = SimulatedConnector::new("sim").refusing();
        let err = run_load(&connector, &Operation::custom("read"), Duration::from_millis(20), 3)
            .unwrap_err();
        assert_eq!(err.backend.as_str(), "sim");
    }

    #[test]
    fn test_failed_calls_counted_separately() {
        let connector = SimulatedConnector::new("sim")
            .with_latency(Duration::from_micros(200))
            .with_failure_every(2);
        let run = run_load(&connector, &Operation::custom("read"), Duration::from_millis(50), 2)
            .unwrap();

        assert!(run.failures() > 0);
        assert!(run.completions() > 0);
        assert!(run.failure_rate() > 0.3 && run.failure_rate() < 0.7);
    }

    #[test]
    fn test_in_flight_call_drains_past_deadline() {
        // Each call outlasts the whole duration: a worker that started a call
        // still finishes it, so the window covers the full call time.
        let connector = SimulatedConnector::new("sim").with_latency(Duration::from_millis(80));
        let run = run_load(&connector, &Operation::custom("read"), Duration::from_millis(30), 3)
            .unwrap();

        assert!(run.completions() >= 1 && run.completions() <= 3);
        assert_eq!(run.failures(), 0);
        assert!(run.window >= Duration::from_millis(80));
    }
}
