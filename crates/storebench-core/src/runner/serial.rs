//! Serial runner.

use std::time::Instant;

use crate::backend::{Backend, Operation};
use crate::metrics::LatencySample;

/// Raw outcome of a serial run.
#[derive(Debug, Clone, Default)]
pub struct SerialRun {
    /// One entry per successful call (or write cycle), in execution order.
    pub sample: LatencySample,
    /// Calls that failed and were left out of the sample.
    pub failures: u64,
    /// Calls attempted; always `sample.len() + failures`.
    pub attempts: u64,
}

impl SerialRun {
    /// Fraction of attempted calls that failed.
    pub fn failure_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.failures as f64 / self.attempts as f64
    }
}

/// Execute `operation` exactly `iterations` times, one after another.
///
/// With `compensate` set, each iteration is a write followed by the backend's
/// compensating undo, and the pair is timed as one cycle. A cycle whose write
/// or compensation fails counts as a failure and has no latency.
pub fn run_serial(
    backend: &mut dyn Backend,
    operation: &Operation,
    iterations: u32,
    compensate: bool,
) -> SerialRun {
    let mut run = SerialRun {
        sample: LatencySample::with_capacity(iterations as usize),
        failures: 0,
        attempts: 0,
    };

    for iteration in 0..iterations {
        run.attempts += 1;

        let outcome = if compensate {
            let start = Instant::now();
            backend
                .execute(operation)
                .and_then(|written| backend.compensate(operation, &written))
                .map(|()| start.elapsed())
        } else {
            backend.execute_timed(operation).map(|(_, elapsed)| elapsed)
        };

        match outcome {
            Ok(elapsed) => run.sample.record(elapsed),
            Err(e) => {
                run.failures += 1;
                tracing::debug!(
                    backend = %backend.id(),
                    iteration,
                    error = %e,
                    "operation failed"
                );
            }
        }
    }

    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Connector, ResultSet};
    use crate::testing::SimulatedConnector;
    use std::time::Duration;

    #[test]
    fn test_sample_length_matches_iterations() {
        let connector = SimulatedConnector::new("sim");
        let mut backend = connector.connect().unwrap();
        let run = run_serial(backend.as_mut(), &Operation::custom("read"), 250, false);

        assert_eq!(run.sample.len(), 250);
        assert_eq!(run.attempts, 250);
        assert_eq!(run.failures, 0);
        assert_eq!(run.failure_rate(), 0.0);
    }

    #[test]
    fn test_failures_excluded_from_sample() {
        let connector = SimulatedConnector::new("sim").with_failure_every(4);
        let mut backend = connector.connect().unwrap();
        let run = run_serial(backend.as_mut(), &Operation::custom("read"), 100, false);

        assert_eq!(run.failures, 25);
        assert_eq!(run.sample.len(), 75);
        assert_eq!(run.attempts, 100);
        assert!((run.failure_rate() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_write_cycle_is_compensated() {
        let connector = SimulatedConnector::new("sim");
        let mut backend = connector.connect().unwrap();
        let before = connector.record_count();

        let run = run_serial(backend.as_mut(), &Operation::custom("insert"), 40, true);

        assert_eq!(run.sample.len(), 40);
        assert_eq!(connector.record_count(), before);
    }

    #[test]
    fn test_write_without_compensation_accumulates() {
        let connector = SimulatedConnector::new("sim");
        let mut backend = connector.connect().unwrap();

        run_serial(backend.as_mut(), &Operation::custom("insert"), 5, false);

        assert_eq!(connector.record_count(), 5);
    }

    #[test]
    fn test_failed_compensation_is_a_failure() {
        let connector = SimulatedConnector::new("sim").with_compensation_failure_every(3);
        let mut backend = connector.connect().unwrap();

        let run = run_serial(backend.as_mut(), &Operation::custom("insert"), 30, true);

        assert_eq!(run.failures, 10);
        assert_eq!(run.sample.len(), 20);
        // Records whose undo failed stay behind.
        assert_eq!(connector.record_count(), 10);
    }

    #[test]
    fn test_uncompensable_write_fails_every_cycle() {
        let connector = SimulatedConnector::new("sim");
        let mut backend = connector.connect().unwrap();

        let run = run_serial(backend.as_mut(), &Operation::custom("read"), 8, true);

        assert_eq!(run.failures, 8);
        assert!(run.sample.is_empty());
    }

    #[test]
    fn test_cycle_timing_includes_compensation() {
        struct SlowUndo {
            id: crate::backend::BackendId,
        }

        impl Backend for SlowUndo {
            fn id(&self) -> &crate::backend::BackendId {
                &self.id
            }

            fn execute(&mut self, _: &Operation) -> Result<ResultSet, crate::OperationError> {
                Ok(ResultSet::rows(1))
            }

            fn compensate(
                &mut self,
                _: &Operation,
                _: &ResultSet,
            ) -> Result<(), crate::OperationError> {
                std::thread::sleep(Duration::from_millis(3));
                Ok(())
            }
        }

        let mut backend = SlowUndo { id: "slow".into() };
        let run = run_serial(&mut backend, &Operation::custom("insert"), 5, true);

        assert_eq!(run.sample.len(), 5);
        assert!(run.sample.as_millis().iter().all(|&ms| ms >= 3.0));
    }
}
