//! Deterministic in-process backend for exercising the harness.
//!
//! [`SimulatedConnector`] hands out handles that sleep for a fixed latency,
//! fail on a fixed schedule, and keep a shared record count so write
//! compensation can be observed.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Backend, BackendId, Capabilities, Connector, Operation, RecordKey, ResultSet};
use crate::error::{ConnectionError, OperationError};

/// Descriptor name treated as a write by simulated handles.
pub const INSERT: &str = "insert";

#[derive(Debug, Default)]
struct SharedState {
    records: AtomicI64,
    next_key: AtomicI64,
    opened: AtomicUsize,
    open: AtomicUsize,
    connect_attempts: AtomicUsize,
    calls: AtomicU64,
}

/// Connector for simulated handles.
///
/// Understands only [`Operation::Custom`]: the name `insert` is a write,
/// anything else is a read.
#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    id: BackendId,
    latency: Duration,
    failure_every: Option<u64>,
    compensation_failure_every: Option<u64>,
    refused_connections: usize,
    capabilities: Capabilities,
    state: Arc<SharedState>,
}

impl SimulatedConnector {
    pub fn new(id: impl Into<BackendId>) -> Self {
        Self {
            id: id.into(),
            latency: Duration::ZERO,
            failure_every: None,
            compensation_failure_every: None,
            refused_connections: 0,
            capabilities: Capabilities::READ_WRITE,
            state: Arc::default(),
        }
    }

    /// Block every call for `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every `n`-th call of each handle.
    pub fn with_failure_every(mut self, n: u64) -> Self {
        self.failure_every = Some(n.max(1));
        self
    }

    /// Fail every `n`-th compensation of each handle, leaving the record.
    pub fn with_compensation_failure_every(mut self, n: u64) -> Self {
        self.compensation_failure_every = Some(n.max(1));
        self
    }

    /// Refuse the first `n` connection attempts.
    pub fn with_refused_connections(mut self, n: usize) -> Self {
        self.refused_connections = n;
        self
    }

    /// Refuse every connection attempt.
    pub fn refusing(self) -> Self {
        self.with_refused_connections(usize::MAX)
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Records currently stored.
    pub fn record_count(&self) -> i64 {
        self.state.records.load(Ordering::SeqCst)
    }

    /// Handles opened over the connector's lifetime.
    pub fn connections_opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// Handles not yet dropped.
    pub fn connections_open(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    /// Calls executed by all handles, including failed ones.
    pub fn calls(&self) -> u64 {
        self.state.calls.load(Ordering::SeqCst)
    }
}

impl Connector for SimulatedConnector {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn connect(&self) -> Result<Box<dyn Backend>, ConnectionError> {
        let attempt = self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.refused_connections {
            return Err(ConnectionError::new(self.id.clone(), "connection refused"));
        }

        self.state.opened.fetch_add(1, Ordering::SeqCst);
        self.state.open.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(SimulatedBackend {
            id: self.id.clone(),
            latency: self.latency,
            failure_every: self.failure_every,
            compensation_failure_every: self.compensation_failure_every,
            capabilities: self.capabilities,
            calls: 0,
            compensations: 0,
            state: Arc::clone(&self.state),
        }))
    }
}

struct SimulatedBackend {
    id: BackendId,
    latency: Duration,
    failure_every: Option<u64>,
    compensation_failure_every: Option<u64>,
    capabilities: Capabilities,
    calls: u64,
    compensations: u64,
    state: Arc<SharedState>,
}

impl Backend for SimulatedBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn execute(&mut self, operation: &Operation) -> Result<ResultSet, OperationError> {
        let name = match operation {
            Operation::Custom { name, .. } => name,
            other => {
                return Err(OperationError::UnsupportedDescriptor {
                    backend: self.id.clone(),
                    kind: other.kind_name(),
                })
            }
        };

        self.calls += 1;
        self.state.calls.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        if let Some(n) = self.failure_every {
            if self.calls % n == 0 {
                return Err(OperationError::Backend(format!(
                    "simulated failure on call {}",
                    self.calls
                )));
            }
        }

        if name == INSERT {
            let key = self.state.next_key.fetch_add(1, Ordering::SeqCst);
            self.state.records.fetch_add(1, Ordering::SeqCst);
            Ok(ResultSet::inserted(RecordKey::Int(key)))
        } else {
            let rows = self.state.records.load(Ordering::SeqCst).max(0) as u64;
            Ok(ResultSet::rows(rows))
        }
    }

    fn compensate(
        &mut self,
        _operation: &Operation,
        written: &ResultSet,
    ) -> Result<(), OperationError> {
        if written.inserted.is_none() {
            return Err(OperationError::Compensation(
                "nothing was written to undo".to_string(),
            ));
        }

        self.compensations += 1;
        if let Some(n) = self.compensation_failure_every {
            if self.compensations % n == 0 {
                return Err(OperationError::Compensation(format!(
                    "simulated undo failure on compensation {}",
                    self.compensations
                )));
            }
        }

        self.state.records.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for SimulatedBackend {
    fn drop(&mut self) {
        self.state.open.fetch_sub(1, Ordering::SeqCst);
    }
}
