//! Backend adapter boundary.
//!
//! A [`Connector`] opens [`Backend`] handles; a handle executes opaque
//! [`Operation`] descriptors. Runners only ever talk to these two traits, so a
//! new kind of store is added by implementing them, never by touching a
//! runner.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{ConnectionError, OperationError};
use crate::scenario::WorkloadKind;

/// Stable identifier of a configured backend (e.g. `sqlite`, `document`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(String);

impl BackendId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BackendId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Operation descriptor handed through the harness untouched.
///
/// Each adapter interprets the variants it understands and rejects the rest
/// with [`OperationError::UnsupportedDescriptor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Parameterized SQL statement for relational stores.
    Sql(SqlOperation),
    /// Filter or pipeline document for document-oriented stores.
    Document(DocumentOperation),
    /// Free-form descriptor for adapters outside the built-in families.
    Custom {
        name: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

impl Operation {
    /// Short descriptor family name, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Operation::Sql(_) => "sql",
            Operation::Document(_) => "document",
            Operation::Custom { .. } => "custom",
        }
    }

    pub fn custom(name: impl Into<String>) -> Self {
        Operation::Custom {
            name: name.into(),
            payload: serde_json::Value::Null,
        }
    }
}

/// A parameterized SQL statement.
///
/// Parameters are positional and written `$1`, `$2`, ... which both SQLite
/// and PostgreSQL accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlOperation {
    pub statement: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<SqlValue>,
    /// Statement undoing a write; `$1` is bound to the key of the inserted row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensate: Option<String>,
}

impl SqlOperation {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            params: Vec::new(),
            compensate: None,
        }
    }

    pub fn with_params(mut self, params: Vec<SqlValue>) -> Self {
        self.params = params;
        self
    }

    pub fn with_compensation(mut self, statement: impl Into<String>) -> Self {
        self.compensate = Some(statement.into());
        self
    }
}

/// Scalar SQL parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

/// Operation against a document collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DocumentOperation {
    /// Return every document matching a filter document.
    Find {
        collection: String,
        #[serde(default)]
        filter: serde_json::Value,
    },
    /// Run an aggregation pipeline (`$match`, `$group`, `$limit` stages).
    Aggregate {
        collection: String,
        pipeline: Vec<serde_json::Value>,
    },
    /// Insert one document; compensated by deleting it again.
    InsertOne {
        collection: String,
        document: serde_json::Value,
    },
}

/// Key of a record written by an adapter, used to compensate the write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Int(i64),
    Bytes(Vec<u8>),
}

/// What an execution produced.
///
/// Only the shape matters to the harness; result contents are never checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    /// Rows or documents returned (reads) or affected (writes).
    pub rows: u64,
    /// Key of the record a write created, if any.
    pub inserted: Option<RecordKey>,
}

impl ResultSet {
    pub fn rows(rows: u64) -> Self {
        Self {
            rows,
            inserted: None,
        }
    }

    pub fn inserted(key: RecordKey) -> Self {
        Self {
            rows: 1,
            inserted: Some(key),
        }
    }
}

/// Operation families a backend can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub read: bool,
    pub write: bool,
}

impl Capabilities {
    pub const READ_WRITE: Capabilities = Capabilities {
        read: true,
        write: true,
    };

    pub const READ_ONLY: Capabilities = Capabilities {
        read: true,
        write: false,
    };

    /// Check whether a workload of this kind may run on the backend.
    pub fn allows(&self, kind: WorkloadKind) -> bool {
        match kind {
            WorkloadKind::Read | WorkloadKind::Load => self.read,
            WorkloadKind::Write => self.write,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::READ_WRITE
    }
}

/// An open, reusable session to one data store.
///
/// Owned by exactly one runner. Dropping the handle releases the session, so
/// every exit path (including errors and panics) closes it.
pub trait Backend {
    /// Identifier of the backend this handle belongs to.
    fn id(&self) -> &BackendId;

    fn capabilities(&self) -> Capabilities {
        Capabilities::READ_WRITE
    }

    /// Execute one operation, blocking until the store responds.
    fn execute(&mut self, operation: &Operation) -> Result<ResultSet, OperationError>;

    /// Undo a write previously performed by [`Backend::execute`].
    ///
    /// Must fail when the write cannot be undone, so a cycle that leaves its
    /// record behind is counted as a failure.
    fn compensate(
        &mut self,
        operation: &Operation,
        _written: &ResultSet,
    ) -> Result<(), OperationError> {
        Err(OperationError::Compensation(format!(
            "backend '{}' cannot undo {} operations",
            self.id(),
            operation.kind_name()
        )))
    }

    /// Execute one operation and measure it with the monotonic clock.
    fn execute_timed(
        &mut self,
        operation: &Operation,
    ) -> Result<(ResultSet, Duration), OperationError> {
        let start = Instant::now();
        let result = self.execute(operation)?;
        Ok((result, start.elapsed()))
    }
}

/// Opens handles to one backend.
///
/// Shared by reference across load workers, each of which opens its own
/// handle.
pub trait Connector: Send + Sync {
    fn id(&self) -> &BackendId;

    fn connect(&self) -> Result<Box<dyn Backend>, ConnectionError>;
}

/// Connector for a backend whose setup already failed.
///
/// Lets the caller keep the backend in the run so that every report cell for
/// it reads "unavailable" instead of silently disappearing.
#[derive(Debug, Clone)]
pub struct UnreachableConnector {
    id: BackendId,
    reason: String,
}

impl UnreachableConnector {
    pub fn new(id: impl Into<BackendId>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

impl Connector for UnreachableConnector {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn connect(&self) -> Result<Box<dyn Backend>, ConnectionError> {
        Err(ConnectionError::new(self.id.clone(), self.reason.clone()))
    }
}
