//! PostgreSQL backend.
//!
//! Requires a running PostgreSQL server with a populated `properties` table.
//! Enable with `--features postgres`.
//!
//! Each handle owns one `PgConnection` and a current-thread Tokio runtime to
//! drive it, so the blocking [`Backend`] interface maps onto `block_on`.

use std::time::Duration;

use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Connection, Row};
use storebench_core::{
    Backend, BackendId, ConnectionError, Connector, Operation, OperationError, RecordKey,
    ResultSet, SqlOperation, SqlValue,
};
use tokio::runtime::{Builder, Runtime};

use crate::error::Result;
use crate::housing::POSTGRES;

/// Default limit on a single statement round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens one PostgreSQL connection per handle.
pub struct PostgresConnector {
    id: BackendId,
    url: String,
    timeout: Duration,
}

impl PostgresConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: BackendId::from(POSTGRES),
            url: url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create from the `DATABASE_URL` environment variable.
    pub fn from_env() -> Option<Self> {
        std::env::var("DATABASE_URL").ok().map(Self::new)
    }

    pub fn with_id(mut self, id: impl Into<BackendId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the connect and per-statement timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Rows in `properties`; fails if the server or the table is missing.
    pub fn row_count(&self) -> Result<u64> {
        let rt = runtime()?;
        let count: i64 = rt.block_on(async {
            let mut conn = PgConnection::connect(&self.url).await?;
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM properties")
                .fetch_one(&mut conn)
                .await?;
            conn.close().await?;
            Ok::<_, sqlx::Error>(count)
        })?;
        Ok(count.max(0) as u64)
    }
}

impl Connector for PostgresConnector {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn connect(&self) -> std::result::Result<Box<dyn Backend>, ConnectionError> {
        let fail = |message: String| ConnectionError::new(self.id.clone(), message);

        let rt = runtime().map_err(|e| fail(e.to_string()))?;
        let conn = rt
            .block_on(async {
                tokio::time::timeout(self.timeout, PgConnection::connect(&self.url)).await
            })
            .map_err(|_| fail(format!("connect timed out after {:?}", self.timeout)))?
            .map_err(|e| fail(e.to_string()))?;

        Ok(Box::new(PostgresBackend {
            id: self.id.clone(),
            timeout: self.timeout,
            rt,
            conn,
        }))
    }
}

fn runtime() -> std::io::Result<Runtime> {
    Builder::new_current_thread().enable_all().build()
}

/// One PostgreSQL connection.
pub struct PostgresBackend {
    id: BackendId,
    timeout: Duration,
    // Dropped before the runtime that drives it.
    conn: PgConnection,
    rt: Runtime,
}

impl PostgresBackend {
    fn run(
        &mut self,
        statement: &str,
        params: &[SqlValue],
    ) -> std::result::Result<Vec<PgRow>, OperationError> {
        let mut query = sqlx::query(statement);
        for param in params {
            query = match param {
                SqlValue::Null => query.bind(None::<i64>),
                SqlValue::Bool(b) => query.bind(*b),
                SqlValue::Int(i) => query.bind(*i),
                SqlValue::Float(f) => query.bind(*f),
                SqlValue::Text(s) => query.bind(s.clone()),
            };
        }

        let Self {
            rt, conn, timeout, ..
        } = self;
        let timeout = *timeout;

        rt.block_on(async move { tokio::time::timeout(timeout, query.fetch_all(conn)).await })
            .map_err(|_| OperationError::Timeout(timeout))?
            .map_err(|e| OperationError::Backend(e.to_string()))
    }
}

impl Backend for PostgresBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn execute(&mut self, operation: &Operation) -> std::result::Result<ResultSet, OperationError> {
        let op = sql_operation(&self.id, operation)?;
        let rows = self.run(&op.statement, &op.params)?;

        // A write with RETURNING hands back the key of the row it created.
        let inserted = rows
            .first()
            .and_then(|row| row.try_get::<i64, _>(0).ok())
            .map(RecordKey::Int);

        Ok(ResultSet {
            rows: rows.len() as u64,
            inserted,
        })
    }

    fn compensate(
        &mut self,
        operation: &Operation,
        written: &ResultSet,
    ) -> std::result::Result<(), OperationError> {
        let op = sql_operation(&self.id, operation)?;
        let Some(statement) = &op.compensate else {
            return Err(OperationError::Compensation(
                "statement has no compensating statement".to_string(),
            ));
        };
        let Some(RecordKey::Int(key)) = &written.inserted else {
            return Err(OperationError::Compensation(
                "write returned no id; add RETURNING to the statement".to_string(),
            ));
        };

        self.run(statement, &[SqlValue::Int(*key)])
            .map(|_| ())
            .map_err(|e| OperationError::Compensation(e.to_string()))
    }
}

fn sql_operation<'a>(
    id: &BackendId,
    operation: &'a Operation,
) -> std::result::Result<&'a SqlOperation, OperationError> {
    match operation {
        Operation::Sql(op) => Ok(op),
        other => Err(OperationError::UnsupportedDescriptor {
            backend: id.clone(),
            kind: other.kind_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_server_is_connection_error() {
        let connector = PostgresConnector::new("postgres://nobody@127.0.0.1:1/none")
            .with_timeout(Duration::from_secs(2));
        let err = connector.connect().err().unwrap();
        assert_eq!(err.backend.as_str(), POSTGRES);
    }

    #[test]
    fn test_bad_url_is_connection_error() {
        let connector = PostgresConnector::new("not a url");
        assert!(connector.connect().is_err());
    }
}
