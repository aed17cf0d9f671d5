//! SQLite backend.
//!
//! Every handle opens its own connection to the same database file, so load
//! workers see the data the primary handle seeded.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::Value as SqliteValue;
use rusqlite::{Connection, OpenFlags};
use storebench_core::{
    Backend, BackendId, ConnectionError, Connector, Operation, OperationError, RecordKey,
    ResultSet, SqlOperation, SqlValue,
};

use crate::error::Result;
use crate::fixtures::{PropertyRecord, COLUMNS};
use crate::housing::SQLITE;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS properties (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        area INTEGER NOT NULL,
        bedrooms INTEGER NOT NULL,
        bathrooms INTEGER NOT NULL,
        stories INTEGER NOT NULL,
        mainroad INTEGER NOT NULL,
        guestroom INTEGER NOT NULL,
        basement INTEGER NOT NULL,
        hotwaterheating INTEGER NOT NULL,
        airconditioning INTEGER NOT NULL,
        parking INTEGER NOT NULL,
        prefarea INTEGER NOT NULL,
        furnishingstatus_id INTEGER NOT NULL,
        price INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_properties_price ON properties(price);
    CREATE INDEX IF NOT EXISTS idx_properties_furnishing ON properties(furnishingstatus_id);
"#;

/// Opens handles to one SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    id: BackendId,
    path: PathBuf,
}

impl SqliteConnector {
    /// Open (creating if needed) the database at `path` and ensure the
    /// `properties` schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        // WAL lets load workers read while another handle writes.
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            id: BackendId::from(SQLITE),
            path,
        })
    }

    /// Use a different backend id, e.g. to compare two SQLite files.
    pub fn with_id(mut self, id: impl Into<BackendId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows currently in `properties`.
    pub fn row_count(&self) -> Result<u64> {
        let conn = Connection::open(&self.path)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM properties", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Insert `records` in one transaction.
    pub fn seed(&self, records: &[PropertyRecord]) -> Result<usize> {
        let mut conn = Connection::open(&self.path)?;
        let insert = format!(
            "INSERT INTO properties ({}) VALUES ({})",
            COLUMNS.join(", "),
            (1..=COLUMNS.len())
                .map(|i| format!("?{}", i))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&insert)?;
            for record in records {
                let params: Vec<SqliteValue> =
                    record.sql_params().iter().map(to_sqlite).collect();
                stmt.execute(rusqlite::params_from_iter(params))?;
            }
        }
        tx.commit()?;

        tracing::info!(path = %self.path.display(), rows = records.len(), "seeded sqlite store");
        Ok(records.len())
    }

    /// Seed only when the table holds no rows yet.
    pub fn seed_if_empty(&self, records: &[PropertyRecord]) -> Result<usize> {
        if self.row_count()? > 0 {
            return Ok(0);
        }
        self.seed(records)
    }
}

impl Connector for SqliteConnector {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn connect(&self) -> std::result::Result<Box<dyn Backend>, ConnectionError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| ConnectionError::new(self.id.clone(), e.to_string()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| ConnectionError::new(self.id.clone(), e.to_string()))?;

        Ok(Box::new(SqliteBackend {
            id: self.id.clone(),
            conn,
        }))
    }
}

/// One SQLite connection.
pub struct SqliteBackend {
    id: BackendId,
    conn: Connection,
}

impl SqliteBackend {
    fn run(
        &self,
        statement: &str,
        params: &[SqlValue],
    ) -> rusqlite::Result<ResultSet> {
        let mut stmt = self.conn.prepare_cached(statement)?;
        // Any statement that may write reports the key of the row it touched.
        let want_key = !stmt.readonly();
        for (i, value) in params.iter().enumerate() {
            // `$n` placeholders are named in SQLite; bind them by name so their
            // order in the statement does not matter.
            let index = stmt
                .parameter_index(&format!("${}", i + 1))?
                .unwrap_or(i + 1);
            stmt.raw_bind_parameter(index, to_sqlite(value))?;
        }

        if stmt.column_count() > 0 {
            let mut rows = stmt.raw_query();
            let mut count = 0u64;
            let mut key = None;
            while let Some(row) = rows.next()? {
                if want_key && key.is_none() {
                    key = row.get::<_, i64>(0).ok().map(RecordKey::Int);
                }
                count += 1;
            }
            return Ok(ResultSet {
                rows: count,
                inserted: key,
            });
        }

        let changed = stmt.raw_execute()? as u64;
        let inserted = want_key.then(|| RecordKey::Int(self.conn.last_insert_rowid()));
        Ok(ResultSet {
            rows: changed,
            inserted,
        })
    }
}

impl Backend for SqliteBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn execute(&mut self, operation: &Operation) -> std::result::Result<ResultSet, OperationError> {
        let op = sql_operation(&self.id, operation)?;
        self.run(&op.statement, &op.params)
            .map_err(|e| OperationError::Backend(e.to_string()))
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
        let key = match &written.inserted {
            Some(RecordKey::Int(key)) => *key,
            _ => {
                return Err(OperationError::Compensation(
                    "write returned no row id".to_string(),
                ))
            }
        };

        self.run(statement, &[SqlValue::Int(key)])
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

fn to_sqlite(value: &SqlValue) -> SqliteValue {
    match value {
        SqlValue::Null => SqliteValue::Null,
        SqlValue::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        SqlValue::Int(i) => SqliteValue::Integer(*i),
        SqlValue::Float(f) => SqliteValue::Real(*f),
        SqlValue::Text(s) => SqliteValue::Text(s.clone()),
    }
}
