//! Opening and seeding the stores under test.
//!
//! A store whose setup fails is still handed to the harness, as an
//! [`UnreachableConnector`], so its column shows up as unavailable.

use std::path::PathBuf;

use storebench_backends::fixtures::generate_properties;
use storebench_backends::{DocumentConnector, PropertyRecord, SqliteConnector};
use storebench_core::{Connector, UnreachableConnector};
use tempfile::TempDir;

use crate::args::{BackendKind, StoreOptions};

/// Connectors for one run plus the scratch space backing default stores.
pub struct Stores {
    pub connectors: Vec<Box<dyn Connector>>,
    // Removed on drop, after the run has finished with the stores.
    _scratch: TempDir,
}

/// Open a connector for every requested backend.
pub fn open(kinds: &[BackendKind], options: &StoreOptions) -> std::io::Result<Stores> {
    let scratch = tempfile::Builder::new().prefix("storebench").tempdir()?;
    let records = generate_properties(options.seed_rows);

    let connectors = kinds
        .iter()
        .map(|kind| {
            let connector = match kind {
                BackendKind::Sqlite => {
                    let path = options
                        .sqlite_path
                        .clone()
                        .unwrap_or_else(|| scratch.path().join("storebench.db"));
                    open_sqlite(path, &records)
                }
                BackendKind::Document => {
                    let path = options
                        .document_path
                        .clone()
                        .unwrap_or_else(|| scratch.path().join("storebench.sled"));
                    open_document(path, &records)
                }
                BackendKind::Postgres => open_postgres(options.postgres_url.as_deref()),
            };

            connector.unwrap_or_else(|reason| {
                tracing::error!(backend = kind.id(), error = %reason, "backend setup failed");
                Box::new(UnreachableConnector::new(kind.id(), reason)) as Box<dyn Connector>
            })
        })
        .collect();

    Ok(Stores {
        connectors,
        _scratch: scratch,
    })
}

fn open_sqlite(path: PathBuf, records: &[PropertyRecord]) -> Result<Box<dyn Connector>, String> {
    let connector = SqliteConnector::open(&path).map_err(|e| e.to_string())?;
    let seeded = connector.seed_if_empty(records).map_err(|e| e.to_string())?;
    tracing::info!(path = %path.display(), seeded, "sqlite store ready");
    Ok(Box::new(connector))
}

fn open_document(path: PathBuf, records: &[PropertyRecord]) -> Result<Box<dyn Connector>, String> {
    let connector = DocumentConnector::open(&path).map_err(|e| e.to_string())?;
    let seeded = connector.seed_if_empty(records).map_err(|e| e.to_string())?;
    tracing::info!(path = %path.display(), seeded, "document store ready");
    Ok(Box::new(connector))
}

#[cfg(feature = "postgres")]
fn open_postgres(url: Option<&str>) -> Result<Box<dyn Connector>, String> {
    use storebench_backends::PostgresConnector;

    let url = url.ok_or_else(|| "no PostgreSQL URL; pass --postgres-url or set DATABASE_URL".to_string())?;
    let connector = PostgresConnector::new(url);
    match connector.row_count() {
        Ok(rows) => tracing::info!(rows, "postgres store ready"),
        Err(e) => return Err(e.to_string()),
    }
    Ok(Box::new(connector))
}

#[cfg(not(feature = "postgres"))]
fn open_postgres(_url: Option<&str>) -> Result<Box<dyn Connector>, String> {
    Err("built without the postgres feature".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use storebench_backends::housing::{COLLECTION, DOCUMENT, SQLITE};

    fn options(dir: &std::path::Path, seed_rows: usize) -> StoreOptions {
        StoreOptions {
            sqlite_path: Some(dir.join("a.db")),
            document_path: Some(dir.join("a.sled")),
            postgres_url: None,
            seed_rows,
        }
    }

    #[test]
    fn test_opens_and_seeds_embedded_stores() {
        let dir = tempfile::tempdir().unwrap();
        let stores = open(
            &[BackendKind::Sqlite, BackendKind::Document],
            &options(dir.path(), 12),
        )
        .unwrap();

        let ids: Vec<_> = stores.connectors.iter().map(|c| c.id().to_string()).collect();
        assert_eq!(ids, vec![SQLITE, DOCUMENT]);
        for connector in &stores.connectors {
            assert!(connector.connect().is_ok());
        }
        drop(stores);

        assert_eq!(
            SqliteConnector::open(dir.path().join("a.db"))
                .unwrap()
                .row_count()
                .unwrap(),
            12
        );
        assert_eq!(
            DocumentConnector::open(dir.path().join("a.sled"))
                .unwrap()
                .document_count(COLLECTION)
                .unwrap(),
            12
        );
    }

    #[test]
    fn test_failed_setup_becomes_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path(), 0);
        opts.sqlite_path = Some(PathBuf::from("/nonexistent/dir/a.db"));

        let stores = open(&[BackendKind::Sqlite], &opts).unwrap();
        assert_eq!(stores.connectors.len(), 1);
        assert!(stores.connectors[0].connect().is_err());
    }

    #[cfg(not(feature = "postgres"))]
    #[test]
    fn test_postgres_without_feature() {
        let dir = tempfile::tempdir().unwrap();
        let stores = open(&[BackendKind::Postgres], &options(dir.path(), 0)).unwrap();
        let err = stores.connectors[0].connect().err().unwrap();
        assert!(err.message.contains("postgres feature"));
    }
}
