//! Document store backend.
//!
//! Collections are `sled` trees holding JSON documents keyed by ids from
//! [`sled::Db::generate_id`]. Reads decode and scan the whole collection, the
//! way a document database without a matching index would.

pub mod filter;
pub mod pipeline;

use std::path::Path;

use serde_json::Value;
use sled::{Db, Tree};
use storebench_core::{
    Backend, BackendId, ConnectionError, Connector, DocumentOperation, Operation, OperationError,
    RecordKey, ResultSet,
};

use crate::error::Result;
use crate::fixtures::PropertyRecord;
use crate::housing::{COLLECTION, DOCUMENT};

pub use filter::Filter;
pub use pipeline::Pipeline;

/// Opens handles onto one shared `sled` database.
#[derive(Debug, Clone)]
pub struct DocumentConnector {
    id: BackendId,
    db: Db,
}

impl DocumentConnector {
    /// Open (creating if needed) a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::Config::new().path(path).open()?;
        Ok(Self::from_db(db))
    }

    /// Open a store that is deleted when dropped.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self::from_db(db))
    }

    fn from_db(db: Db) -> Self {
        Self {
            id: BackendId::from(DOCUMENT),
            db,
        }
    }

    pub fn with_id(mut self, id: impl Into<BackendId>) -> Self {
        self.id = id.into();
        self
    }

    /// Documents currently in `collection`.
    pub fn document_count(&self, collection: &str) -> Result<usize> {
        Ok(self.db.open_tree(collection)?.len())
    }

    /// Insert `records` into the properties collection.
    pub fn seed(&self, records: &[PropertyRecord]) -> Result<usize> {
        let tree = self.db.open_tree(COLLECTION)?;
        let created_at = chrono::Utc::now().to_rfc3339();

        let mut batch = sled::Batch::default();
        for record in records {
            let id = self.db.generate_id()?;
            batch.insert(id.to_be_bytes().to_vec(), serde_json::to_vec(&record.to_document(&created_at))?);
        }
        tree.apply_batch(batch)?;
        tree.flush()?;

        tracing::info!(collection = COLLECTION, documents = records.len(), "seeded document store");
        Ok(records.len())
    }

    /// Seed only when the properties collection is empty.
    pub fn seed_if_empty(&self, records: &[PropertyRecord]) -> Result<usize> {
        if self.document_count(COLLECTION)? > 0 {
            return Ok(0);
        }
        self.seed(records)
    }
}

impl Connector for DocumentConnector {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn connect(&self) -> std::result::Result<Box<dyn Backend>, ConnectionError> {
        self.db
            .open_tree(COLLECTION)
            .map_err(|e| ConnectionError::new(self.id.clone(), e.to_string()))?;

        Ok(Box::new(DocumentBackend {
            id: self.id.clone(),
            db: self.db.clone(),
        }))
    }
}

/// One handle onto the document store.
pub struct DocumentBackend {
    id: BackendId,
    db: Db,
}

impl DocumentBackend {
    fn tree(&self, collection: &str) -> std::result::Result<Tree, OperationError> {
        self.db
            .open_tree(collection)
            .map_err(|e| OperationError::Backend(e.to_string()))
    }

    fn scan(&self, collection: &str) -> std::result::Result<Vec<Value>, OperationError> {
        self.tree(collection)?
            .iter()
            .values()
            .map(|bytes| {
                let bytes = bytes.map_err(|e| OperationError::Backend(e.to_string()))?;
                serde_json::from_slice(&bytes).map_err(|e| OperationError::Backend(e.to_string()))
            })
            .collect()
    }

    fn find(&self, collection: &str, filter: &Value) -> std::result::Result<u64, OperationError> {
        let filter = Filter::parse(filter)?;
        let mut matched = 0u64;
        for bytes in self.tree(collection)?.iter().values() {
            let bytes = bytes.map_err(|e| OperationError::Backend(e.to_string()))?;
            let doc: Value = serde_json::from_slice(&bytes)
                .map_err(|e| OperationError::Backend(e.to_string()))?;
            if filter.matches(&doc) {
                matched += 1;
            }
        }
        Ok(matched)
    }

    fn insert_one(
        &self,
        collection: &str,
        document: &Value,
    ) -> std::result::Result<RecordKey, OperationError> {
        if !document.is_object() {
            return Err(OperationError::InvalidDescriptor(
                "insert_one expects an object document".to_string(),
            ));
        }
        let bytes =
            serde_json::to_vec(document).map_err(|e| OperationError::Backend(e.to_string()))?;
        let key = self
            .db
            .generate_id()
            .map_err(|e| OperationError::Backend(e.to_string()))?
            .to_be_bytes()
            .to_vec();

        self.tree(collection)?
            .insert(key.as_slice(), bytes)
            .map_err(|e| OperationError::Backend(e.to_string()))?;
        Ok(RecordKey::Bytes(key))
    }
}

impl Backend for DocumentBackend {
    fn id(&self) -> &BackendId {
        &self.id
    }

    fn execute(&mut self, operation: &Operation) -> std::result::Result<ResultSet, OperationError> {
        match document_operation(&self.id, operation)? {
            DocumentOperation::Find { collection, filter } => {
                Ok(ResultSet::rows(self.find(collection, filter)?))
            }
            DocumentOperation::Aggregate {
                collection,
                pipeline,
            } => {
                let pipeline = Pipeline::parse(pipeline)?;
                let out = pipeline.run(self.scan(collection)?);
                Ok(ResultSet::rows(out.len() as u64))
            }
            DocumentOperation::InsertOne {
                collection,
                document,
            } => Ok(ResultSet::inserted(self.insert_one(collection, document)?)),
        }
    }

    fn compensate(
        &mut self,
        operation: &Operation,
        written: &ResultSet,
    ) -> std::result::Result<(), OperationError> {
        let collection = match document_operation(&self.id, operation)? {
            DocumentOperation::InsertOne { collection, .. } => collection,
            _ => {
                return Err(OperationError::Compensation(
                    "only insert_one writes can be undone".to_string(),
                ))
            }
        };
        let Some(RecordKey::Bytes(key)) = &written.inserted else {
            return Err(OperationError::Compensation(
                "write returned no document key".to_string(),
            ));
        };

        self.tree(collection)?
            .remove(key.as_slice())
            .map_err(|e| OperationError::Compensation(e.to_string()))?;
        Ok(())
    }
}

fn document_operation<'a>(
    id: &BackendId,
    operation: &'a Operation,
) -> std::result::Result<&'a DocumentOperation, OperationError> {
    match operation {
        Operation::Document(op) => Ok(op),
        other => Err(OperationError::UnsupportedDescriptor {
            backend: id.clone(),
            kind: other.kind_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{generate_properties, sample_property};
    use serde_json::json;

    fn seeded(rows: usize) -> DocumentConnector {
        let connector = DocumentConnector::temporary().unwrap();
        connector.seed(&generate_properties(rows)).unwrap();
        connector
    }

    fn find(filter: Value) -> Operation {
        Operation::Document(DocumentOperation::Find {
            collection: COLLECTION.to_string(),
            filter,
        })
    }

    #[test]
    fn test_find_counts_matches() {
        let connector = seeded(200);
        let mut backend = connector.connect().unwrap();

        let expected = generate_properties(200)
            .iter()
            .filter(|r| r.price < 5_000_000)
            .count() as u64;
        let result = backend
            .execute(&find(json!({"basic_info.price": {"$lt": 5000000}})))
            .unwrap();
        assert_eq!(result.rows, expected);
    }

    #[test]
    fn test_aggregate_groups() {
        let connector = seeded(30);
        let mut backend = connector.connect().unwrap();

        let op = Operation::Document(DocumentOperation::Aggregate {
            collection: COLLECTION.to_string(),
            pipeline: vec![json!({"$group": {"_id": "$furnishing_status", "count": {"$sum": 1}}})],
        });
        assert_eq!(backend.execute(&op).unwrap().rows, 3);
    }

    #[test]
    fn test_insert_then_compensate() {
        let connector = seeded(10);
        let mut backend = connector.connect().unwrap();
        let op = Operation::Document(DocumentOperation::InsertOne {
            collection: COLLECTION.to_string(),
            document: sample_property().to_document("2024-01-01T00:00:00Z"),
        });

        let written = backend.execute(&op).unwrap();
        assert_eq!(connector.document_count(COLLECTION).unwrap(), 11);
        backend.compensate(&op, &written).unwrap();
        assert_eq!(connector.document_count(COLLECTION).unwrap(), 10);
    }

    #[test]
    fn test_compensating_a_read_fails() {
        let connector = seeded(5);
        let mut backend = connector.connect().unwrap();
        let op = Operation::Document(DocumentOperation::Find {
            collection: COLLECTION.to_string(),
            filter: json!({}),
        });

        let result = backend.execute(&op).unwrap();
        let err = backend.compensate(&op, &result).unwrap_err();
        assert!(matches!(err, OperationError::Compensation(_)));
    }

    #[test]
    fn test_handles_share_data() {
        let connector = seeded(0);
        let mut writer = connector.connect().unwrap();
        let mut reader = connector.connect().unwrap();

        writer
            .execute(&Operation::Document(DocumentOperation::InsertOne {
                collection: COLLECTION.to_string(),
                document: json!({"basic_info": {"price": 1.0}}),
            }))
            .unwrap();
        assert_eq!(reader.execute(&find(json!({}))).unwrap().rows, 1);
    }

    #[test]
    fn test_invalid_filter_is_descriptor_error() {
        let connector = seeded(1);
        let mut backend = connector.connect().unwrap();
        let err = backend
            .execute(&find(json!({"a": {"$where": "x"}})))
            .unwrap_err();
        assert!(matches!(err, OperationError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_rejects_sql() {
        let connector = seeded(0);
        let mut backend = connector.connect().unwrap();
        let err = backend
            .execute(&Operation::Sql(storebench_core::SqlOperation::new("SELECT 1")))
            .unwrap_err();
        assert!(matches!(err, OperationError::UnsupportedDescriptor { kind: "sql", .. }));
    }

    #[test]
    fn test_seed_if_empty() {
        let connector = seeded(4);
        assert_eq!(connector.seed_if_empty(&generate_properties(4)).unwrap(), 0);
        assert_eq!(connector.document_count(COLLECTION).unwrap(), 4);
    }
}
