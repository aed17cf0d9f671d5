//! Built-in housing scenarios.
//!
//! Five cases over the `properties` data set, each defined once per backend
//! family: SQL statements (shared by SQLite and PostgreSQL, both accept `$n`
//! placeholders) and document filters or pipelines.

use std::time::Duration;

use serde_json::json;
use storebench_core::{
    DocumentOperation, Operation, ScenarioError, ScenarioRegistry, ScenarioSpec, SqlOperation,
    SqlValue,
};

use crate::fixtures::{sample_property, COLUMNS};

pub const SQLITE: &str = "sqlite";
pub const POSTGRES: &str = "postgres";
pub const DOCUMENT: &str = "document";

/// Table and collection name.
pub const COLLECTION: &str = "properties";

pub const SIMPLE_RANGE: &str = "Scenario 1: Simple price range query";
pub const MULTI_CONDITION: &str = "Scenario 2: Complex multi-condition query";
pub const AGGREGATION: &str = "Scenario 3: Aggregation by furnishing status";
pub const SINGLE_WRITE: &str = "Scenario 4: Single write";
pub const CONCURRENT: &str = "Scenario 5: Concurrent query";

/// Records per write cycle used to scale write throughput.
pub const WRITE_BATCH: u32 = 100;

/// Load test shape.
pub const LOAD_DURATION: Duration = Duration::from_secs(10);
pub const LOAD_WORKERS: usize = 50;

/// All five scenarios, in report order.
pub fn scenarios() -> Vec<ScenarioSpec> {
    vec![
        with_both(
            ScenarioSpec::read(SIMPLE_RANGE, 1000),
            sql("SELECT * FROM properties WHERE price < $1", vec![5_000_000i64.into()]),
            find(json!({"basic_info.price": {"$lt": 5_000_000}})),
        ),
        with_both(
            ScenarioSpec::read(MULTI_CONDITION, 500),
            sql(
                "SELECT * FROM properties \
                 WHERE price BETWEEN $1 AND $2 \
                 AND area > $3 \
                 AND bedrooms >= $4 \
                 AND airconditioning = $5 \
                 AND parking >= $6",
                vec![
                    3_000_000i64.into(),
                    8_000_000i64.into(),
                    5_000i64.into(),
                    3i64.into(),
                    true.into(),
                    1i64.into(),
                ],
            ),
            find(json!({
                "basic_info.price": {"$gte": 3_000_000, "$lte": 8_000_000},
                "basic_info.area": {"$gt": 5_000},
                "basic_info.bedrooms": {"$gte": 3},
                "features.airconditioning": true,
                "features.parking": {"$gte": 1},
            })),
        ),
        with_both(
            ScenarioSpec::read(AGGREGATION, 200),
            sql(
                "SELECT furnishingstatus_id, COUNT(*) AS count, \
                 AVG(price) AS avg_price, AVG(area) AS avg_area \
                 FROM properties GROUP BY furnishingstatus_id",
                Vec::new(),
            ),
            Operation::Document(DocumentOperation::Aggregate {
                collection: COLLECTION.to_string(),
                pipeline: vec![json!({
                    "$group": {
                        "_id": "$furnishing_status",
                        "count": {"$sum": 1},
                        "avg_price": {"$avg": "$basic_info.price"},
                        "avg_area": {"$avg": "$basic_info.area"},
                    }
                })],
            }),
        ),
        with_both(
            ScenarioSpec::write(SINGLE_WRITE, 100, WRITE_BATCH),
            Operation::Sql(
                SqlOperation::new(insert_statement())
                    .with_params(sample_property().sql_params())
                    .with_compensation("DELETE FROM properties WHERE id = $1"),
            ),
            Operation::Document(DocumentOperation::InsertOne {
                collection: COLLECTION.to_string(),
                document: sample_property().to_document("1970-01-01T00:00:00Z"),
            }),
        ),
        with_both(
            ScenarioSpec::load(CONCURRENT, LOAD_DURATION, LOAD_WORKERS),
            sql(
                "SELECT * FROM properties WHERE price BETWEEN $1 AND $2 AND bedrooms >= $3",
                vec![3_000_000i64.into(), 8_000_000i64.into(), 2i64.into()],
            ),
            find(json!({
                "basic_info.price": {"$gte": 3_000_000, "$lte": 8_000_000},
                "basic_info.bedrooms": {"$gte": 2},
            })),
        ),
    ]
}

/// Registry holding [`scenarios`].
pub fn registry() -> Result<ScenarioRegistry, ScenarioError> {
    let mut registry = ScenarioRegistry::new();
    for spec in scenarios() {
        registry.register(spec)?;
    }
    Ok(registry)
}

fn with_both(spec: ScenarioSpec, sql: Operation, document: Operation) -> ScenarioSpec {
    spec.with_operation(SQLITE, sql.clone())
        .with_operation(POSTGRES, sql)
        .with_operation(DOCUMENT, document)
}

fn sql(statement: &str, params: Vec<SqlValue>) -> Operation {
    Operation::Sql(SqlOperation::new(statement).with_params(params))
}

fn find(filter: serde_json::Value) -> Operation {
    Operation::Document(DocumentOperation::Find {
        collection: COLLECTION.to_string(),
        filter,
    })
}

fn insert_statement() -> String {
    let placeholders: Vec<String> = (1..=COLUMNS.len()).map(|i| format!("${}", i)).collect();
    format!(
        "INSERT INTO properties ({}) VALUES ({}) RETURNING CAST(id AS BIGINT)",
        COLUMNS.join(", "),
        placeholders.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use storebench_core::{BackendId, Workload, WorkloadKind};

    #[test]
    fn test_registry_order_and_shapes() {
        let registry = registry().unwrap();
        let names: Vec<_> = registry.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![SIMPLE_RANGE, MULTI_CONDITION, AGGREGATION, SINGLE_WRITE, CONCURRENT]
        );

        assert_eq!(
            registry.get(SINGLE_WRITE).unwrap().workload,
            Workload::Write {
                iterations: 100,
                batch_size: 100,
                compensate: true
            }
        );
        assert_eq!(registry.get(CONCURRENT).unwrap().kind(), WorkloadKind::Load);
        assert_eq!(
            registry.get(CONCURRENT).unwrap().workload.duration(),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_every_backend_covered() {
        let registry = registry().unwrap();
        let backends = [
            BackendId::from(SQLITE),
            BackendId::from(POSTGRES),
            BackendId::from(DOCUMENT),
        ];
        assert_eq!(registry.coverage_gaps(&backends).count(), 0);
    }

    #[test]
    fn test_insert_statement_binds_every_column() {
        let statement = insert_statement();
        assert!(statement.contains("$13)"));
        assert!(!statement.contains("$14"));
        assert!(statement.ends_with("RETURNING CAST(id AS BIGINT)"));
    }
}
