//! Storebench Backends
//!
//! Concrete adapters for the storebench harness, plus the housing data set the
//! built-in scenarios run against.
//!
//! # Backends
//!
//! - **SQLite** ([`sqlite`]): relational store over `rusqlite`, one file shared by all handles
//! - **Document** ([`document`]): JSON documents in `sled` trees, queried with
//!   filter documents and aggregation pipelines
//! - **PostgreSQL** ([`postgres`]): relational server over `sqlx`; enable with `--features postgres`

pub mod document;
pub mod error;
pub mod fixtures;
pub mod housing;
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use document::DocumentConnector;
pub use error::{Error, Result};
pub use fixtures::{generate_properties, Furnishing, PropertyRecord};
pub use sqlite::SqliteConnector;

#[cfg(feature = "postgres")]
pub use postgres::PostgresConnector;
