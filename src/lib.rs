//! unidb
//!
//! One contract for PostgreSQL, MySQL and SQLite: named adapters with pooled
//! connections, transactions, a fluent query builder, schema helpers, health
//! checks and a migration runner.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{Config, DatabaseSettings, Environment};
pub use db::{Adapter, DatabaseManager, Migration, MigrationDirection, QueryBuilder, Transaction};
pub use error::{DbError, DbResult};
pub use models::{ConnectionConfig, Dialect, QueryParam, QueryResult};
