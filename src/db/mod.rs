//! Database abstraction layer.
//!
//! This module provides the dialect-agnostic database contract:
//! - Adapters owning one connection pool each
//! - SQL dialect strategies for PostgreSQL, MySQL and SQLite
//! - Transactions bound to a single connection
//! - A fluent query builder producing `?`-placeholder SQL
//! - A manager for named adapters with read/write routing
//! - A migration runner with a ledger table

pub mod adapter;
pub mod dialect;
pub(crate) mod macros;
pub mod manager;
pub mod migration;
pub mod params;
pub mod pool;
pub mod query_builder;
pub mod transaction;
pub mod types;

pub use adapter::Adapter;
pub use dialect::{SqlDialect, sql_dialect};
pub use manager::{
    DatabaseManager, DistributedQuery, MAIN_ADAPTER, ManagerHealth, REPLICA_ADAPTER,
    TEST_ADAPTER, is_write_statement,
};
pub use migration::{
    LEDGER_TABLE, Migration, MigrationDirection, MigrationReport, MigrationRunner,
    MigrationStatus,
};
pub use pool::DbPool;
pub use query_builder::{JoinKind, Operation, Operator, QueryBuilder, SortDirection, SqlStatement};
pub use transaction::Transaction;
