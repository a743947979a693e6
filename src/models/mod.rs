//! Data models for the database layer.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{ConnectionConfig, Dialect, SQLITE_MEMORY, SslOptions, TransactionState};
pub use query::{QueryParam, QueryResult, Row};
pub use schema::{
    AdapterHealth, ColumnDefinition, ColumnInfo, ColumnType, DefaultValue, HealthState,
    IndexOptions,
};
