//! Error types for the database layer.
//!
//! Every failure surfaced by adapters, the query builder, the manager and the
//! migration runner is a [`DbError`]. Driver errors are wrapped with the name of
//! the adapter that produced them; the underlying message is never rewritten.

use sqlx::mysql::MySqlDatabaseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Missing or invalid configuration, raised before any I/O.
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Connection failed ({adapter}): {message}")]
    Connection {
        adapter: String,
        message: String,
        suggestion: String,
    },

    #[error("Query failed ({adapter}): {message}")]
    Query {
        adapter: String,
        message: String,
        /// Dialect-native code: SQLSTATE for PostgreSQL, error number for MySQL,
        /// extended result code for SQLite.
        code: Option<String>,
        unique_violation: bool,
    },

    #[error("Transaction error ({adapter}): {message}")]
    Transaction { adapter: String, message: String },

    #[error("Adapter not found: {name}")]
    NotFound { name: String },

    #[error("Migration '{migration}' failed: {message}")]
    Migration { migration: String, message: String },

    /// The query builder was asked to render an incomplete statement.
    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(
        adapter: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Connection {
            adapter: adapter.into(),
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a query error that did not originate from the driver.
    pub fn query(adapter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            adapter: adapter.into(),
            message: message.into(),
            code: None,
            unique_violation: false,
        }
    }

    pub fn transaction(adapter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transaction {
            adapter: adapter.into(),
            message: message.into(),
        }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn migration(migration: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Migration {
            migration: migration.into(),
            message: message.into(),
        }
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Wrap a driver error raised while executing a statement.
    ///
    /// Pool exhaustion and transport failures become [`DbError::Connection`];
    /// everything else is a [`DbError::Query`] carrying the driver's code.
    pub fn from_driver(adapter: &str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                // MySQL reports the SQLSTATE through code(); the error number is
                // the stable identifier for conditions like ER_DUP_KEYNAME.
                let code = match db_err.try_downcast_ref::<MySqlDatabaseError>() {
                    Some(mysql) => Some(mysql.number().to_string()),
                    None => db_err.code().map(|c| c.to_string()),
                };
                Self::Query {
                    adapter: adapter.to_string(),
                    message: db_err.message().to_string(),
                    code,
                    unique_violation: db_err.is_unique_violation(),
                }
            }
            sqlx::Error::PoolTimedOut => Self::connection(
                adapter,
                "Timed out acquiring a pooled connection",
                "Increase the pool size or acquire timeout",
            ),
            sqlx::Error::PoolClosed => Self::connection(
                adapter,
                "Connection pool is closed",
                "Reconstruct the adapter; a disconnected adapter cannot be reused",
            ),
            sqlx::Error::Io(io_err) => Self::connection(
                adapter,
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => Self::connection(
                adapter,
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            other => Self::query(adapter, other.to_string()),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Driver code attached to a query error.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            Self::Query {
                unique_violation: true,
                ..
            }
        )
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
