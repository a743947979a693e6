//! Per-dialect database adapter.
//!
//! An [`Adapter`] owns exactly one pool and exposes the uniform contract:
//! lifecycle, statement execution, transactions, schema operations and health
//! checks. The dialect is fixed at construction; dispatch to the dialect's
//! pool type happens through [`DbPool`].
//!
//! Lifecycle: `Idle --connect--> Connected --disconnect--> Closed`. A closed
//! adapter cannot be reconnected; construct a new one instead.

use crate::db::dialect::{SqlDialect, sql_dialect};
use crate::db::macros::dispatch;
use crate::db::pool::{DbPool, create_pool};
use crate::db::transaction::Transaction;
use crate::error::{DbError, DbResult};
use crate::models::{
    AdapterHealth, ColumnDefinition, ColumnInfo, ConnectionConfig, Dialect, HealthState,
    IndexOptions, QueryParam, QueryResult, Row,
};
use futures_util::future::BoxFuture;
use serde_json::Value as JsonValue;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

enum AdapterState {
    Idle,
    Connected(DbPool),
    Closed,
}

pub struct Adapter {
    name: String,
    config: ConnectionConfig,
    state: RwLock<AdapterState>,
}

impl Adapter {
    /// Create an adapter. Fails with [`DbError::Config`] when the configuration
    /// is missing fields its dialect requires; no connection is attempted.
    pub fn new(name: impl Into<String>, config: ConnectionConfig) -> DbResult<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            state: RwLock::new(AdapterState::Idle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// SQL generator for this adapter's dialect.
    pub fn sql_dialect(&self) -> &'static dyn SqlDialect {
        sql_dialect(self.config.dialect)
    }

    /// Open the pool. Calling this on a connected adapter is a no-op.
    pub async fn connect(&self) -> DbResult<()> {
        let mut state = self.state.write().await;
        match *state {
            AdapterState::Connected(_) => Ok(()),
            AdapterState::Closed => Err(DbError::connection(
                &self.name,
                "Adapter has been disconnected",
                "Create a new adapter; a disconnected adapter cannot be reused",
            )),
            AdapterState::Idle => {
                let pool = create_pool(&self.name, &self.config).await?;
                info!(adapter = %self.name, dialect = %self.config.dialect, "Connected");
                *state = AdapterState::Connected(pool);
                Ok(())
            }
        }
    }

    /// Close the pool and retire the adapter. A second call is a no-op.
    ///
    /// Closing waits for checked-out connections; if they are not returned
    /// within the acquire timeout a [`DbError::Connection`] is returned, and
    /// the adapter is retired regardless.
    pub async fn disconnect(&self) -> DbResult<()> {
        let previous = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut *state, AdapterState::Closed)
        };

        let AdapterState::Connected(pool) = previous else {
            return Ok(());
        };

        let timeout = self.config.pool.acquire_timeout();
        if tokio::time::timeout(timeout, pool.close()).await.is_err() {
            return Err(DbError::connection(
                &self.name,
                format!("Timed out after {}s closing the pool", timeout.as_secs()),
                "Commit or roll back open transactions before disconnecting",
            ));
        }
        info!(adapter = %self.name, "Disconnected");
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        matches!(*self.state.read().await, AdapterState::Connected(_))
    }

    async fn pool(&self) -> DbResult<DbPool> {
        match &*self.state.read().await {
            AdapterState::Connected(pool) => Ok(pool.clone()),
            _ => Err(DbError::query(&self.name, "Adapter is not connected")),
        }
    }

    /// Execute a parameterized statement on a pooled connection.
    ///
    /// Placeholders are `?` on every dialect.
    pub async fn query(&self, sql: &str, params: &[QueryParam]) -> DbResult<QueryResult> {
        let pool = self.pool().await?;
        let started = Instant::now();
        let result = dispatch!(DbPool, &pool, p, dialect => dialect::run(p, sql, params).await)
            .map_err(|e| DbError::from_driver(&self.name, e));

        if self.config.log_queries {
            log_statement(&self.name, sql, params.len(), started);
        }
        result
    }

    /// Check out a dedicated connection and begin a transaction on it.
    pub async fn begin_transaction(&self) -> DbResult<Transaction> {
        let pool = self.pool().await?;
        let tx = pool
            .begin()
            .await
            .map_err(|e| DbError::from_driver(&self.name, e))?;
        debug!(adapter = %self.name, "Transaction started");
        Ok(Transaction::new(&self.name, self.config.log_queries, tx))
    }

    /// Run `callback` inside a transaction.
    ///
    /// Commits when the callback returns `Ok`. On `Err` the transaction is
    /// rolled back and the callback's error is returned unchanged. A callback
    /// may finish the transaction itself.
    ///
    /// ```ignore
    /// adapter.transaction(|tx| Box::pin(async move {
    ///     tx.query("INSERT INTO users (name) VALUES (?)", &["Ann".into()]).await?;
    ///     Ok(())
    /// })).await?;
    /// ```
    pub async fn transaction<F, T>(&self, callback: F) -> DbResult<T>
    where
        F: for<'t> FnOnce(&'t mut Transaction) -> BoxFuture<'t, DbResult<T>>,
    {
        let mut tx = self.begin_transaction().await?;
        match callback(&mut tx).await {
            Ok(value) => {
                if tx.is_active() {
                    tx.commit().await?;
                }
                Ok(value)
            }
            Err(err) => {
                if tx.is_active() {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(
                            adapter = %self.name,
                            error = %rollback_err,
                            "Rollback after failed transaction callback failed"
                        );
                    }
                }
                Err(err)
            }
        }
    }

    pub async fn table_exists(&self, table: &str) -> DbResult<bool> {
        let result = self
            .query(self.sql_dialect().table_exists_sql(), &[QueryParam::from(table)])
            .await?;
        Ok(result
            .first()
            .and_then(|row| row.values().next())
            .is_some_and(truthy))
    }

    /// `CREATE TABLE IF NOT EXISTS`.
    pub async fn create_table(&self, table: &str, columns: &[ColumnDefinition]) -> DbResult<()> {
        let sql = self.sql_dialect().create_table_sql(table, columns);
        self.query(&sql, &[]).await?;
        debug!(adapter = %self.name, table = %table, "Table ensured");
        Ok(())
    }

    /// `DROP TABLE IF EXISTS`.
    pub async fn drop_table(&self, table: &str) -> DbResult<()> {
        let sql = self.sql_dialect().drop_table_sql(table);
        self.query(&sql, &[]).await?;
        Ok(())
    }

    /// Create an index, treating "already exists" as success.
    pub async fn create_index(
        &self,
        table: &str,
        index_name: &str,
        columns: &[&str],
        options: IndexOptions,
    ) -> DbResult<()> {
        let dialect = self.sql_dialect();
        let sql = dialect.create_index_sql(table, index_name, columns, options);
        match self.query(&sql, &[]).await {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .code()
                    .is_some_and(|code| dialect.is_duplicate_index_code(code)) =>
            {
                debug!(adapter = %self.name, index = %index_name, "Index already exists");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Column layout of `table` in ordinal order. Empty when the table does
    /// not exist.
    pub async fn get_schema(&self, table: &str) -> DbResult<Vec<ColumnInfo>> {
        let result = self
            .query(self.sql_dialect().column_info_sql(), &[QueryParam::from(table)])
            .await?;
        Ok(result.rows.iter().map(column_info).collect())
    }

    /// Probe the connection with `SELECT 1`. Never fails.
    pub async fn health_check(&self) -> AdapterHealth {
        let dialect = self.config.dialect;
        let pool = match &*self.state.read().await {
            AdapterState::Connected(pool) => pool.clone(),
            _ => {
                return AdapterHealth {
                    healthy: false,
                    status: HealthState::Disconnected,
                    dialect,
                    response_time_ms: None,
                    error: None,
                };
            }
        };

        let started = Instant::now();
        let ping = dispatch!(DbPool, &pool, p, driver => driver::run(p, "SELECT 1", &[]).await);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match ping {
            Ok(_) => AdapterHealth {
                healthy: true,
                status: HealthState::Connected,
                dialect,
                response_time_ms: Some(elapsed_ms),
                error: None,
            },
            Err(e) => AdapterHealth {
                healthy: false,
                status: HealthState::Error,
                dialect,
                response_time_ms: Some(elapsed_ms),
                error: Some(DbError::from_driver(&self.name, e).to_string()),
            },
        }
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Timing line for one statement.
pub(crate) fn log_statement(adapter: &str, sql: &str, params: usize, started: Instant) {
    debug!(
        adapter = %adapter,
        sql = %sql.trim(),
        params = params,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Executed query"
    );
}

fn truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        JsonValue::String(s) => matches!(s.as_str(), "1" | "t" | "true" | "YES"),
        _ => false,
    }
}

fn text(row: &Row, key: &str) -> Option<String> {
    match row.get(key)? {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn column_info(row: &Row) -> ColumnInfo {
    ColumnInfo {
        column_name: text(row, "column_name").unwrap_or_default(),
        data_type: text(row, "data_type").unwrap_or_default(),
        is_nullable: text(row, "is_nullable").is_some_and(|v| v.eq_ignore_ascii_case("YES")),
        column_default: text(row, "column_default"),
        primary_key: row.get("primary_key").is_some_and(truthy),
    }
}
