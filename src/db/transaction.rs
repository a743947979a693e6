//! Transaction handles.
//!
//! A [`Transaction`] owns one checked-out connection from its adapter's pool
//! until `commit` or `rollback`. Every statement issued through the handle runs
//! on that connection, in submission order. Dropping an active handle rolls the
//! transaction back and returns the connection to the pool.

use crate::db::adapter::log_statement;
use crate::db::macros::dispatch;
use crate::error::{DbError, DbResult};
use crate::models::{Dialect, QueryParam, QueryResult, TransactionState};
use sqlx::{MySql, Postgres, Sqlite};
use std::time::Instant;
use tracing::debug;

/// Database-specific transaction wrapper.
pub enum DbTransaction {
    Postgres(sqlx::Transaction<'static, Postgres>),
    MySql(sqlx::Transaction<'static, MySql>),
    Sqlite(sqlx::Transaction<'static, Sqlite>),
}

impl DbTransaction {
    pub fn dialect(&self) -> Dialect {
        match self {
            DbTransaction::Postgres(_) => Dialect::Postgres,
            DbTransaction::MySql(_) => Dialect::MySql,
            DbTransaction::Sqlite(_) => Dialect::Sqlite,
        }
    }

    async fn commit(self) -> Result<(), sqlx::Error> {
        match self {
            DbTransaction::Postgres(tx) => tx.commit().await,
            DbTransaction::MySql(tx) => tx.commit().await,
            DbTransaction::Sqlite(tx) => tx.commit().await,
        }
    }

    async fn rollback(self) -> Result<(), sqlx::Error> {
        match self {
            DbTransaction::Postgres(tx) => tx.rollback().await,
            DbTransaction::MySql(tx) => tx.rollback().await,
            DbTransaction::Sqlite(tx) => tx.rollback().await,
        }
    }
}

/// An open transaction bound to one connection.
///
/// Once committed or rolled back, every further call fails with
/// [`DbError::Transaction`].
pub struct Transaction {
    adapter: String,
    log_queries: bool,
    inner: Option<DbTransaction>,
    state: TransactionState,
}

impl Transaction {
    pub(crate) fn new(adapter: impl Into<String>, log_queries: bool, inner: DbTransaction) -> Self {
        Self {
            adapter: adapter.into(),
            log_queries,
            inner: Some(inner),
            state: TransactionState::Active,
        }
    }

    /// Name of the adapter that opened this transaction.
    pub fn adapter_name(&self) -> &str {
        &self.adapter
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    fn finished_error(&self) -> DbError {
        DbError::transaction(&self.adapter, format!("Transaction already {}", self.state))
    }

    /// Execute a statement on the transaction's connection.
    pub async fn query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<QueryResult> {
        let Some(tx) = self.inner.as_mut() else {
            return Err(self.finished_error());
        };

        let started = Instant::now();
        let result = dispatch!(DbTransaction, tx, t, dialect => {
            dialect::run(&mut **t, sql, params).await
        })
        .map_err(|e| DbError::from_driver(&self.adapter, e));

        if self.log_queries {
            log_statement(&self.adapter, sql, params.len(), started);
        }
        result
    }

    /// Commit. The connection is released whether or not the commit succeeds.
    pub async fn commit(&mut self) -> DbResult<()> {
        let Some(tx) = self.inner.take() else {
            return Err(self.finished_error());
        };

        match tx.commit().await {
            Ok(()) => {
                self.state = TransactionState::Committed;
                debug!(adapter = %self.adapter, "Transaction committed");
                Ok(())
            }
            Err(e) => {
                // The server discards a transaction whose commit failed.
                self.state = TransactionState::RolledBack;
                Err(DbError::transaction(
                    &self.adapter,
                    format!("Commit failed: {}", e),
                ))
            }
        }
    }

    /// Roll back. The connection is released whether or not the rollback succeeds.
    pub async fn rollback(&mut self) -> DbResult<()> {
        let Some(tx) = self.inner.take() else {
            return Err(self.finished_error());
        };

        self.state = TransactionState::RolledBack;
        tx.rollback().await.map_err(|e| {
            DbError::transaction(&self.adapter, format!("Rollback failed: {}", e))
        })?;
        debug!(adapter = %self.adapter, "Transaction rolled back");
        Ok(())
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("adapter", &self.adapter)
            .field("dialect", &self.inner.as_ref().map(DbTransaction::dialect))
            .field("state", &self.state)
            .finish()
    }
}
