//! Migration runner.
//!
//! Applies or reverts caller-ordered migration units exactly once per name,
//! tracked in a `migrations` ledger table on the target adapter. A unit is
//! either pending or applied; an error from `up`/`down` halts the batch and
//! leaves the ledger as of the last unit that succeeded.

use crate::db::adapter::Adapter;
use crate::db::query_builder::QueryBuilder;
use crate::error::{DbError, DbResult};
use crate::models::{ColumnDefinition, ColumnType, DefaultValue, QueryParam};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Name of the ledger table. Not configurable.
pub const LEDGER_TABLE: &str = "migrations";

/// One schema change.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique ledger key.
    fn name(&self) -> &str;

    async fn up(&self, adapter: &Adapter) -> DbResult<()>;

    async fn down(&self, adapter: &Adapter) -> DbResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationDirection {
    Up,
    Down,
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

impl FromStr for MigrationDirection {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(DbError::config(format!(
                "Unknown migration direction '{}', expected 'up' or 'down'",
                other
            ))),
        }
    }
}

/// Outcome of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub direction: MigrationDirection,
    /// Units whose `up`/`down` ran, in order.
    pub applied: Vec<String>,
    /// Units that were already in the requested state.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub name: String,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<String>,
}

/// Runs migration units against one adapter.
pub struct MigrationRunner<'a> {
    adapter: &'a Adapter,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(adapter: &'a Adapter) -> Self {
        Self { adapter }
    }

    /// Create the ledger table if it does not exist.
    pub async fn ensure_ledger(&self) -> DbResult<()> {
        let columns = [
            ColumnDefinition::new("id", ColumnType::Integer)
                .primary_key()
                .auto_increment(),
            ColumnDefinition::new("name", ColumnType::STRING)
                .unique()
                .not_null(),
            ColumnDefinition::new("executed_at", ColumnType::Date)
                .default_value(DefaultValue::Now),
        ];
        self.adapter.create_table(LEDGER_TABLE, &columns).await
    }

    pub async fn run(
        &self,
        direction: MigrationDirection,
        units: &[Box<dyn Migration>],
    ) -> DbResult<MigrationReport> {
        self.ensure_ledger().await?;

        let mut report = MigrationReport {
            direction,
            applied: Vec::new(),
            skipped: Vec::new(),
        };

        for unit in units {
            let name = unit.name();
            let applied = self.executed_at(name).await?.is_some();

            match (direction, applied) {
                (MigrationDirection::Up, false) => {
                    info!(adapter = %self.adapter.name(), migration = %name, "Applying migration");
                    unit.up(self.adapter)
                        .await
                        .map_err(|e| DbError::migration(name, e.to_string()))?;
                    self.record(name).await?;
                    report.applied.push(name.to_string());
                }
                (MigrationDirection::Down, true) => {
                    info!(adapter = %self.adapter.name(), migration = %name, "Reverting migration");
                    unit.down(self.adapter)
                        .await
                        .map_err(|e| DbError::migration(name, e.to_string()))?;
                    self.forget(name).await?;
                    report.applied.push(name.to_string());
                }
                _ => {
                    info!(
                        adapter = %self.adapter.name(),
                        migration = %name,
                        direction = %direction,
                        "Migration already in requested state, skipping"
                    );
                    report.skipped.push(name.to_string());
                }
            }
        }

        Ok(report)
    }

    /// Applied flag and execution time for each unit, in the given order.
    pub async fn status(&self, units: &[Box<dyn Migration>]) -> DbResult<Vec<MigrationStatus>> {
        self.ensure_ledger().await?;

        let mut statuses = Vec::with_capacity(units.len());
        for unit in units {
            let executed_at = self.executed_at(unit.name()).await?;
            statuses.push(MigrationStatus {
                name: unit.name().to_string(),
                applied: executed_at.is_some(),
                executed_at: executed_at.flatten(),
            });
        }
        Ok(statuses)
    }

    /// `None` when the unit is not in the ledger; `Some(None)` when it is but
    /// its timestamp is NULL.
    async fn executed_at(&self, name: &str) -> DbResult<Option<Option<String>>> {
        let stmt = QueryBuilder::new()
            .select(["name", "executed_at"])
            .from(LEDGER_TABLE)
            .where_eq("name", name)
            .to_sql()?;
        let result = self.adapter.query(&stmt.sql, &stmt.params).await?;
        Ok(result.first().map(|row| {
            row.get("executed_at").and_then(|v| match v {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
        }))
    }

    async fn record(&self, name: &str) -> DbResult<()> {
        let stmt = QueryBuilder::new()
            .insert([("name", QueryParam::from(name))])
            .table(LEDGER_TABLE)
            .to_sql()?;
        self.adapter.query(&stmt.sql, &stmt.params).await?;
        Ok(())
    }

    async fn forget(&self, name: &str) -> DbResult<()> {
        let stmt = QueryBuilder::new()
            .delete()
            .from(LEDGER_TABLE)
            .where_eq("name", name)
            .to_sql()?;
        self.adapter.query(&stmt.sql, &stmt.params).await?;
        Ok(())
    }
}
