//! SQLite dialect.

use super::{SqlDialect, is_insert, pool_options, quote_with};
use crate::db::params::bind_sqlite;
use crate::db::types::RowToJson;
use crate::models::{ColumnDefinition, ColumnType, ConnectionConfig, Dialect, QueryParam, QueryResult};
use futures_util::TryStreamExt;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Either, Executor, Sqlite, SqlitePool};
use std::str::FromStr;

pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_with(name, '"')
    }

    // No native BOOLEAN or JSON: booleans are stored as INTEGER, JSON as TEXT.
    fn column_type(&self, column: &ColumnDefinition) -> String {
        match column.column_type {
            ColumnType::String(_) | ColumnType::Text => "TEXT",
            ColumnType::Integer | ColumnType::BigInt => "INTEGER",
            ColumnType::Float | ColumnType::Double => "REAL",
            ColumnType::Decimal(..) => "NUMERIC",
            ColumnType::Boolean => "INTEGER",
            ColumnType::Date => "DATETIME",
            ColumnType::DateOnly => "DATE",
            ColumnType::Json | ColumnType::Jsonb | ColumnType::Uuid => "TEXT",
        }
        .to_string()
    }

    /// AUTOINCREMENT is only legal on an INTEGER PRIMARY KEY.
    fn auto_increment_clause(&self, column: &ColumnDefinition) -> Option<&'static str> {
        let integer = matches!(column.column_type, ColumnType::Integer | ColumnType::BigInt);
        (column.auto_increment && column.primary_key && integer).then_some("AUTOINCREMENT")
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    fn is_duplicate_index_code(&self, _code: &str) -> bool {
        false
    }

    fn table_exists_sql(&self) -> &'static str {
        "SELECT COUNT(*) AS table_exists FROM sqlite_master WHERE type = 'table' AND name = ?"
    }

    fn column_info_sql(&self) -> &'static str {
        r#"
        SELECT
            name AS column_name,
            type AS data_type,
            CASE WHEN "notnull" = 0 THEN 'YES' ELSE 'NO' END AS is_nullable,
            dflt_value AS column_default,
            pk > 0 AS primary_key
        FROM pragma_table_info(?)
        ORDER BY cid
        "#
    }
}

pub(crate) async fn connect(config: &ConnectionConfig) -> Result<SqlitePool, sqlx::Error> {
    let options = if config.is_memory() {
        SqliteConnectOptions::from_str("sqlite::memory:")?
    } else {
        SqliteConnectOptions::new()
            .filename(config.storage.as_deref().unwrap_or_default())
            .create_if_missing(true)
    };

    pool_options::<Sqlite>(config)
        .connect_with(options.disable_statement_logging())
        .await
}

pub(crate) async fn run<'c, E>(
    executor: E,
    sql: &str,
    params: &[QueryParam],
) -> Result<QueryResult, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let mut rows = Vec::new();
    let mut rows_affected = 0;
    let mut last_insert_rowid = 0;

    let mut stream = if params.is_empty() {
        executor.fetch_many(sql)
    } else {
        executor.fetch_many(bind_sqlite(sqlx::query(sql), params))
    };
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(done) => {
                rows_affected += done.rows_affected();
                last_insert_rowid = done.last_insert_rowid();
            }
            Either::Right(row) => rows.push(row.to_json_map()),
        }
    }

    let insert_id = is_insert(sql).then_some(last_insert_rowid);
    Ok(QueryResult::from_parts(rows, rows_affected, insert_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_types() {
        let d = SqliteDialect;
        assert_eq!(d.column_type(&ColumnDefinition::new("a", ColumnType::Boolean)), "INTEGER");
        assert_eq!(d.column_type(&ColumnDefinition::new("b", ColumnType::Json)), "TEXT");
        assert_eq!(d.column_type(&ColumnDefinition::new("c", ColumnType::STRING)), "TEXT");
    }

    #[test]
    fn test_autoincrement_requires_integer_primary_key() {
        let d = SqliteDialect;
        let pk = ColumnDefinition::new("id", ColumnType::Integer)
            .primary_key()
            .auto_increment();
        assert_eq!(d.auto_increment_clause(&pk), Some("AUTOINCREMENT"));
        let not_pk = ColumnDefinition::new("n", ColumnType::Integer).auto_increment();
        assert_eq!(d.auto_increment_clause(&not_pk), None);
    }

    #[tokio::test]
    async fn test_run_reports_insert_id_for_inserts_only() {
        let pool = connect(&ConnectionConfig::sqlite_memory()).await.unwrap();
        run(&pool, "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &[])
            .await
            .unwrap();

        let inserted = run(&pool, "INSERT INTO t (v) VALUES (?)", &[QueryParam::from("a")])
            .await
            .unwrap();
        assert_eq!(inserted.insert_id, Some(1));
        assert_eq!(inserted.affected_rows, Some(1));

        let selected = run(&pool, "SELECT id, v FROM t WHERE v = ?", &[QueryParam::from("a")])
            .await
            .unwrap();
        assert_eq!(selected.insert_id, None);
        assert_eq!(selected.row_count, 1);
        assert_eq!(selected.scalar("v"), Some(&serde_json::json!("a")));
    }
}
