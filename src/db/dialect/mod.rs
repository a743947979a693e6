//! Dialect-specific SQL generation and statement execution.
//!
//! # Architecture
//!
//! Each backend lives in its own submodule:
//! - `postgres`: `$n` placeholders, SQLSTATE codes, `information_schema`
//! - `mysql`: backtick quoting, `AUTO_INCREMENT`, numeric error codes
//! - `sqlite`: `PRAGMA table_info`, `AUTOINCREMENT` on integer primary keys
//!
//! Every submodule exposes the same surface: a zero-sized type implementing
//! [`SqlDialect`] for pure DDL/catalog SQL, a `connect` function building that
//! dialect's pool, and a `run` function executing one statement on any sqlx
//! executor (a pool or a transaction's connection).

pub mod mysql;
pub mod postgres;
pub mod sqlite;

use crate::models::{
    ColumnDefinition, ConnectionConfig, DefaultValue, Dialect, IndexOptions,
};

/// Pure SQL generation for one dialect. No method performs I/O.
pub trait SqlDialect: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Quote an identifier, doubling embedded quote characters.
    fn quote_identifier(&self, name: &str) -> String;

    /// Native column type for a logical type.
    fn column_type(&self, column: &ColumnDefinition) -> String;

    /// Fragment appended after `PRIMARY KEY` for auto-increment columns.
    fn auto_increment_clause(&self, column: &ColumnDefinition) -> Option<&'static str>;

    fn boolean_literal(&self, value: bool) -> &'static str;

    /// Whether a native error code means "index already exists".
    fn is_duplicate_index_code(&self, code: &str) -> bool;

    /// Single-row query whose first column is truthy when the table exists.
    /// Takes the table name as its only parameter.
    fn table_exists_sql(&self) -> &'static str;

    /// Catalog query returning `column_name, data_type, is_nullable,
    /// column_default, primary_key` in ordinal order. Takes the table name as
    /// its only parameter.
    fn column_info_sql(&self) -> &'static str;

    /// Whether `CREATE INDEX IF NOT EXISTS` is understood.
    fn supports_index_if_not_exists(&self) -> bool {
        true
    }

    fn default_value_sql(&self, value: &DefaultValue) -> String {
        match value {
            DefaultValue::Null => "NULL".to_string(),
            DefaultValue::Bool(b) => self.boolean_literal(*b).to_string(),
            DefaultValue::Int(i) => i.to_string(),
            DefaultValue::Float(f) => f.to_string(),
            DefaultValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            DefaultValue::Now => "CURRENT_TIMESTAMP".to_string(),
        }
    }

    /// One column of a `CREATE TABLE` body.
    fn column_definition_sql(&self, column: &ColumnDefinition) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&column.name),
            self.column_type(column)
        );
        if column.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if let Some(clause) = self.auto_increment_clause(column) {
            sql.push(' ');
            sql.push_str(clause);
        }
        if !column.allow_null && !column.primary_key {
            sql.push_str(" NOT NULL");
        }
        if column.unique && !column.primary_key {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = &column.default_value {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.default_value_sql(default));
        }
        sql
    }

    fn create_table_sql(&self, table: &str, columns: &[ColumnDefinition]) -> String {
        let body = columns
            .iter()
            .map(|c| self.column_definition_sql(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.quote_identifier(table),
            body
        )
    }

    fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote_identifier(table))
    }

    fn create_index_sql(
        &self,
        table: &str,
        index_name: &str,
        columns: &[&str],
        options: IndexOptions,
    ) -> String {
        let unique = if options.unique { "UNIQUE " } else { "" };
        let if_not_exists = if self.supports_index_if_not_exists() {
            "IF NOT EXISTS "
        } else {
            ""
        };
        let column_list = columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE {}INDEX {}{} ON {} ({})",
            unique,
            if_not_exists,
            self.quote_identifier(index_name),
            self.quote_identifier(table),
            column_list
        )
    }
}

/// SQL generator for a dialect.
pub fn sql_dialect(dialect: Dialect) -> &'static dyn SqlDialect {
    match dialect {
        Dialect::Postgres => &postgres::PostgresDialect,
        Dialect::MySql => &mysql::MySqlDialect,
        Dialect::Sqlite => &sqlite::SqliteDialect,
    }
}

pub(crate) fn quote_with(name: &str, quote: char) -> String {
    let doubled = format!("{quote}{quote}");
    format!("{quote}{}{quote}", name.replace(quote, &doubled))
}

/// Whether a statement's leading keyword is INSERT. Only inserts report an
/// `insert_id`.
pub(crate) fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("insert"))
}

/// Pool sizing shared by every dialect.
pub(crate) fn pool_options<DB: sqlx::Database>(
    config: &ConnectionConfig,
) -> sqlx::pool::PoolOptions<DB> {
    let opts = &config.pool;
    let options = sqlx::pool::PoolOptions::<DB>::new()
        .max_connections(opts.max_connections_or_default(config.dialect == Dialect::Sqlite))
        .min_connections(opts.min_connections_or_default())
        .acquire_timeout(opts.acquire_timeout())
        .idle_timeout(Some(opts.idle_timeout()))
        .max_lifetime(opts.max_lifetime());

    // Every connection to :memory: opens a fresh database, so the pool must
    // keep exactly one connection alive for the adapter's lifetime.
    if config.is_memory() {
        options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        options
    }
}
