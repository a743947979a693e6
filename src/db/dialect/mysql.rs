//! MySQL dialect.

use super::{SqlDialect, is_insert, pool_options, quote_with};
use crate::db::params::bind_mysql;
use crate::db::types::RowToJson;
use crate::models::{ColumnDefinition, ColumnType, ConnectionConfig, Dialect, QueryParam, QueryResult};
use futures_util::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlSslMode};
use sqlx::{ConnectOptions, Either, Executor, MySql, MySqlPool};

/// ER_DUP_KEYNAME: "Duplicate key name". MySQL has no `CREATE INDEX IF NOT EXISTS`.
const ER_DUP_KEYNAME: &str = "1061";

pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_with(name, '`')
    }

    fn column_type(&self, column: &ColumnDefinition) -> String {
        match column.column_type {
            ColumnType::String(len) => format!("VARCHAR({})", len),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Integer => "INT".to_string(),
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::Double => "DOUBLE".to_string(),
            ColumnType::Decimal(p, s) => format!("DECIMAL({}, {})", p, s),
            ColumnType::Boolean => "TINYINT(1)".to_string(),
            ColumnType::Date => "DATETIME".to_string(),
            ColumnType::DateOnly => "DATE".to_string(),
            ColumnType::Json | ColumnType::Jsonb => "JSON".to_string(),
            ColumnType::Uuid => "CHAR(36)".to_string(),
        }
    }

    fn auto_increment_clause(&self, column: &ColumnDefinition) -> Option<&'static str> {
        column.auto_increment.then_some("AUTO_INCREMENT")
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    fn is_duplicate_index_code(&self, code: &str) -> bool {
        code == ER_DUP_KEYNAME
    }

    fn table_exists_sql(&self) -> &'static str {
        r#"
        SELECT COUNT(*) AS table_exists
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
        "#
    }

    fn column_info_sql(&self) -> &'static str {
        r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8mb4) AS column_name,
            CONVERT(DATA_TYPE USING utf8mb4) AS data_type,
            CONVERT(IS_NULLABLE USING utf8mb4) AS is_nullable,
            CONVERT(COLUMN_DEFAULT USING utf8mb4) AS column_default,
            COLUMN_KEY = 'PRI' AS primary_key
        FROM information_schema.columns
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
        "#
    }

    fn supports_index_if_not_exists(&self) -> bool {
        false
    }
}

pub(crate) async fn connect(config: &ConnectionConfig) -> Result<MySqlPool, sqlx::Error> {
    let ssl_mode = match (config.ssl.enabled, config.ssl.reject_unauthorized) {
        (false, _) => MySqlSslMode::Disabled,
        (true, false) => MySqlSslMode::Required,
        (true, true) => MySqlSslMode::VerifyIdentity,
    };

    let mut options = MySqlConnectOptions::new()
        .host(config.host.as_deref().unwrap_or("localhost"))
        .port(config.port_or_default())
        .charset("utf8mb4")
        .ssl_mode(ssl_mode);
    if let Some(database) = &config.database {
        options = options.database(database);
    }
    if let Some(username) = &config.username {
        options = options.username(username);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }

    pool_options::<MySql>(config)
        .connect_with(options.disable_statement_logging())
        .await
}

pub(crate) async fn run<'c, E>(
    executor: E,
    sql: &str,
    params: &[QueryParam],
) -> Result<QueryResult, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    let mut rows = Vec::new();
    let mut rows_affected = 0;
    let mut last_insert_id = 0;

    let mut stream = if params.is_empty() {
        executor.fetch_many(sql)
    } else {
        executor.fetch_many(bind_mysql(sqlx::query(sql), params))
    };
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(done) => {
                rows_affected += done.rows_affected();
                last_insert_id = done.last_insert_id();
            }
            Either::Right(row) => rows.push(row.to_json_map()),
        }
    }

    let insert_id = is_insert(sql)
        .then(|| i64::try_from(last_insert_id).ok())
        .flatten();
    Ok(QueryResult::from_parts(rows, rows_affected, insert_id))
}
