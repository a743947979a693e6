//! PostgreSQL dialect.

use super::{SqlDialect, pool_options, quote_with};
use crate::db::params::{bind_postgres, postgres_hints};
use crate::db::types::RowToJson;
use crate::models::{ColumnDefinition, ColumnType, ConnectionConfig, Dialect, QueryParam, QueryResult};
use futures_util::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::{Acquire, ConnectOptions, Either, Executor, PgPool, Postgres, Statement};
use std::borrow::Cow;

pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_with(name, '"')
    }

    fn column_type(&self, column: &ColumnDefinition) -> String {
        match column.column_type {
            ColumnType::Integer if column.auto_increment => "SERIAL".to_string(),
            ColumnType::BigInt if column.auto_increment => "BIGSERIAL".to_string(),
            ColumnType::String(len) => format!("VARCHAR({})", len),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::Float => "REAL".to_string(),
            ColumnType::Double => "DOUBLE PRECISION".to_string(),
            ColumnType::Decimal(p, s) => format!("DECIMAL({}, {})", p, s),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Date => "TIMESTAMP WITH TIME ZONE".to_string(),
            ColumnType::DateOnly => "DATE".to_string(),
            ColumnType::Json => "JSON".to_string(),
            ColumnType::Jsonb => "JSONB".to_string(),
            ColumnType::Uuid => "UUID".to_string(),
        }
    }

    // Auto-increment is expressed through SERIAL types.
    fn auto_increment_clause(&self, _column: &ColumnDefinition) -> Option<&'static str> {
        None
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }

    /// Index DDL uses `IF NOT EXISTS`, so `42P07` here means a table, view
    /// or sequence already holds the name and must surface.
    fn is_duplicate_index_code(&self, _code: &str) -> bool {
        false
    }

    fn table_exists_sql(&self) -> &'static str {
        r#"
        SELECT EXISTS (
            SELECT 1 FROM information_schema.tables
            WHERE table_schema = current_schema() AND table_name = ?
        ) AS table_exists
        "#
    }

    fn column_info_sql(&self) -> &'static str {
        r#"
        SELECT
            c.column_name::text AS column_name,
            c.data_type::text AS data_type,
            c.is_nullable::text AS is_nullable,
            c.column_default::text AS column_default,
            EXISTS (
                SELECT 1
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                    ON tc.constraint_name = kcu.constraint_name
                    AND tc.table_schema = kcu.table_schema
                WHERE tc.table_name = c.table_name
                AND tc.table_schema = c.table_schema
                AND tc.constraint_type = 'PRIMARY KEY'
                AND kcu.column_name = c.column_name
            ) AS primary_key
        FROM information_schema.columns c
        WHERE c.table_name = ? AND c.table_schema = current_schema()
        ORDER BY c.ordinal_position
        "#
    }
}

pub(crate) async fn connect(config: &ConnectionConfig) -> Result<PgPool, sqlx::Error> {
    let ssl_mode = match (config.ssl.enabled, config.ssl.reject_unauthorized) {
        (false, _) => PgSslMode::Disable,
        (true, false) => PgSslMode::Require,
        (true, true) => PgSslMode::VerifyFull,
    };

    let mut options = PgConnectOptions::new()
        .host(config.host.as_deref().unwrap_or("localhost"))
        .port(config.port_or_default())
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

    pool_options::<Postgres>(config)
        .connect_with(options.disable_statement_logging())
        .await
}

/// Execute one statement. PostgreSQL never reports an insert id; use
/// `RETURNING` to read generated keys.
///
/// Parameterized statements are prepared first so every parameter can be
/// encoded as the type the server resolved for it.
pub(crate) async fn run<'c, A>(
    conn: A,
    sql: &str,
    params: &[QueryParam],
) -> Result<QueryResult, sqlx::Error>
where
    A: Acquire<'c, Database = Postgres>,
{
    let mut conn = conn.acquire().await?;
    let mut rows = Vec::new();
    let mut rows_affected = 0;

    let translated;
    let statement;
    let mut stream = if params.is_empty() {
        (&mut *conn).fetch_many(sql)
    } else {
        translated = translate_placeholders(sql);
        statement = (&mut *conn)
            .prepare_with(&translated, &postgres_hints(params))
            .await?;
        let targets = match statement.parameters() {
            Some(Either::Left(types)) => types,
            _ => &[],
        };
        let query =
            bind_postgres(statement.query(), params, targets).map_err(sqlx::Error::Encode)?;
        (&mut *conn).fetch_many(query)
    };
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(done) => rows_affected += done.rows_affected(),
            Either::Right(row) => rows.push(row.to_json_map()),
        }
    }

    Ok(QueryResult::from_parts(rows, rows_affected, None))
}

/// Rewrite `?` placeholders as `$1..$n`.
///
/// Question marks inside string literals, quoted identifiers, dollar-quoted
/// bodies and comments are left alone.
pub fn translate_placeholders(sql: &str) -> Cow<'_, str> {
    if !sql.contains('?') {
        return Cow::Borrowed(sql);
    }

    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                let end = find_closing(&chars, i + 1, c);
                out.extend(&chars[i..end]);
                i = end;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                let end = chars[i..]
                    .iter()
                    .position(|&ch| ch == '\n')
                    .map_or(chars.len(), |p| i + p);
                out.extend(&chars[i..end]);
                i = end;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let end = find_sequence(&chars, i + 2, &['*', '/']);
                out.extend(&chars[i..end]);
                i = end;
            }
            '$' => match dollar_tag(&chars, i) {
                Some(tag) => {
                    let end = find_sequence(&chars, i + tag.len(), &tag);
                    out.extend(&chars[i..end]);
                    i = end;
                }
                None => {
                    out.push(c);
                    i += 1;
                }
            },
            '?' => {
                index += 1;
                out.push('$');
                out.push_str(&index.to_string());
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Cow::Owned(out)
}

/// Index just past the closing quote; a doubled quote is an escape.
fn find_closing(chars: &[char], mut i: usize, quote: char) -> usize {
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

/// Index just past the next occurrence of `needle` at or after `start`.
fn find_sequence(chars: &[char], start: usize, needle: &[char]) -> usize {
    let mut i = start;
    while i + needle.len() <= chars.len() {
        if chars[i..i + needle.len()] == *needle {
            return i + needle.len();
        }
        i += 1;
    }
    chars.len()
}

/// `$tag$` opener at `start`, if any. `$1` style parameters are not tags.
fn dollar_tag(chars: &[char], start: usize) -> Option<Vec<char>> {
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == '$' {
            return Some(chars[start..=i].to_vec());
        }
        if !(c.is_alphanumeric() || c == '_') || (i == start + 1 && c.is_ascii_digit()) {
            return None;
        }
        i += 1;
    }
    None
}
