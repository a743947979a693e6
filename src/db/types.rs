//! Row decoding into JSON.
//!
//! Every adapter returns rows as JSON objects so callers see the same shape
//! regardless of dialect.
//!
//! # Architecture
//!
//! Decoding is two-phase:
//! 1. `categorize_type` classifies the column's native type name
//! 2. A dialect decoder extracts the value using the Rust types that dialect's
//!    driver accepts for that category
//!
//! Decoding never fails: a value the driver refuses to decode becomes `null`.

use crate::models::{Dialect, Row as JsonRow};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Temporal,
    Null,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, dialect: Dialect) -> TypeCategory {
    let lower = type_name.to_lowercase();

    if lower == "null" {
        return TypeCategory::Null;
    }

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if dialect == Dialect::Sqlite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    // "interval" and "point" contain "int"; temporal names never do
    if lower.starts_with("timestamp")
        || lower.starts_with("datetime")
        || lower == "date"
        || lower.starts_with("time")
    {
        return TypeCategory::Temporal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if (lower.contains("int") && lower != "interval" && lower != "point")
        || lower.contains("serial")
    {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    TypeCategory::Text
}

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
            PgValueFormat::Binary => numeric_text(value.as_bytes()?).map(RawDecimal),
        }
    }
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Render a binary `NUMERIC` the way PostgreSQL prints it, keeping the
/// declared scale (`12.50` stays `12.50`).
///
/// Layout: `ndigits`, `weight`, `sign`, `dscale` as 16-bit big-endian words,
/// then `ndigits` base-10000 digits. The first digit is worth
/// `10000^weight`.
fn numeric_text(buf: &[u8]) -> Result<String, sqlx::error::BoxDynError> {
    let word = |i: usize| -> Result<u16, sqlx::error::BoxDynError> {
        buf.get(i * 2..i * 2 + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated NUMERIC value".into())
    };

    let ndigits = word(0)? as usize;
    let weight = word(1)? as i16 as i32;
    let sign = word(2)?;
    let dscale = word(3)? as usize;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| word(4 + i))
        .collect::<Result<Vec<_>, _>>()?;
    let digit = |i: i32| -> u16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG && digits.iter().any(|&d| d != 0) {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight {
            if i == 0 {
                out.push_str(&digit(i).to_string());
            } else {
                out.push_str(&format!("{:04}", digit(i)));
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(i)));
            i += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Ok(out)
}

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> JsonRow;
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> JsonRow {
        collect_columns(self, Dialect::Postgres, postgres::decode_column)
    }
}

impl RowToJson for MySqlRow {
    fn to_json_map(&self) -> JsonRow {
        collect_columns(self, Dialect::MySql, mysql::decode_column)
    }
}

impl RowToJson for SqliteRow {
    fn to_json_map(&self) -> JsonRow {
        collect_columns(self, Dialect::Sqlite, sqlite::decode_column)
    }
}

fn collect_columns<R, F>(row: &R, dialect: Dialect, decode: F) -> JsonRow
where
    R: Row,
    F: Fn(&R, usize, TypeCategory) -> JsonValue,
{
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let category = categorize_type(col.type_info().name(), dialect);
            (col.name().to_string(), decode(row, idx, category))
        })
        .collect()
}

/// Decode a nullable column, treating decode failures as absent.
fn get<'r, R, T>(row: &'r R, idx: usize) -> Option<T>
where
    R: Row,
    T: Decode<'r, R::Database> + Type<R::Database>,
    usize: ColumnIndex<R>,
{
    row.try_get::<Option<T>, _>(idx).ok().flatten()
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

fn binary_value(bytes: Vec<u8>) -> JsonValue {
    JsonValue::String(STANDARD.encode(bytes))
}

/// Decode a text column, parsing it when the declared type is JSON.
fn text_value(text: String, category: TypeCategory) -> JsonValue {
    if category == TypeCategory::Json {
        if let Ok(json) = serde_json::from_str::<JsonValue>(&text) {
            return json;
        }
    }
    JsonValue::String(text)
}

/// Temporal columns render as RFC 3339 / ISO 8601 strings.
fn temporal_value<R>(row: &R, idx: usize) -> Option<JsonValue>
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> DateTime<Utc>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveDateTime: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveDate: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> NaiveTime: Decode<'r, R::Database> + Type<R::Database>,
{
    let text = get::<R, DateTime<Utc>>(row, idx)
        .map(|v| v.to_rfc3339())
        .or_else(|| get::<R, NaiveDateTime>(row, idx).map(|v| v.to_string()))
        .or_else(|| get::<R, NaiveDate>(row, idx).map(|v| v.to_string()))
        .or_else(|| get::<R, NaiveTime>(row, idx).map(|v| v.to_string()))?;
    Some(JsonValue::String(text))
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        let value = match category {
            TypeCategory::Null => None,
            TypeCategory::Integer => get::<_, i64>(row, idx)
                .or_else(|| get::<_, i32>(row, idx).map(i64::from))
                .or_else(|| get::<_, i16>(row, idx).map(i64::from))
                .map(JsonValue::from),
            TypeCategory::Float => get::<_, f64>(row, idx)
                .or_else(|| get::<_, f32>(row, idx).map(f64::from))
                .map(float_value),
            TypeCategory::Decimal => {
                get::<_, RawDecimal>(row, idx).map(|v| JsonValue::String(v.0))
            }
            TypeCategory::Boolean => get::<_, bool>(row, idx).map(JsonValue::Bool),
            TypeCategory::Json => get::<_, JsonValue>(row, idx),
            TypeCategory::Uuid => {
                get::<_, sqlx::types::Uuid>(row, idx).map(|v| JsonValue::String(v.to_string()))
            }
            TypeCategory::Temporal => temporal_value(row, idx),
            TypeCategory::Binary => get::<_, Vec<u8>>(row, idx).map(binary_value),
            TypeCategory::Text => get::<_, String>(row, idx).map(JsonValue::String),
        };
        value.unwrap_or(JsonValue::Null)
    }
}

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        let value = match category {
            TypeCategory::Null => None,
            TypeCategory::Integer => get::<_, i64>(row, idx)
                .map(JsonValue::from)
                .or_else(|| get::<_, u64>(row, idx).map(JsonValue::from))
                .or_else(|| get::<_, i32>(row, idx).map(JsonValue::from))
                .or_else(|| get::<_, i8>(row, idx).map(JsonValue::from)),
            TypeCategory::Float => get::<_, f64>(row, idx)
                .or_else(|| get::<_, f32>(row, idx).map(f64::from))
                .map(float_value),
            TypeCategory::Decimal => {
                get::<_, RawDecimal>(row, idx).map(|v| JsonValue::String(v.0))
            }
            TypeCategory::Boolean => get::<_, bool>(row, idx).map(JsonValue::Bool),
            // MySQL JSON type decodes as serde_json::Value directly
            TypeCategory::Json => get::<_, JsonValue>(row, idx),
            TypeCategory::Temporal => temporal_value(row, idx),
            TypeCategory::Binary => get::<_, Vec<u8>>(row, idx).map(binary_value),
            TypeCategory::Uuid | TypeCategory::Text => {
                get::<_, String>(row, idx).map(|v| text_value(v, category))
            }
        };
        value.unwrap_or(JsonValue::Null)
    }
}

mod sqlite {
    use super::*;
    use sqlx::ValueRef;

    /// Decode by the value's storage class. Expression columns carry no
    /// declared type, so the runtime class is authoritative.
    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
        let storage = match row.try_get_raw(idx) {
            Ok(raw) if !raw.is_null() => raw.type_info().name().to_ascii_uppercase(),
            _ => return JsonValue::Null,
        };
        let value = match storage.as_str() {
            "INTEGER" => get::<_, i64>(row, idx).map(JsonValue::from),
            "REAL" => get::<_, f64>(row, idx).map(float_value),
            "BLOB" => get::<_, Vec<u8>>(row, idx).map(binary_value),
            _ => get::<_, String>(row, idx).map(|v| text_value(v, category)),
        };
        value.unwrap_or(JsonValue::Null)
    }
}
