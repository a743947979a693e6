//! Parameter binding utilities.
//!
//! Binds [`QueryParam`] values positionally onto dialect-specific query objects.
//!
//! PostgreSQL receives parameters in binary form, so each value is converted
//! to the type the server resolved for its position before encoding. MySQL
//! and SQLite coerce loosely typed values themselves.

use crate::models::QueryParam;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgTypeInfo};
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::{BigDecimal, Json, Uuid};
use sqlx::{Encode, MySql, Postgres, Sqlite, Type, TypeInfo};
use std::borrow::Cow;
use std::str::FromStr;

pub(crate) fn bind_mysql<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &'q [QueryParam],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
            QueryParam::Json(v) => query.bind(Json(v)),
        };
    }
    query
}

/// Parse-time type hints for PostgreSQL. Strings and NULLs are left
/// unspecified so the server infers their type from the statement.
pub(crate) fn postgres_hints(params: &[QueryParam]) -> Vec<PgTypeInfo> {
    params
        .iter()
        .map(|param| match param {
            QueryParam::Null | QueryParam::String(_) => PgTypeInfo::with_oid(Oid(0)),
            QueryParam::Bool(_) => <bool as Type<Postgres>>::type_info(),
            QueryParam::Int(_) => <i64 as Type<Postgres>>::type_info(),
            QueryParam::Float(_) => <f64 as Type<Postgres>>::type_info(),
            QueryParam::Json(_) => <Json<JsonValue> as Type<Postgres>>::type_info(),
        })
        .collect()
}

/// Bind each parameter as the type the prepared statement declares at its
/// position. `targets` comes from the server's parameter description.
pub(crate) fn bind_postgres<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [QueryParam],
    targets: &[PgTypeInfo],
) -> Result<Query<'q, Postgres, PgArguments>, BoxDynError> {
    for (idx, param) in params.iter().enumerate() {
        query = match postgres_value(param, targets.get(idx))? {
            PgValue::Null(ty) => query.bind(TypedNull(ty)),
            PgValue::Bool(v) => query.bind(v),
            PgValue::Int2(v) => query.bind(v),
            PgValue::Int4(v) => query.bind(v),
            PgValue::Int8(v) => query.bind(v),
            PgValue::Float4(v) => query.bind(v),
            PgValue::Float8(v) => query.bind(v),
            PgValue::Numeric(v) => query.bind(v),
            PgValue::Text(v) => query.bind(v),
            PgValue::Json(v) => query.bind(Json(v)),
            PgValue::Uuid(v) => query.bind(v),
            PgValue::Timestamptz(v) => query.bind(v),
            PgValue::Timestamp(v) => query.bind(v),
            PgValue::Date(v) => query.bind(v),
            PgValue::Time(v) => query.bind(v),
        };
    }
    Ok(query)
}

/// A parameter converted to a concrete PostgreSQL type.
#[derive(Debug, PartialEq)]
enum PgValue<'a> {
    Null(PgTypeInfo),
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Numeric(BigDecimal),
    Text(Cow<'a, str>),
    Json(JsonValue),
    Uuid(Uuid),
    Timestamptz(DateTime<Utc>),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
}

/// NULL declared as the type the server resolved for its position.
struct TypedNull(PgTypeInfo);

impl Type<Postgres> for TypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for TypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(self.0.clone())
    }
}

fn is_text_type(name: &str) -> bool {
    matches!(
        name,
        "TEXT" | "VARCHAR" | "CHAR" | "NAME" | "CITEXT"
    )
}

fn mismatch(value: impl std::fmt::Display, target: &str) -> BoxDynError {
    format!("Cannot bind '{}' as {}", value, target).into()
}

fn postgres_value<'a>(
    param: &'a QueryParam,
    target: Option<&PgTypeInfo>,
) -> Result<PgValue<'a>, BoxDynError> {
    let name = target.map_or("UNKNOWN", |ty| ty.name());
    let value = match param {
        QueryParam::Null => PgValue::Null(
            target
                .cloned()
                .unwrap_or_else(|| PgTypeInfo::with_oid(Oid(0))),
        ),
        QueryParam::Bool(v) => match name {
            "INT2" | "INT4" | "INT8" => integer_value(i64::from(*v), name)?,
            "JSON" | "JSONB" => PgValue::Json(JsonValue::Bool(*v)),
            n if is_text_type(n) => PgValue::Text(Cow::Owned(v.to_string())),
            _ => PgValue::Bool(*v),
        },
        QueryParam::Int(v) => integer_value(*v, name)?,
        QueryParam::Float(v) => match name {
            "FLOAT4" => PgValue::Float4(*v as f32),
            "NUMERIC" => PgValue::Numeric(
                BigDecimal::from_str(&v.to_string()).map_err(|_| mismatch(v, name))?,
            ),
            "INT2" | "INT4" | "INT8" if v.fract() == 0.0 => integer_value(*v as i64, name)?,
            "INT2" | "INT4" | "INT8" => return Err(mismatch(v, name)),
            "JSON" | "JSONB" => PgValue::Json(JsonValue::from(*v)),
            n if is_text_type(n) => PgValue::Text(Cow::Owned(v.to_string())),
            _ => PgValue::Float8(*v),
        },
        QueryParam::String(s) => text_value(s, name)?,
        QueryParam::Json(v) => match name {
            n if is_text_type(n) => PgValue::Text(Cow::Owned(v.to_string())),
            _ => PgValue::Json(v.clone()),
        },
    };
    Ok(value)
}

fn integer_value<'a>(v: i64, target: &str) -> Result<PgValue<'a>, BoxDynError> {
    let value = match target {
        "INT2" => PgValue::Int2(i16::try_from(v).map_err(|_| mismatch(v, target))?),
        "INT4" => PgValue::Int4(i32::try_from(v).map_err(|_| mismatch(v, target))?),
        "FLOAT4" => PgValue::Float4(v as f32),
        "FLOAT8" => PgValue::Float8(v as f64),
        "NUMERIC" => PgValue::Numeric(BigDecimal::from(v)),
        "BOOL" => PgValue::Bool(v != 0),
        "JSON" | "JSONB" => PgValue::Json(JsonValue::from(v)),
        n if is_text_type(n) => PgValue::Text(Cow::Owned(v.to_string())),
        _ => PgValue::Int8(v),
    };
    Ok(value)
}

/// Convert a string parameter to the column's type. Types without a
/// conversion here are sent as text.
fn text_value<'a>(s: &'a str, target: &str) -> Result<PgValue<'a>, BoxDynError> {
    let trimmed = s.trim();
    let value = match target {
        "INT2" | "INT4" | "INT8" => {
            let v = trimmed.parse::<i64>().map_err(|_| mismatch(s, target))?;
            integer_value(v, target)?
        }
        "FLOAT4" | "FLOAT8" => {
            let v = trimmed.parse::<f64>().map_err(|_| mismatch(s, target))?;
            if target == "FLOAT4" {
                PgValue::Float4(v as f32)
            } else {
                PgValue::Float8(v)
            }
        }
        "NUMERIC" => {
            PgValue::Numeric(BigDecimal::from_str(trimmed).map_err(|_| mismatch(s, target))?)
        }
        "BOOL" => PgValue::Bool(parse_bool(trimmed).ok_or_else(|| mismatch(s, target))?),
        "UUID" => PgValue::Uuid(Uuid::parse_str(trimmed).map_err(|_| mismatch(s, target))?),
        "TIMESTAMPTZ" => PgValue::Timestamptz(
            parse_datetime(trimmed)
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|| parse_naive_datetime(trimmed).map(|dt| dt.and_utc()))
                .ok_or_else(|| mismatch(s, target))?,
        ),
        "TIMESTAMP" => PgValue::Timestamp(
            parse_naive_datetime(trimmed)
                .or_else(|| parse_datetime(trimmed).map(|dt| dt.naive_utc()))
                .ok_or_else(|| mismatch(s, target))?,
        ),
        "DATE" => PgValue::Date(
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .or_else(|| parse_naive_datetime(trimmed).map(|dt| dt.date()))
                .or_else(|| parse_datetime(trimmed).map(|dt| dt.date_naive()))
                .ok_or_else(|| mismatch(s, target))?,
        ),
        "TIME" => PgValue::Time(
            ["%H:%M:%S%.f", "%H:%M"]
                .iter()
                .find_map(|fmt| NaiveTime::parse_from_str(trimmed, fmt).ok())
                .ok_or_else(|| mismatch(s, target))?,
        ),
        "JSON" | "JSONB" => PgValue::Json(
            serde_json::from_str(s).unwrap_or_else(|_| JsonValue::String(s.to_string())),
        ),
        _ => PgValue::Text(Cow::Borrowed(s)),
    };
    Ok(value)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .or_else(|| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z").ok())
}

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

pub(crate) fn bind_sqlite<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [QueryParam],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
            // SQLite doesn't have native JSON type, store as string
            QueryParam::Json(v) => query.bind(v.to_string()),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pg<T: Type<Postgres>>() -> PgTypeInfo {
        T::type_info()
    }

    #[test]
    fn test_postgres_hints_leave_strings_and_nulls_unspecified() {
        let params = vec![
            QueryParam::Null,
            QueryParam::String("x".into()),
            QueryParam::Int(1),
            QueryParam::Bool(true),
        ];
        let hints = postgres_hints(&params);
        assert_eq!(hints[0], PgTypeInfo::with_oid(Oid(0)));
        assert_eq!(hints[1], PgTypeInfo::with_oid(Oid(0)));
        assert_eq!(hints[2], pg::<i64>());
        assert_eq!(hints[3], pg::<bool>());
    }

    #[test]
    fn test_null_takes_the_resolved_column_type() {
        let target = pg::<i32>();
        let value = postgres_value(&QueryParam::Null, Some(&target)).unwrap();
        assert_eq!(value, PgValue::Null(pg::<i32>()));

        let null = TypedNull(pg::<i32>());
        assert_eq!(<TypedNull as Encode<'_, Postgres>>::produces(&null), Some(pg::<i32>()));
    }

    #[test]
    fn test_string_converts_to_temporal_and_uuid_targets() {
        let param = QueryParam::String("2024-03-01T10:30:00Z".into());
        let value = postgres_value(&param, Some(&pg::<DateTime<Utc>>())).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(10, 30, 0))
            .unwrap()
            .and_utc();
        assert_eq!(value, PgValue::Timestamptz(expected));

        let param = QueryParam::String("2023-01-01".into());
        let value = postgres_value(&param, Some(&pg::<DateTime<Utc>>())).unwrap();
        assert!(matches!(value, PgValue::Timestamptz(_)));

        let value = postgres_value(&param, Some(&pg::<NaiveDate>())).unwrap();
        assert_eq!(value, PgValue::Date(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()));

        let id = "6f1c2a3e-8d1b-4c55-9a0e-2b7f5d4c3a21";
        let param = QueryParam::String(id.into());
        let value = postgres_value(&param, Some(&pg::<Uuid>())).unwrap();
        assert_eq!(value, PgValue::Uuid(Uuid::parse_str(id).unwrap()));
    }

    #[test]
    fn test_string_converts_to_numeric_targets() {
        let param = QueryParam::String("12.50".into());
        let value = postgres_value(&param, Some(&pg::<BigDecimal>())).unwrap();
        assert_eq!(value, PgValue::Numeric(BigDecimal::from_str("12.50").unwrap()));

        let param = QueryParam::String("42".into());
        assert_eq!(
            postgres_value(&param, Some(&pg::<i32>())).unwrap(),
            PgValue::Int4(42)
        );
    }

    #[test]
    fn test_string_stays_text_for_text_and_unknown_targets() {
        let param = QueryParam::String("alice".into());
        assert_eq!(
            postgres_value(&param, Some(&pg::<String>())).unwrap(),
            PgValue::Text(Cow::Borrowed("alice"))
        );
        assert_eq!(
            postgres_value(&param, None).unwrap(),
            PgValue::Text(Cow::Borrowed("alice"))
        );
    }

    #[test]
    fn test_unparseable_string_is_an_error() {
        let param = QueryParam::String("not-a-uuid".into());
        let err = postgres_value(&param, Some(&pg::<Uuid>())).unwrap_err();
        assert!(err.to_string().contains("Cannot bind 'not-a-uuid' as UUID"));
    }

    #[test]
    fn test_int_narrows_to_column_width() {
        let target = pg::<i16>();
        assert_eq!(
            postgres_value(&QueryParam::Int(7), Some(&target)).unwrap(),
            PgValue::Int2(7)
        );
        assert!(postgres_value(&QueryParam::Int(70_000), Some(&target)).is_err());
        assert_eq!(
            postgres_value(&QueryParam::Int(7), None).unwrap(),
            PgValue::Int8(7)
        );
    }

    #[test]
    fn test_json_goes_to_text_columns_as_a_string() {
        let param = QueryParam::Json(json!({"a": 1}));
        assert_eq!(
            postgres_value(&param, Some(&pg::<String>())).unwrap(),
            PgValue::Text(Cow::Owned("{\"a\":1}".to_string()))
        );
        assert_eq!(
            postgres_value(&param, Some(&pg::<Json<JsonValue>>())).unwrap(),
            PgValue::Json(json!({"a": 1}))
        );
    }
}
