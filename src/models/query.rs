//! Query-related data models.
//!
//! Parameter values bound to `?` placeholders and the uniform result shape every
//! adapter returns.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    String(String),
    /// Bound as JSON on PostgreSQL/MySQL, as text on SQLite
    Json(JsonValue),
}

impl QueryParam {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Json(_) => "json",
        }
    }

    /// Interpret a command-line literal: JSON scalars keep their type,
    /// anything that is not valid JSON is a string.
    pub fn parse_literal(text: &str) -> Self {
        match serde_json::from_str::<JsonValue>(text) {
            Ok(value) => Self::from(value),
            Err(_) => Self::String(text.to_string()),
        }
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for QueryParam {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&String> for QueryParam {
    fn from(v: &String) -> Self {
        Self::String(v.clone())
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Scalars map onto their native variants; arrays and objects stay JSON.
impl From<JsonValue> for QueryParam {
    fn from(v: JsonValue) -> Self {
        match v {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map_or(Self::Null, Self::Float),
            },
            JsonValue::String(s) => Self::String(s),
            other => Self::Json(other),
        }
    }
}

/// One decoded row, keyed by column name.
pub type Row = serde_json::Map<String, JsonValue>;

/// Result of one statement, identical in shape across dialects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    /// Rows returned, or rows affected for statements that return none.
    pub row_count: u64,
    /// Generated key of the last inserted row (MySQL `insertId`, SQLite `lastID`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,
}

impl QueryResult {
    pub(crate) fn from_parts(rows: Vec<Row>, rows_affected: u64, insert_id: Option<i64>) -> Self {
        let row_count = if rows.is_empty() {
            rows_affected
        } else {
            rows.len() as u64
        };
        Self {
            rows,
            row_count,
            insert_id,
            affected_rows: Some(rows_affected),
        }
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Value of `column` in the first row.
    pub fn scalar(&self, column: &str) -> Option<&JsonValue> {
        self.first().and_then(|row| row.get(column))
    }
}
