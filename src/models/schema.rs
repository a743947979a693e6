//! Schema-related data models.
//!
//! Logical column types and constraints used by `create_table`, index options,
//! the column layout returned by `get_schema`, and adapter health reports.

use serde::{Deserialize, Serialize};

/// Logical column type, mapped to a native type per dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    /// Variable-length string with a maximum length
    String(u32),
    Text,
    Integer,
    BigInt,
    Float,
    Double,
    /// Precision and scale
    Decimal(u8, u8),
    Boolean,
    /// Date and time
    Date,
    /// Calendar date without time
    DateOnly,
    Json,
    Jsonb,
    Uuid,
}

impl ColumnType {
    /// VARCHAR(255)
    pub const STRING: ColumnType = ColumnType::String(255);
    /// DECIMAL(10, 2)
    pub const DECIMAL: ColumnType = ColumnType::Decimal(10, 2);
}

/// Column default expressed independently of dialect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// CURRENT_TIMESTAMP
    Now,
}

/// One column in a `create_table` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    /// Default: true
    pub allow_null: bool,
    pub default_value: Option<DefaultValue>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            auto_increment: false,
            unique: false,
            allow_null: true,
            default_value: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.allow_null = false;
        self
    }

    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.default_value = Some(value);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    pub unique: bool,
}

impl IndexOptions {
    pub fn unique() -> Self {
        Self { unique: true }
    }
}

/// Column layout reported by the dialect's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub column_name: String,
    /// Native type name as reported by the database
    pub data_type: String,
    pub is_nullable: bool,
    pub column_default: Option<String>,
    pub primary_key: bool,
}

/// Connection state reported by a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Connected,
    Disconnected,
    Error,
}

/// Health of a single adapter. Produced without ever raising.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterHealth {
    pub healthy: bool,
    pub status: HealthState,
    pub dialect: crate::models::Dialect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_definition_builder() {
        let column = ColumnDefinition::new("email", ColumnType::STRING)
            .unique()
            .not_null();
        assert_eq!(column.column_type, ColumnType::String(255));
        assert!(column.unique);
        assert!(!column.allow_null);
        assert!(!column.primary_key);
    }

    #[test]
    fn test_health_serialization() {
        let health = AdapterHealth {
            healthy: false,
            status: HealthState::Disconnected,
            dialect: crate::models::Dialect::Sqlite,
            response_time_ms: None,
            error: None,
        };
        let value = serde_json::to_value(&health).unwrap();
        assert_eq!(value["status"], "disconnected");
        assert_eq!(value["dialect"], "sqlite");
        assert!(value.get("error").is_none());
    }
}
