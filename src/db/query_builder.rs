//! Dialect-neutral statement builder.
//!
//! [`QueryBuilder`] accumulates one SELECT, INSERT, UPDATE or DELETE and
//! renders it as SQL with `?` placeholders plus the positional parameters in
//! the same left-to-right order. Rendering is pure; only [`QueryBuilder::execute`]
//! touches the database.
//!
//! # Predicate tags
//!
//! Every WHERE predicate carries an AND/OR tag. The first predicate is rendered
//! without its tag and every later one is preceded by its own. `where_in`,
//! `where_between` and `where_like` are always tagged AND, so they render as
//! `AND` wherever they appear after the first position:
//!
//! ```ignore
//! builder.where_eq("a", 1).or_where_eq("b", 2).where_in("c", [3]);
//! // WHERE a = ? OR b = ? AND c IN (?)
//! ```

use crate::db::adapter::Adapter;
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, QueryResult};
use std::fmt;
use std::sync::Arc;

/// Comparison operator for `where_op`, `or_where_op` and `having`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

impl JoinKind {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conjunction {
    And,
    Or,
}

#[derive(Debug, Clone)]
enum Condition {
    Compare {
        field: String,
        op: Operator,
        value: QueryParam,
    },
    In {
        field: String,
        values: Vec<QueryParam>,
    },
    Between {
        field: String,
        low: QueryParam,
        high: QueryParam,
    },
}

#[derive(Debug, Clone)]
struct Predicate {
    conjunction: Conjunction,
    condition: Condition,
}

#[derive(Debug, Clone)]
struct Join {
    kind: JoinKind,
    table: String,
    condition: String,
}

#[derive(Debug, Clone)]
struct Having {
    field: String,
    op: Operator,
    value: QueryParam,
}

#[derive(Debug, Clone, Default)]
struct QueryState {
    operation: Option<Operation>,
    table: Option<String>,
    fields: Vec<String>,
    data: Vec<(String, QueryParam)>,
    wheres: Vec<Predicate>,
    joins: Vec<Join>,
    order_by: Vec<(String, SortDirection)>,
    group_by: Vec<String>,
    having: Vec<Having>,
    limit: Option<u64>,
    offset: Option<u64>,
}

/// Rendered statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

/// Fluent statement builder, optionally bound to an adapter for `execute`.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    adapter: Option<Arc<Adapter>>,
    state: QueryState,
}

impl QueryBuilder {
    /// An unbound builder; it can render SQL but not execute it.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_adapter(adapter: Arc<Adapter>) -> Self {
        Self {
            adapter: Some(adapter),
            state: QueryState::default(),
        }
    }

    /// `SELECT fields`. An empty list selects `*`.
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.operation = Some(Operation::Select);
        self.state.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.state.table = Some(table.into());
        self
    }

    /// Alias of [`from`](Self::from) that reads better for writes.
    pub fn table(self, table: impl Into<String>) -> Self {
        self.from(table)
    }

    /// `INSERT` with columns in iteration order.
    pub fn insert<I, K, V>(mut self, data: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryParam>,
    {
        self.state.operation = Some(Operation::Insert);
        self.state.data = collect_data(data);
        self
    }

    /// `UPDATE ... SET` with columns in iteration order.
    pub fn update<I, K, V>(mut self, data: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryParam>,
    {
        self.state.operation = Some(Operation::Update);
        self.state.data = collect_data(data);
        self
    }

    pub fn delete(mut self) -> Self {
        self.state.operation = Some(Operation::Delete);
        self
    }

    /// `field = value`, tagged AND.
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.where_op(field, Operator::Eq, value)
    }

    /// `field <op> value`, tagged AND.
    pub fn where_op(
        self,
        field: impl Into<String>,
        op: Operator,
        value: impl Into<QueryParam>,
    ) -> Self {
        self.push_compare(Conjunction::And, field.into(), op, value.into())
    }

    /// `field = value`, tagged OR.
    pub fn or_where_eq(self, field: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.or_where_op(field, Operator::Eq, value)
    }

    /// `field <op> value`, tagged OR.
    pub fn or_where_op(
        self,
        field: impl Into<String>,
        op: Operator,
        value: impl Into<QueryParam>,
    ) -> Self {
        self.push_compare(Conjunction::Or, field.into(), op, value.into())
    }

    /// `field IN (?, ...)`, always tagged AND. An empty list renders `1 = 0`.
    pub fn where_in<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<QueryParam>,
    {
        self.state.wheres.push(Predicate {
            conjunction: Conjunction::And,
            condition: Condition::In {
                field: field.into(),
                values: values.into_iter().map(Into::into).collect(),
            },
        });
        self
    }

    /// `field BETWEEN ? AND ?`, always tagged AND.
    pub fn where_between(
        mut self,
        field: impl Into<String>,
        low: impl Into<QueryParam>,
        high: impl Into<QueryParam>,
    ) -> Self {
        self.state.wheres.push(Predicate {
            conjunction: Conjunction::And,
            condition: Condition::Between {
                field: field.into(),
                low: low.into(),
                high: high.into(),
            },
        });
        self
    }

    /// `field LIKE ?`, always tagged AND.
    pub fn where_like(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.push_compare(
            Conjunction::And,
            field.into(),
            Operator::Like,
            QueryParam::String(pattern.into()),
        )
    }

    fn push_compare(
        mut self,
        conjunction: Conjunction,
        field: String,
        op: Operator,
        value: QueryParam,
    ) -> Self {
        self.state.wheres.push(Predicate {
            conjunction,
            condition: Condition::Compare { field, op, value },
        });
        self
    }

    pub fn join(self, table: impl Into<String>, condition: impl Into<String>) -> Self {
        self.push_join(JoinKind::Inner, table.into(), condition.into())
    }

    pub fn left_join(self, table: impl Into<String>, condition: impl Into<String>) -> Self {
        self.push_join(JoinKind::Left, table.into(), condition.into())
    }

    pub fn right_join(self, table: impl Into<String>, condition: impl Into<String>) -> Self {
        self.push_join(JoinKind::Right, table.into(), condition.into())
    }

    fn push_join(mut self, kind: JoinKind, table: String, condition: String) -> Self {
        self.state.joins.push(Join {
            kind,
            table,
            condition,
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.state.order_by.push((field.into(), direction));
        self
    }

    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .group_by
            .extend(fields.into_iter().map(Into::into));
        self
    }

    /// `HAVING field <op> ?`; multiple calls are joined with AND.
    pub fn having(
        mut self,
        field: impl Into<String>,
        op: Operator,
        value: impl Into<QueryParam>,
    ) -> Self {
        self.state.having.push(Having {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.state.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.state.offset = Some(offset);
        self
    }

    /// One-indexed page: `LIMIT per_page OFFSET (page - 1) * per_page`.
    /// Page 0 is treated as page 1.
    pub fn paginate(self, page: u64, per_page: u64) -> Self {
        let offset = page.saturating_sub(1).saturating_mul(per_page);
        self.limit(per_page).offset(offset)
    }

    pub fn operation(&self) -> Option<Operation> {
        self.state.operation
    }

    /// Clear the statement, keeping the adapter binding.
    pub fn reset(&mut self) {
        self.state = QueryState::default();
    }

    /// Render the statement. Performs no I/O and does not change the builder.
    pub fn to_sql(&self) -> DbResult<SqlStatement> {
        let state = &self.state;
        let operation = state.operation.ok_or_else(|| {
            DbError::invalid_query("No operation set; call select, insert, update or delete")
        })?;
        let table = state
            .table
            .as_deref()
            .ok_or_else(|| DbError::invalid_query("No table set; call from or table"))?;

        let mut params = Vec::new();
        let sql = match operation {
            Operation::Select => {
                let fields = if state.fields.is_empty() {
                    "*".to_string()
                } else {
                    state.fields.join(", ")
                };
                let mut sql = format!("SELECT {} FROM {}", fields, table);
                for join in &state.joins {
                    sql.push_str(&format!(
                        " {} {} ON {}",
                        join.kind.as_sql(),
                        join.table,
                        join.condition
                    ));
                }
                self.render_where(&mut sql, &mut params);
                if !state.group_by.is_empty() {
                    sql.push_str(" GROUP BY ");
                    sql.push_str(&state.group_by.join(", "));
                }
                if !state.having.is_empty() {
                    let clauses = state
                        .having
                        .iter()
                        .map(|h| {
                            params.push(h.value.clone());
                            format!("{} {} ?", h.field, h.op)
                        })
                        .collect::<Vec<_>>();
                    sql.push_str(" HAVING ");
                    sql.push_str(&clauses.join(" AND "));
                }
                if !state.order_by.is_empty() {
                    let clauses = state
                        .order_by
                        .iter()
                        .map(|(field, dir)| format!("{} {}", field, dir.as_sql()))
                        .collect::<Vec<_>>();
                    sql.push_str(" ORDER BY ");
                    sql.push_str(&clauses.join(", "));
                }
                if let Some(limit) = state.limit {
                    sql.push_str(&format!(" LIMIT {}", limit));
                }
                if let Some(offset) = state.offset {
                    sql.push_str(&format!(" OFFSET {}", offset));
                }
                sql
            }
            Operation::Insert => {
                if state.data.is_empty() {
                    return Err(DbError::invalid_query("INSERT requires at least one column"));
                }
                let columns = state
                    .data
                    .iter()
                    .map(|(k, _)| k.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                let placeholders = vec!["?"; state.data.len()].join(", ");
                params.extend(state.data.iter().map(|(_, v)| v.clone()));
                format!("INSERT INTO {} ({}) VALUES ({})", table, columns, placeholders)
            }
            Operation::Update => {
                if state.data.is_empty() {
                    return Err(DbError::invalid_query("UPDATE requires at least one column"));
                }
                let assignments = state
                    .data
                    .iter()
                    .map(|(k, v)| {
                        params.push(v.clone());
                        format!("{} = ?", k)
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut sql = format!("UPDATE {} SET {}", table, assignments);
                self.render_where(&mut sql, &mut params);
                sql
            }
            Operation::Delete => {
                let mut sql = format!("DELETE FROM {}", table);
                self.render_where(&mut sql, &mut params);
                sql
            }
        };

        Ok(SqlStatement { sql, params })
    }

    fn render_where(&self, sql: &mut String, params: &mut Vec<QueryParam>) {
        if self.state.wheres.is_empty() {
            return;
        }
        sql.push_str(" WHERE ");
        for (i, predicate) in self.state.wheres.iter().enumerate() {
            if i > 0 {
                sql.push_str(match predicate.conjunction {
                    Conjunction::And => " AND ",
                    Conjunction::Or => " OR ",
                });
            }
            match &predicate.condition {
                Condition::Compare { field, op, value } => {
                    sql.push_str(&format!("{} {} ?", field, op));
                    params.push(value.clone());
                }
                Condition::In { values, .. } if values.is_empty() => {
                    // Nothing is a member of the empty set.
                    sql.push_str("1 = 0");
                }
                Condition::In { field, values } => {
                    let placeholders = vec!["?"; values.len()].join(", ");
                    sql.push_str(&format!("{} IN ({})", field, placeholders));
                    params.extend(values.iter().cloned());
                }
                Condition::Between { field, low, high } => {
                    sql.push_str(&format!("{} BETWEEN ? AND ?", field));
                    params.push(low.clone());
                    params.push(high.clone());
                }
            }
        }
    }

    /// Render, run on the bound adapter, then reset the builder.
    ///
    /// The builder is reset even when rendering or execution fails.
    pub async fn execute(&mut self) -> DbResult<QueryResult> {
        let statement = self.to_sql();
        self.reset();
        let adapter = self.adapter.clone().ok_or_else(|| {
            DbError::invalid_query("Query builder is not bound to an adapter")
        })?;
        let statement = statement?;
        adapter.query(&statement.sql, &statement.params).await
    }
}

fn collect_data<I, K, V>(data: I) -> Vec<(String, QueryParam)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<QueryParam>,
{
    data.into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
