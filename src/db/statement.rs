//! Parameterized statements and typed column patches.
//!
//! Handlers never splice values into SQL. They describe the columns they want
//! written as a [`Patch`], which compiles into a [`Statement`] whose parameters
//! are bound positionally when the connection manager runs it.

use sqlx::any::{Any, AnyArguments, AnyRow};
use sqlx::query::{Query, QueryAs};
use sqlx::FromRow;

/// A single bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append a positional parameter
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Shortened SQL for log lines
    pub fn summary(&self) -> String {
        let compact: String = self.sql.split_whitespace().collect::<Vec<_>>().join(" ");
        if compact.len() > 100 {
            let cut = (0..=100).rev().find(|i| compact.is_char_boundary(*i)).unwrap_or(0);
            format!("{}...", &compact[..cut])
        } else {
            compact
        }
    }

    pub(crate) fn query(&self) -> Query<'_, Any, AnyArguments<'_>> {
        let mut query = sqlx::query::<Any>(&self.sql);
        for param in &self.params {
            query = match param {
                Value::Null => query.bind(None::<String>),
                Value::Int(v) => query.bind(*v),
                Value::Float(v) => query.bind(*v),
                Value::Text(v) => query.bind(v.as_str()),
            };
        }
        query
    }

    pub(crate) fn query_as<T>(&self) -> QueryAs<'_, Any, T, AnyArguments<'_>>
    where
        T: for<'r> FromRow<'r, AnyRow>,
    {
        let mut query = sqlx::query_as::<Any, T>(&self.sql);
        for param in &self.params {
            query = match param {
                Value::Null => query.bind(None::<String>),
                Value::Int(v) => query.bind(*v),
                Value::Float(v) => query.bind(*v),
                Value::Text(v) => query.bind(v.as_str()),
            };
        }
        query
    }
}

/// Column assignments for an insert or a partial update.
///
/// Only columns that were explicitly set end up in the compiled statement, so an
/// update touches exactly the fields the client supplied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    assignments: Vec<(&'static str, Value)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a column, replacing any earlier assignment to it
    pub fn set(&mut self, column: &'static str, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        match self.assignments.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.assignments.push((column, value)),
        }
        self
    }

    /// Assign a column only when a value was supplied
    pub fn set_opt<T: Into<Value>>(&mut self, column: &'static str, value: Option<T>) -> &mut Self {
        if let Some(value) = value {
            self.set(column, value);
        }
        self
    }

    /// Assign a nullable column: absent leaves it alone, `Some(None)` clears it
    pub fn set_nullable<T: Into<Value>>(
        &mut self,
        column: &'static str,
        value: Option<Option<T>>,
    ) -> &mut Self {
        if let Some(value) = value {
            self.set(column, Value::from(value));
        }
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.assignments
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.assignments.iter().map(|(c, _)| *c)
    }

    /// `INSERT INTO table (id, ..., created_at, updated_at) VALUES (?, ...)`
    pub fn into_insert(self, table: &str, id: &str, now: &str) -> Statement {
        let mut columns = vec!["id"];
        columns.extend(self.assignments.iter().map(|(c, _)| *c));
        columns.push("created_at");
        columns.push("updated_at");

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders
        );

        let mut stmt = Statement::new(sql).bind(id);
        for (_, value) in self.assignments {
            stmt = stmt.bind(value);
        }
        stmt.bind(now).bind(now)
    }

    /// `UPDATE table SET a = ?, ..., updated_at = ? WHERE id = ?`
    pub fn into_update(self, table: &str, id: &str, now: &str) -> Statement {
        let mut sets: Vec<String> = self
            .assignments
            .iter()
            .map(|(c, _)| format!("{} = ?", c))
            .collect();
        sets.push("updated_at = ?".to_string());

        let sql = format!("UPDATE {} SET {} WHERE id = ?", table, sets.join(", "));

        let mut stmt = Statement::new(sql);
        for (_, value) in self.assignments {
            stmt = stmt.bind(value);
        }
        stmt.bind(now).bind(id)
    }
}
