use chrono::NaiveDate;
use sqlx::MySql;
use sqlx::mysql::MySqlArguments;
use sqlx::query::QueryAs;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    U64(u64),
    U8(u8),
    Str(String),
    Date(NaiveDate),
}

/// ===============================
/// Dynamic WHERE clause
/// ===============================
/// Conditions are ANDed in insertion order; each `?` in a condition consumes
/// one value, in the same order.
#[derive(Debug, Default)]
pub struct WhereClause {
    conditions: Vec<&'static str>,
    values: Vec<SqlValue>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, condition: &'static str, value: SqlValue) -> &mut Self {
        self.conditions.push(condition);
        self.values.push(value);
        self
    }

    /// Condition without placeholders.
    pub fn push_raw(&mut self, condition: &'static str) -> &mut Self {
        self.conditions.push(condition);
        self
    }

    pub fn sql(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

/// ===============================
/// Bind values onto a typed query
/// ===============================
pub fn bind_all<'q, O>(
    mut query: QueryAs<'q, MySql, O, MySqlArguments>,
    values: Vec<SqlValue>,
) -> QueryAs<'q, MySql, O, MySqlArguments> {
    for value in values {
        query = match value {
            SqlValue::U64(v) => query.bind(v),
            SqlValue::U8(v) => query.bind(v),
            SqlValue::Str(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
        };
    }
    query
}
