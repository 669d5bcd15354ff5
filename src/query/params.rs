//! SQL bind values and the per-request parameter store
//!
//! Every user-supplied literal travels through here as a typed bind value;
//! predicates reference parameters by index and never embed user text.

use crate::error::RequestError;
use crate::metadata::ScalarKind;

/// A SQL value that can be bound to a parameterized query.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl SqlValue {
    /// Bind this value to a sqlx query builder.
    #[cfg(feature = "sqlite")]
    pub fn bind_to_query<'q>(
        &'q self,
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        match self {
            SqlValue::String(s) => query.bind(s.as_str()),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Bool(b) => query.bind(if *b { 1i32 } else { 0i32 }),
            SqlValue::Null => query.bind(None::<String>),
        }
    }

    /// Bind this value to a sqlx scalar query (counts and the like).
    #[cfg(feature = "sqlite")]
    pub fn bind_to_scalar<'q, T>(
        &'q self,
        query: sqlx::query::QueryScalar<'q, sqlx::Sqlite, T, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> sqlx::query::QueryScalar<'q, sqlx::Sqlite, T, sqlx::sqlite::SqliteArguments<'q>> {
        match self {
            SqlValue::String(s) => query.bind(s.as_str()),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Bool(b) => query.bind(if *b { 1i32 } else { 0i32 }),
            SqlValue::Null => query.bind(None::<String>),
        }
    }

    /// Convert a GraphQL input value to a typed bind value for the given
    /// scalar kind. `None` means the value does not fit the kind.
    pub fn from_graphql(kind: ScalarKind, value: &async_graphql::Value) -> Option<SqlValue> {
        use async_graphql::Value as Gql;

        match (kind, value) {
            (_, Gql::Null) => Some(SqlValue::Null),

            (ScalarKind::Boolean, Gql::Boolean(b)) => Some(SqlValue::Bool(*b)),

            (ScalarKind::Byte, Gql::Number(n)) => {
                let v = n.as_i64()?;
                u8::try_from(v).ok().map(|b| SqlValue::Int(i64::from(b)))
            }
            (ScalarKind::Short, Gql::Number(n)) => {
                let v = n.as_i64()?;
                i16::try_from(v).ok().map(|s| SqlValue::Int(i64::from(s)))
            }
            (ScalarKind::Int, Gql::Number(n)) => {
                let v = n.as_i64()?;
                i32::try_from(v).ok().map(|i| SqlValue::Int(i64::from(i)))
            }
            (ScalarKind::Long, Gql::Number(n)) => n.as_i64().map(SqlValue::Int),

            (ScalarKind::Single | ScalarKind::Float, Gql::Number(n)) => {
                n.as_f64().map(SqlValue::Float)
            }

            (ScalarKind::Decimal, Gql::Number(n)) => Some(SqlValue::String(n.to_string())),
            (ScalarKind::Decimal, Gql::String(s)) => Some(SqlValue::String(s.clone())),

            (
                ScalarKind::String
                | ScalarKind::Uuid
                | ScalarKind::DateTime
                | ScalarKind::LocalTime
                | ScalarKind::ByteArray,
                Gql::String(s),
            ) => Some(SqlValue::String(s.clone())),

            _ => None,
        }
    }
}

/// Ordered collection of bind values for a single query. Predicates refer to
/// entries by index; the engine binds them in order.
#[derive(Debug, Default)]
pub struct ParamStore {
    values: Vec<SqlValue>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bind value, returning its parameter index.
    pub fn add(&mut self, value: SqlValue) -> usize {
        self.values.push(value);
        self.values.len() - 1
    }

    /// Register a GraphQL input value typed against a scalar kind.
    pub fn add_graphql(
        &mut self,
        kind: ScalarKind,
        value: &async_graphql::Value,
    ) -> Result<usize, RequestError> {
        let sql = SqlValue::from_graphql(kind, value).ok_or_else(|| RequestError::InvalidLiteral {
            literal: value.to_string(),
            target_type: kind.graphql_type_name().to_string(),
        })?;
        Ok(self.add(sql))
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql::Value as Gql;

    #[test]
    fn test_from_graphql_integer_widths() {
        let n = Gql::from(300);
        assert_eq!(SqlValue::from_graphql(ScalarKind::Byte, &n), None);
        assert_eq!(
            SqlValue::from_graphql(ScalarKind::Short, &n),
            Some(SqlValue::Int(300))
        );
    }

    #[test]
    fn test_from_graphql_type_mismatch() {
        let s = Gql::from("not a number");
        assert_eq!(SqlValue::from_graphql(ScalarKind::Int, &s), None);
    }

    #[test]
    fn test_param_store_indices_in_order() {
        let mut params = ParamStore::new();
        assert_eq!(params.add(SqlValue::Int(1)), 0);
        assert_eq!(params.add(SqlValue::String("x".into())), 1);
        assert_eq!(params.values().len(), 2);
    }

    #[test]
    fn test_add_graphql_reports_literal_and_type() {
        let mut params = ParamStore::new();
        let err = params
            .add_graphql(ScalarKind::Int, &Gql::from("oops"))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("oops"));
        assert!(msg.contains("Int"));
    }
}
