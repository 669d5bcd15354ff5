//! Query execution engine
//!
//! `sql` renders dialect-generic SQL text; `QueryEngine` executes it over
//! the connection pool and converts rows to JSON keyed by exposed field
//! names (statements alias every selected column).

pub mod sql;

pub use sql::{
    build_count, build_delete, build_insert, build_select, build_update, dialect_for,
    render_predicate, SelectSpec, SqlDialect,
};

use base64::Engine as _;
use serde_json::{Map as JsonMap, Value as JsonValue};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};

use crate::config::DatabaseType;
use crate::error::RequestError;
use crate::query::params::SqlValue;

pub struct QueryEngine {
    pool: SqlitePool,
    database_type: DatabaseType,
    dialect: Box<dyn SqlDialect>,
}

impl QueryEngine {
    pub fn new(pool: SqlitePool, database_type: DatabaseType) -> Self {
        Self {
            pool,
            database_type,
            dialect: dialect_for(database_type),
        }
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    pub fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn fetch_all(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<JsonValue>, RequestError> {
        tracing::debug!(sql, params = params.len(), "executing query");
        let mut query = sqlx::query(sql);
        for value in params {
            query = value.bind_to_query(query);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_json).collect()
    }

    pub async fn fetch_optional(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<JsonValue>, RequestError> {
        let mut rows = self.fetch_all(sql, params).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    pub async fn fetch_count(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<i64, RequestError> {
        let mut query = sqlx::query_scalar::<_, i64>(sql);
        for value in params {
            query = value.bind_to_scalar(query);
        }
        Ok(query.fetch_one(&self.pool).await?)
    }

    /// Stored procedures exist in metadata and the generated schema, but
    /// SQLite has no procedure execution to back them.
    pub async fn execute_procedure(
        &self,
        entity: &str,
    ) -> Result<Vec<JsonValue>, RequestError> {
        Err(RequestError::Unsupported(format!(
            "stored procedure '{}' cannot be executed on sqlite",
            entity
        )))
    }
}

/// Convert one row to a JSON object keyed by result-column name.
fn row_to_json(row: &SqliteRow) -> Result<JsonValue, RequestError> {
    let mut map = JsonMap::new();
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            JsonValue::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "INT4" | "INT8" | "BIGINT" => {
                    JsonValue::from(row.try_get::<i64, _>(index)?)
                }
                "REAL" => match serde_json::Number::from_f64(row.try_get::<f64, _>(index)?) {
                    Some(n) => JsonValue::Number(n),
                    None => JsonValue::Null,
                },
                "BOOLEAN" => JsonValue::Bool(row.try_get::<bool, _>(index)?),
                "BLOB" => {
                    let bytes = row.try_get::<Vec<u8>, _>(index)?;
                    JsonValue::String(base64::engine::general_purpose::STANDARD.encode(bytes))
                }
                _ => JsonValue::String(row.try_get::<String, _>(index)?),
            }
        };
        map.insert(column.name().to_string(), value);
    }
    Ok(JsonValue::Object(map))
}
