//! Native system type -> API scalar kind mapping
//!
//! Leaf dependency for schema generation, filter typing and literal
//! conversion. The mapping is a total function over a fixed whitelist of
//! native types; anything else is a fatal schema-build error - an entity with
//! an unmappable column cannot be exposed at all.

use async_graphql::{Name, Number, Value};

/// The fixed set of API scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    String,
    Uuid,
    Byte,
    Short,
    Int,
    Long,
    Single,
    Float,
    Decimal,
    Boolean,
    DateTime,
    ByteArray,
    LocalTime,
}

impl ScalarKind {
    /// GraphQL type name for the scalar. Built-ins map to the standard
    /// scalars; the rest are registered as custom scalars on the schema.
    pub fn graphql_type_name(&self) -> &'static str {
        match self {
            ScalarKind::String => "String",
            ScalarKind::Uuid => "UUID",
            ScalarKind::Byte => "Byte",
            ScalarKind::Short => "Short",
            ScalarKind::Int => "Int",
            ScalarKind::Long => "Long",
            ScalarKind::Single => "Single",
            ScalarKind::Float => "Float",
            ScalarKind::Decimal => "Decimal",
            ScalarKind::Boolean => "Boolean",
            ScalarKind::DateTime => "DateTime",
            ScalarKind::ByteArray => "ByteArray",
            ScalarKind::LocalTime => "LocalTime",
        }
    }

    /// Name of the shared filter input type for this scalar kind
    /// (one per kind, shared across all entities).
    pub fn filter_input_name(&self) -> String {
        format!("{}FilterInput", self.graphql_type_name())
    }

    /// Whether the scalar supports the string pattern operators
    /// (`contains`, `startsWith`, ...).
    pub fn supports_like(&self) -> bool {
        matches!(self, ScalarKind::String)
    }

    /// Whether the scalar supports ordered comparisons (`lt`, `gte`, ...).
    pub fn supports_ordering(&self) -> bool {
        !matches!(self, ScalarKind::Boolean | ScalarKind::ByteArray)
    }

    /// Kinds that are not GraphQL built-ins and need a scalar registration.
    pub fn is_custom(&self) -> bool {
        !matches!(
            self,
            ScalarKind::String | ScalarKind::Int | ScalarKind::Float | ScalarKind::Boolean
        )
    }

    /// All kinds, in a stable order (used to register shared input types).
    pub fn all() -> &'static [ScalarKind] {
        &[
            ScalarKind::String,
            ScalarKind::Uuid,
            ScalarKind::Byte,
            ScalarKind::Short,
            ScalarKind::Int,
            ScalarKind::Long,
            ScalarKind::Single,
            ScalarKind::Float,
            ScalarKind::Decimal,
            ScalarKind::Boolean,
            ScalarKind::DateTime,
            ScalarKind::ByteArray,
            ScalarKind::LocalTime,
        ]
    }
}

/// Map a native system type to its scalar kind.
///
/// Accepts the type names emitted by SQLite declarations and the common
/// relational spellings (SQL Server, Postgres, MySQL). Type parameters like
/// `varchar(255)` are ignored. Returns `None` for anything outside the
/// whitelist - the caller turns that into a fatal schema-build error.
pub fn scalar_kind_of(system_type: &str) -> Option<ScalarKind> {
    let normalized = system_type
        .split('(')
        .next()
        .unwrap_or(system_type)
        .trim()
        .to_ascii_lowercase();

    let kind = match normalized.as_str() {
        "text" | "varchar" | "nvarchar" | "char" | "nchar" | "string" | "clob" | "ntext" => {
            ScalarKind::String
        }
        "uuid" | "guid" | "uniqueidentifier" => ScalarKind::Uuid,
        "tinyint" => ScalarKind::Byte,
        "smallint" | "int2" => ScalarKind::Short,
        "int" | "integer" | "int4" | "mediumint" => ScalarKind::Int,
        "bigint" | "int8" => ScalarKind::Long,
        // "real" is the 4-byte float in SQL Server terms; "float"/"double"
        // are the 8-byte kind.
        "real" => ScalarKind::Single,
        "float" | "double" | "double precision" | "float8" => ScalarKind::Float,
        "decimal" | "numeric" | "money" | "smallmoney" => ScalarKind::Decimal,
        "bit" | "bool" | "boolean" => ScalarKind::Boolean,
        "datetime" | "datetime2" | "smalldatetime" | "date" | "timestamp" | "timestamptz"
        | "datetimeoffset" => ScalarKind::DateTime,
        "blob" | "binary" | "varbinary" | "image" | "bytea" => ScalarKind::ByteArray,
        "time" | "timespan" => ScalarKind::LocalTime,
        _ => return None,
    };

    Some(kind)
}

/// Convert a column default value into a typed GraphQL literal for embedding
/// in generated schema metadata.
///
/// Numeric kinds are range-checked rather than silently widened or narrowed;
/// a default that does not fit its declared kind yields `None` and the
/// default is omitted from the schema.
pub fn default_literal(kind: ScalarKind, raw: &serde_json::Value) -> Option<Value> {
    use serde_json::Value as Json;

    match (kind, raw) {
        (_, Json::Null) => Some(Value::Null),

        (ScalarKind::Boolean, Json::Bool(b)) => Some(Value::Boolean(*b)),
        (ScalarKind::Boolean, Json::Number(n)) => n.as_i64().map(|i| Value::Boolean(i != 0)),

        (ScalarKind::Byte, Json::Number(n)) => {
            let v = n.as_i64()?;
            u8::try_from(v).ok().map(|b| Value::Number(Number::from(b)))
        }
        (ScalarKind::Short, Json::Number(n)) => {
            let v = n.as_i64()?;
            i16::try_from(v).ok().map(|s| Value::Number(Number::from(s)))
        }
        (ScalarKind::Int, Json::Number(n)) => {
            let v = n.as_i64()?;
            i32::try_from(v).ok().map(|i| Value::Number(Number::from(i)))
        }
        (ScalarKind::Long, Json::Number(n)) => {
            n.as_i64().map(|l| Value::Number(Number::from(l)))
        }

        (ScalarKind::Single | ScalarKind::Float, Json::Number(n)) => {
            let f = n.as_f64()?;
            Number::from_f64(f).map(Value::Number)
        }

        // Decimal defaults keep their exact textual form.
        (ScalarKind::Decimal, Json::Number(n)) => Some(Value::String(n.to_string())),
        (ScalarKind::Decimal, Json::String(s)) => Some(Value::String(s.clone())),

        (
            ScalarKind::String
            | ScalarKind::Uuid
            | ScalarKind::DateTime
            | ScalarKind::LocalTime
            | ScalarKind::ByteArray,
            Json::String(s),
        ) => Some(Value::String(s.clone())),

        _ => None,
    }
}

/// Convenience for building object values in tests and resolvers.
#[allow(dead_code)]
pub fn named(name: &str) -> Name {
    Name::new(name)
}
