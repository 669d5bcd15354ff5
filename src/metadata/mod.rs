//! Database object metadata
//!
//! Immutable descriptions of the tables, views and stored procedures the
//! gateway exposes. Built once during metadata discovery at startup or hot
//! reload and shared read-only by the schema builder, the filter parsers and
//! the query engine.

pub mod introspect;
pub mod provider;
pub mod scalars;

pub use provider::MetadataProvider;
pub use scalars::{ScalarKind, default_literal, scalar_kind_of};

use std::collections::BTreeMap;

use crate::config::SourceKind;

/// A table, view or stored procedure, as discovered from the database plus
/// the entity configuration.
#[derive(Debug, Clone)]
pub struct DatabaseObject {
    /// Schema portion of the qualified name; empty for engines without
    /// schema namespaces (SQLite).
    pub schema: String,
    pub name: String,
    pub kind: SourceKind,
    pub source: SourceDefinition,
}

impl DatabaseObject {
    /// `schema.name`, or just `name` when there is no schema.
    pub fn qualified_name(&self) -> String {
        if self.schema.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }
}

/// Ordered column definitions plus key and relationship metadata.
#[derive(Debug, Clone, Default)]
pub struct SourceDefinition {
    /// Columns in declaration order.
    pub columns: Vec<ColumnDefinition>,

    /// Primary-key column names in declaration order.
    pub primary_key: Vec<String>,

    /// Related entity name -> foreign-key definitions. Always empty for
    /// stored procedures.
    pub relationships: BTreeMap<String, Vec<ForeignKeyDefinition>>,
}

impl SourceDefinition {
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_key.iter().any(|pk| pk == name)
    }
}

/// A single column: name, native type, nullability and value-generation
/// metadata. Every column belongs to exactly one [`DatabaseObject`].
#[derive(Debug, Clone)]
pub struct ColumnDefinition {
    pub name: String,

    /// Native system type as declared in the database (e.g. "INTEGER",
    /// "nvarchar"). Must map to exactly one [`ScalarKind`]; unmapped types
    /// are a hard error at schema-build time.
    pub system_type: String,

    pub nullable: bool,

    /// Autogenerated / read-only (e.g. a rowid-aliased integer key).
    pub is_autogenerated: bool,

    pub default_value: Option<serde_json::Value>,
}

/// A foreign key between two database objects.
///
/// Multiple definitions may exist between the same two tables in each
/// direction; relationship inference also produces speculative zero-column
/// entries which must be dropped before use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDefinition {
    /// Qualified name of the table holding the FK columns.
    pub referencing_table: String,
    /// Qualified name of the table being referenced.
    pub referenced_table: String,
    pub referencing_columns: Vec<String>,
    pub referenced_columns: Vec<String>,
}

impl ForeignKeyDefinition {
    /// Speculative relationship-inference entries carry no columns; they are
    /// deduplicated away before nullability inference.
    pub fn is_degenerate(&self) -> bool {
        self.referencing_columns.is_empty()
    }
}
