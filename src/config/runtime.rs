//! Declarative runtime configuration
//!
//! The runtime configuration is a JSON document describing the database
//! objects to expose (tables, views, stored procedures), the permission rules
//! per role, relationships between entities, and column aliasing. It is
//! parsed once at startup and may be replaced wholesale on hot reload -
//! every derived artifact (metadata, authorization tables, GraphQL schema,
//! EDM models) is rebuilt from scratch when that happens.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Root of the runtime configuration document.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    #[serde(rename = "data-source")]
    pub data_source: DataSourceConfig,

    pub entities: BTreeMap<String, EntityConfig>,
}

impl RuntimeConfig {
    /// Load and parse the configuration from a file on disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config at {}", path.display()))?;
        Self::from_json(&raw)
    }

    /// Parse the configuration from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("failed to parse runtime config")
    }
}

/// Which database engine backs the gateway.
///
/// A closed set: adding an engine means adding a variant and a dialect
/// implementation, selected once at configuration load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataSourceConfig {
    #[serde(rename = "database-type")]
    pub database_type: DatabaseType,

    /// Optional override for the connection string from the environment.
    #[serde(rename = "connection-string", default)]
    pub connection_string: Option<String>,
}

/// A single exposed entity: its backing database object, permissions,
/// relationships and field aliasing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntityConfig {
    pub source: EntitySource,

    #[serde(default)]
    pub permissions: Vec<PermissionConfig>,

    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipConfig>,

    /// Backing column name -> exposed API field name.
    #[serde(default)]
    pub mappings: BTreeMap<String, String>,

    #[serde(default)]
    pub graphql: GraphqlEntityConfig,

    #[serde(default)]
    pub rest: RestEntityConfig,

    /// Auto-synthesized many-to-many junction entity. Never exposed as a
    /// standalone queryable type; its column permissions are immaterial.
    #[serde(rename = "is-linking-entity", default)]
    pub is_linking_entity: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntitySource {
    /// Qualified object name: "schema.name" or just "name".
    pub object: String,

    #[serde(rename = "type", default)]
    pub kind: SourceKind,

    /// Primary-key override for views (which have no declared key).
    #[serde(rename = "key-fields", default)]
    pub key_fields: Vec<String>,

    /// Declared result-set shape for stored procedures. An empty list means
    /// the procedure returns no declared columns; the generated object type
    /// then exposes a single opaque `result` field.
    #[serde(rename = "result-columns", default)]
    pub result_columns: Vec<ResultColumnConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum SourceKind {
    #[default]
    #[serde(rename = "table")]
    Table,
    #[serde(rename = "view")]
    View,
    #[serde(rename = "stored-procedure")]
    StoredProcedure,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResultColumnConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub system_type: String,

    #[serde(default = "default_true")]
    pub nullable: bool,
}

fn default_true() -> bool {
    true
}

/// Permissions for one role on one entity.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PermissionConfig {
    pub role: String,
    pub actions: Vec<ActionConfig>,
}

/// An action entry is either a bare operation name (`"read"`, `"*"`) or a
/// detailed object carrying field restrictions and a database policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ActionConfig {
    Name(Operation),
    Detailed {
        action: Operation,
        #[serde(default)]
        fields: Option<FieldsConfig>,
        #[serde(default)]
        policy: Option<PolicyConfig>,
    },
}

impl ActionConfig {
    pub fn operation(&self) -> Operation {
        match self {
            ActionConfig::Name(op) => *op,
            ActionConfig::Detailed { action, .. } => *action,
        }
    }

    pub fn fields(&self) -> Option<&FieldsConfig> {
        match self {
            ActionConfig::Name(_) => None,
            ActionConfig::Detailed { fields, .. } => fields.as_ref(),
        }
    }

    pub fn policy(&self) -> Option<&PolicyConfig> {
        match self {
            ActionConfig::Name(_) => None,
            ActionConfig::Detailed { policy, .. } => policy.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Execute,
    /// Wildcard: expands to all operations valid for the source kind
    /// (execute for stored procedures, CRUD for tables/views).
    #[serde(rename = "*")]
    All,
}

/// Include/exclude column lists for an action. `include: ["*"]` means all
/// columns; exclusions win over inclusions.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FieldsConfig {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// A row-level policy predicate pushed into the database query.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyConfig {
    /// OData-style boolean expression over `@claims.x` and `@item.field`.
    pub database: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelationshipConfig {
    /// "one" or "many"; validated at schema-build time.
    pub cardinality: String,

    #[serde(rename = "target-entity")]
    pub target_entity: String,

    /// FK columns on this entity's side, when not inferable from metadata.
    #[serde(rename = "source-fields", default)]
    pub source_fields: Vec<String>,

    /// FK columns on the target's side, paired with `source_fields`.
    #[serde(rename = "target-fields", default)]
    pub target_fields: Vec<String>,
}

/// Relationship multiplicity: whether the relationship field resolves to a
/// single object or a paginated collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

impl Cardinality {
    /// Parse the configured cardinality string; `None` for anything
    /// unrecognized (a schema-build error at the call site).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "one" => Some(Cardinality::One),
            "many" => Some(Cardinality::Many),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GraphqlEntityConfig {
    #[serde(default)]
    pub enabled: Option<bool>,

    /// Singular type name override. When absent the entity name is used
    /// unmodified - no automatic singularization heuristics.
    #[serde(default)]
    pub singular: Option<String>,

    /// Plural field name override for list queries.
    #[serde(default)]
    pub plural: Option<String>,
}

impl GraphqlEntityConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RestEntityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for RestEntityConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
