//! Metadata provider: entity <-> database object resolution and aliasing
//!
//! Read-only dictionaries built once per snapshot. Every lookup the filter
//! parsers, schema builder and REST layer need at request time is O(1) here.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::error::SchemaBuildError;

use super::{ColumnDefinition, DatabaseObject, SourceDefinition};

#[derive(Debug)]
pub struct MetadataProvider {
    objects: HashMap<String, Arc<DatabaseObject>>,
    /// entity -> exposed field name -> backing column name
    backing: HashMap<String, HashMap<String, String>>,
    /// entity -> backing column name -> exposed field name
    exposed: HashMap<String, HashMap<String, String>>,
}

impl MetadataProvider {
    /// Build the provider from parsed configuration and discovered objects.
    ///
    /// Validates that every configured mapping names a real backing column.
    pub fn build(
        config: &RuntimeConfig,
        objects: HashMap<String, DatabaseObject>,
    ) -> Result<Self, SchemaBuildError> {
        let mut backing: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut exposed: HashMap<String, HashMap<String, String>> = HashMap::new();

        for (entity_name, entity) in &config.entities {
            let Some(object) = objects.get(entity_name) else {
                continue;
            };

            for mapped in entity.mappings.keys() {
                if !object.source.has_column(mapped) {
                    return Err(SchemaBuildError::InvalidMapping {
                        entity: entity_name.clone(),
                        column: mapped.clone(),
                    });
                }
            }

            let mut to_backing = HashMap::new();
            let mut to_exposed = HashMap::new();
            for column in &object.source.columns {
                let exposed_name = entity
                    .mappings
                    .get(&column.name)
                    .cloned()
                    .unwrap_or_else(|| column.name.clone());
                to_backing.insert(exposed_name.clone(), column.name.clone());
                to_exposed.insert(column.name.clone(), exposed_name);
            }
            backing.insert(entity_name.clone(), to_backing);
            exposed.insert(entity_name.clone(), to_exposed);
        }

        Ok(Self {
            objects: objects
                .into_iter()
                .map(|(name, obj)| (name, Arc::new(obj)))
                .collect(),
            backing,
            exposed,
        })
    }

    /// All entity names and their database objects.
    pub fn entities_and_objects(&self) -> impl Iterator<Item = (&String, &Arc<DatabaseObject>)> {
        self.objects.iter()
    }

    pub fn object(&self, entity: &str) -> Option<&Arc<DatabaseObject>> {
        self.objects.get(entity)
    }

    pub fn source_definition(&self, entity: &str) -> Option<&SourceDefinition> {
        self.objects.get(entity).map(|o| &o.source)
    }

    /// Resolve an exposed field name to its backing column.
    pub fn try_backing_column(&self, entity: &str, exposed_name: &str) -> Option<&str> {
        self.backing
            .get(entity)
            .and_then(|m| m.get(exposed_name))
            .map(String::as_str)
    }

    /// Resolve a backing column to its exposed field name.
    pub fn try_exposed_name(&self, entity: &str, backing_column: &str) -> Option<&str> {
        self.exposed
            .get(entity)
            .and_then(|m| m.get(backing_column))
            .map(String::as_str)
    }

    /// Exposed fields with their column definitions, in declaration order.
    pub fn exposed_fields(&self, entity: &str) -> Vec<(String, &ColumnDefinition)> {
        let Some(object) = self.objects.get(entity) else {
            return Vec::new();
        };
        object
            .source
            .columns
            .iter()
            .map(|c| {
                let exposed = self
                    .try_exposed_name(entity, &c.name)
                    .unwrap_or(&c.name)
                    .to_string();
                (exposed, c)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceKind;
    use crate::metadata::SourceDefinition;

    fn book_object() -> DatabaseObject {
        DatabaseObject {
            schema: String::new(),
            name: "books".into(),
            kind: SourceKind::Table,
            source: SourceDefinition {
                columns: vec![
                    ColumnDefinition {
                        name: "id".into(),
                        system_type: "INTEGER".into(),
                        nullable: false,
                        is_autogenerated: true,
                        default_value: None,
                    },
                    ColumnDefinition {
                        name: "pub_year".into(),
                        system_type: "INTEGER".into(),
                        nullable: true,
                        is_autogenerated: false,
                        default_value: None,
                    },
                ],
                primary_key: vec!["id".into()],
                relationships: Default::default(),
            },
        }
    }

    fn config_with_mapping(mapping: &str) -> RuntimeConfig {
        RuntimeConfig::from_json(&format!(
            r#"{{
                "data-source": {{ "database-type": "sqlite" }},
                "entities": {{
                    "Book": {{
                        "source": {{ "object": "books" }},
                        "mappings": {{ "{}": "publicationYear" }}
                    }}
                }}
            }}"#,
            mapping
        ))
        .unwrap()
    }

    #[test]
    fn test_alias_round_trip() {
        let mut objects = HashMap::new();
        objects.insert("Book".to_string(), book_object());
        let provider = MetadataProvider::build(&config_with_mapping("pub_year"), objects).unwrap();

        assert_eq!(
            provider.try_backing_column("Book", "publicationYear"),
            Some("pub_year")
        );
        assert_eq!(
            provider.try_exposed_name("Book", "pub_year"),
            Some("publicationYear")
        );
        // Unmapped columns expose their own name
        assert_eq!(provider.try_backing_column("Book", "id"), Some("id"));
        // The backing name of a mapped column is not itself addressable
        assert_eq!(provider.try_backing_column("Book", "pub_year"), None);
    }

    #[test]
    fn test_mapping_unknown_column_is_fatal() {
        let mut objects = HashMap::new();
        objects.insert("Book".to_string(), book_object());
        let err = MetadataProvider::build(&config_with_mapping("no_such"), objects).unwrap_err();
        assert!(matches!(err, SchemaBuildError::InvalidMapping { .. }));
    }

    #[test]
    fn test_exposed_fields_in_declaration_order() {
        let mut objects = HashMap::new();
        objects.insert("Book".to_string(), book_object());
        let provider = MetadataProvider::build(&config_with_mapping("pub_year"), objects).unwrap();

        let fields = provider.exposed_fields("Book");
        assert_eq!(fields[0].0, "id");
        assert_eq!(fields[1].0, "publicationYear");
        assert_eq!(fields[1].1.name, "pub_year");
    }
}
