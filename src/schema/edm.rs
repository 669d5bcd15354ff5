//! Entity data models for the REST surface
//!
//! An `EntityEdm` is a flat, exposed-name view of one entity: which fields a
//! `$filter` or `$orderby` expression may reference, the backing column and
//! scalar kind behind each one. Models are keyed `entityName.schema.object`
//! so two entities over the same database object stay distinct.

use indexmap::IndexMap;
use std::collections::HashMap;

use crate::error::SchemaBuildError;
use crate::metadata::{scalar_kind_of, MetadataProvider, ScalarKind};

#[derive(Debug, Clone)]
pub struct EdmField {
    pub backing_column: String,
    pub kind: ScalarKind,
    pub nullable: bool,
}

#[derive(Debug, Clone)]
pub struct EntityEdm {
    pub entity: String,
    pub key: String,
    pub schema: String,
    pub object: String,
    /// Exposed field name -> field, in declaration order.
    pub fields: IndexMap<String, EdmField>,
}

impl EntityEdm {
    pub fn field(&self, exposed_name: &str) -> Option<&EdmField> {
        self.fields.get(exposed_name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EdmModel {
    by_key: HashMap<String, EntityEdm>,
    key_by_entity: HashMap<String, String>,
}

impl EdmModel {
    pub fn build(provider: &MetadataProvider) -> Result<Self, SchemaBuildError> {
        let mut by_key = HashMap::new();
        let mut key_by_entity = HashMap::new();

        for (entity, object) in provider.entities_and_objects() {
            let mut fields = IndexMap::new();
            for (exposed, column) in provider.exposed_fields(entity) {
                let kind = scalar_kind_of(&column.system_type).ok_or_else(|| {
                    SchemaBuildError::UnmappedColumnType {
                        entity: entity.clone(),
                        column: column.name.clone(),
                        system_type: column.system_type.clone(),
                    }
                })?;
                fields.insert(
                    exposed,
                    EdmField {
                        backing_column: column.name.clone(),
                        kind,
                        nullable: column.nullable,
                    },
                );
            }

            let key = format!("{}.{}.{}", entity, object.schema, object.name);
            by_key.insert(
                key.clone(),
                EntityEdm {
                    entity: entity.clone(),
                    key: key.clone(),
                    schema: object.schema.clone(),
                    object: object.name.clone(),
                    fields,
                },
            );
            key_by_entity.insert(entity.clone(), key);
        }

        Ok(Self { by_key, key_by_entity })
    }

    pub fn for_entity(&self, entity: &str) -> Option<&EntityEdm> {
        let key = self.key_by_entity.get(entity)?;
        self.by_key.get(key)
    }

    pub fn by_key(&self, key: &str) -> Option<&EntityEdm> {
        self.by_key.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RuntimeConfig, SourceKind};
    use crate::metadata::{ColumnDefinition, DatabaseObject, SourceDefinition};

    fn model() -> EdmModel {
        let object = DatabaseObject {
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
        };
        let config = RuntimeConfig::from_json(
            r#"{
                "data-source": { "database-type": "sqlite" },
                "entities": {
                    "Book": {
                        "source": { "object": "books" },
                        "mappings": { "pub_year": "publicationYear" }
                    }
                }
            }"#,
        )
        .unwrap();
        let mut objects = std::collections::HashMap::new();
        objects.insert("Book".to_string(), object);
        let provider = MetadataProvider::build(&config, objects).unwrap();
        EdmModel::build(&provider).unwrap()
    }

    #[test]
    fn test_model_keyed_by_entity_and_object() {
        let model = model();
        let edm = model.for_entity("Book").unwrap();
        assert_eq!(edm.key, "Book..books");
        assert!(model.by_key("Book..books").is_some());
    }

    #[test]
    fn test_fields_use_exposed_names() {
        let model = model();
        let edm = model.for_entity("Book").unwrap();
        let field = edm.field("publicationYear").unwrap();
        assert_eq!(field.backing_column, "pub_year");
        assert_eq!(field.kind, ScalarKind::Int);
        assert!(field.nullable);
        assert!(edm.field("pub_year").is_none());
    }
}
