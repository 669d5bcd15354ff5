//! Metadata discovery for SQLite sources
//!
//! Reads table/view shapes and foreign keys out of the catalog via PRAGMA
//! queries, and folds in the configuration-declared shapes for stored
//! procedures (SQLite has no procedure catalog to ask). Runs once per
//! snapshot build; the resulting [`DatabaseObject`]s are immutable.

use std::collections::{BTreeMap, HashMap};

use sqlx::SqlitePool;
use tracing::debug;

use crate::config::{EntityConfig, RuntimeConfig, SourceKind};
use crate::error::SchemaBuildError;

use super::{ColumnDefinition, DatabaseObject, ForeignKeyDefinition, SourceDefinition};

/// Discover every configured entity's backing object.
pub async fn discover(
    pool: &SqlitePool,
    config: &RuntimeConfig,
) -> Result<HashMap<String, DatabaseObject>, SchemaBuildError> {
    let mut objects: HashMap<String, DatabaseObject> = HashMap::new();

    for (entity_name, entity) in &config.entities {
        let object = match entity.source.kind {
            SourceKind::Table | SourceKind::View => {
                discover_relational(pool, entity_name, entity).await?
            }
            SourceKind::StoredProcedure => procedure_object(entity),
        };
        debug!(
            entity = %entity_name,
            object = %object.qualified_name(),
            columns = object.source.columns.len(),
            "discovered database object"
        );
        objects.insert(entity_name.clone(), object);
    }

    // Relationships need the full object set, so wire them in a second pass.
    let fk_lists = collect_foreign_keys(pool, config, &objects).await?;
    for (entity_name, entity) in &config.entities {
        if entity.source.kind == SourceKind::StoredProcedure {
            continue;
        }
        let relationships = infer_relationships(entity_name, entity, config, &objects, &fk_lists)?;
        if let Some(object) = objects.get_mut(entity_name) {
            object.source.relationships = relationships;
        }
    }

    Ok(objects)
}

/// Check if a table or view exists in the catalog.
async fn object_exists(pool: &SqlitePool, name: &str) -> Result<bool, sqlx::Error> {
    let result: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(result.is_some())
}

/// Build a table/view object from PRAGMA table_info.
async fn discover_relational(
    pool: &SqlitePool,
    entity_name: &str,
    entity: &EntityConfig,
) -> Result<DatabaseObject, SchemaBuildError> {
    let (schema, object_name) = split_qualified(&entity.source.object);

    if !object_exists(pool, object_name).await? {
        return Err(SchemaBuildError::UnknownDatabaseObject {
            entity: entity_name.to_string(),
            object: entity.source.object.clone(),
        });
    }

    let rows: Vec<(i32, String, String, i32, Option<String>, i32)> =
        sqlx::query_as(&format!("PRAGMA table_info({})", object_name))
            .fetch_all(pool)
            .await?;

    let mut columns = Vec::with_capacity(rows.len());
    let mut pk_ordinals: Vec<(i32, String)> = Vec::new();

    for (_cid, name, system_type, notnull, dflt_value, pk) in rows {
        let is_pk = pk > 0;
        if is_pk {
            pk_ordinals.push((pk, name.clone()));
        }

        // A lone INTEGER PRIMARY KEY is a rowid alias: the engine assigns it.
        let is_autogenerated = is_pk && system_type.eq_ignore_ascii_case("integer");

        columns.push(ColumnDefinition {
            name,
            system_type,
            nullable: notnull == 0 && !is_pk,
            is_autogenerated,
            default_value: dflt_value.as_deref().and_then(parse_default),
        });
    }

    pk_ordinals.sort_by_key(|(ordinal, _)| *ordinal);
    let mut primary_key: Vec<String> = pk_ordinals.into_iter().map(|(_, name)| name).collect();

    // Views carry no declared key: fall back to configured key fields, then
    // to an `id` column. No key at all makes the entity unusable.
    if primary_key.is_empty() {
        if !entity.source.key_fields.is_empty() {
            primary_key = entity.source.key_fields.clone();
        } else if columns.iter().any(|c| c.name == "id") {
            primary_key = vec!["id".to_string()];
        } else {
            return Err(SchemaBuildError::MissingPrimaryKey {
                entity: entity_name.to_string(),
            });
        }
    }

    Ok(DatabaseObject {
        schema: schema.to_string(),
        name: object_name.to_string(),
        kind: entity.source.kind,
        source: SourceDefinition {
            columns,
            primary_key,
            relationships: BTreeMap::new(),
        },
    })
}

/// Build a stored-procedure object from its configuration-declared result
/// shape. Procedures have no keys and never participate in relationships.
fn procedure_object(entity: &EntityConfig) -> DatabaseObject {
    let (schema, object_name) = split_qualified(&entity.source.object);

    let columns = entity
        .source
        .result_columns
        .iter()
        .map(|rc| ColumnDefinition {
            name: rc.name.clone(),
            system_type: rc.system_type.clone(),
            nullable: rc.nullable,
            is_autogenerated: false,
            default_value: None,
        })
        .collect();

    DatabaseObject {
        schema: schema.to_string(),
        name: object_name.to_string(),
        kind: SourceKind::StoredProcedure,
        source: SourceDefinition {
            columns,
            primary_key: Vec::new(),
            relationships: BTreeMap::new(),
        },
    }
}

/// All declared foreign keys, keyed by the referencing object's qualified name.
async fn collect_foreign_keys(
    pool: &SqlitePool,
    config: &RuntimeConfig,
    objects: &HashMap<String, DatabaseObject>,
) -> Result<HashMap<String, Vec<ForeignKeyDefinition>>, SchemaBuildError> {
    let mut by_table: HashMap<String, Vec<ForeignKeyDefinition>> = HashMap::new();

    for (entity_name, entity) in &config.entities {
        if entity.source.kind != SourceKind::Table {
            continue;
        }
        let Some(object) = objects.get(entity_name) else {
            continue;
        };

        let rows: Vec<(i32, i32, String, String, Option<String>, String, String, String)> =
            sqlx::query_as(&format!("PRAGMA foreign_key_list({})", object.name))
                .fetch_all(pool)
                .await?;

        // Rows with the same id belong to one composite FK, ordered by seq.
        let mut grouped: BTreeMap<i32, ForeignKeyDefinition> = BTreeMap::new();
        for (id, _seq, table, from, to, _on_update, _on_delete, _match) in rows {
            let entry = grouped.entry(id).or_insert_with(|| ForeignKeyDefinition {
                referencing_table: object.qualified_name(),
                referenced_table: table.clone(),
                referencing_columns: Vec::new(),
                referenced_columns: Vec::new(),
            });
            entry.referencing_columns.push(from);
            entry.referenced_columns.push(to.unwrap_or_default());
        }

        by_table
            .entry(object.qualified_name())
            .or_default()
            .extend(grouped.into_values());
    }

    Ok(by_table)
}

/// Resolve the FK definitions backing each configured relationship.
///
/// Candidates come from declared FKs in either direction between the two
/// objects, plus a speculative entry from configured source/target fields.
/// Degenerate zero-column entries and duplicates are dropped.
fn infer_relationships(
    entity_name: &str,
    entity: &EntityConfig,
    config: &RuntimeConfig,
    objects: &HashMap<String, DatabaseObject>,
    fk_lists: &HashMap<String, Vec<ForeignKeyDefinition>>,
) -> Result<BTreeMap<String, Vec<ForeignKeyDefinition>>, SchemaBuildError> {
    let mut relationships = BTreeMap::new();
    let Some(object) = objects.get(entity_name) else {
        return Ok(relationships);
    };

    for (rel_name, rel) in &entity.relationships {
        if !config.entities.contains_key(&rel.target_entity) {
            return Err(SchemaBuildError::UnknownRelationshipTarget {
                entity: entity_name.to_string(),
                relationship: rel_name.clone(),
                target: rel.target_entity.clone(),
            });
        }
        let Some(target_object) = objects.get(&rel.target_entity) else {
            continue;
        };

        let this_name = object.qualified_name();
        let target_name = target_object.qualified_name();
        let mut candidates: Vec<ForeignKeyDefinition> = Vec::new();

        // FKs we declare against the target.
        if let Some(fks) = fk_lists.get(&this_name) {
            candidates.extend(
                fks.iter()
                    .filter(|fk| fk.referenced_table == target_name)
                    .cloned(),
            );
        }
        // FKs the target declares against us.
        if let Some(fks) = fk_lists.get(&target_name) {
            candidates.extend(
                fks.iter()
                    .filter(|fk| fk.referenced_table == this_name)
                    .cloned(),
            );
        }

        // Speculative entry from configured fields; degenerate when the
        // config does not name any.
        candidates.push(ForeignKeyDefinition {
            referencing_table: this_name.clone(),
            referenced_table: target_name.clone(),
            referencing_columns: rel.source_fields.clone(),
            referenced_columns: rel.target_fields.clone(),
        });

        let mut resolved: Vec<ForeignKeyDefinition> = Vec::new();
        for fk in candidates {
            if fk.is_degenerate() || resolved.contains(&fk) {
                continue;
            }
            resolved.push(fk);
        }

        relationships.insert(rel.target_entity.clone(), resolved);
    }

    Ok(relationships)
}

/// Split "schema.name" into its parts; SQLite objects are unqualified.
fn split_qualified(object: &str) -> (&str, &str) {
    match object.split_once('.') {
        Some((schema, name)) => (schema, name),
        None => ("", object),
    }
}

/// Interpret a PRAGMA-reported column default. Quoted text and plain
/// numeric/boolean literals are embeddable; arbitrary expressions
/// (CURRENT_TIMESTAMP and friends) are not.
fn parse_default(raw: &str) -> Option<serde_json::Value> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("null") {
        return None;
    }
    if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        let inner = trimmed[1..trimmed.len() - 1].replace("''", "'");
        return Some(serde_json::Value::String(inner));
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(serde_json::Value::Number(i.into()));
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return serde_json::Number::from_f64(f).map(serde_json::Value::Number);
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return Some(serde_json::Value::Bool(true));
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Some(serde_json::Value::Bool(false));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Default Parsing Tests
    // =========================================================================

    #[test]
    fn test_parse_default_literals() {
        assert_eq!(
            parse_default("'draft'"),
            Some(serde_json::Value::String("draft".into()))
        );
        assert_eq!(
            parse_default("'it''s'"),
            Some(serde_json::Value::String("it's".into()))
        );
        assert_eq!(parse_default("42"), Some(serde_json::json!(42)));
        assert_eq!(parse_default("1.5"), Some(serde_json::json!(1.5)));
        assert_eq!(parse_default("NULL"), None);
        assert_eq!(parse_default("CURRENT_TIMESTAMP"), None);
    }

    #[test]
    fn test_split_qualified() {
        assert_eq!(split_qualified("books"), ("", "books"));
        assert_eq!(split_qualified("dbo.books"), ("dbo", "books"));
    }

    // =========================================================================
    // Discovery Tests (in-memory SQLite)
    // =========================================================================

    fn test_config(json: &str) -> RuntimeConfig {
        RuntimeConfig::from_json(json).unwrap()
    }

    async fn seed_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE publishers (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "CREATE TABLE books (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                pub_year INTEGER,
                publisher_id INTEGER REFERENCES publishers(id)
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    const BOOKS_CONFIG: &str = r#"{
        "data-source": { "database-type": "sqlite" },
        "entities": {
            "Book": {
                "source": { "object": "books" },
                "relationships": {
                    "publisher": { "cardinality": "one", "target-entity": "Publisher" }
                }
            },
            "Publisher": {
                "source": { "object": "publishers" },
                "relationships": {
                    "books": { "cardinality": "many", "target-entity": "Book" }
                }
            }
        }
    }"#;

    #[tokio::test]
    async fn test_discover_tables_and_keys() {
        let pool = seed_pool().await;
        let objects = discover(&pool, &test_config(BOOKS_CONFIG)).await.unwrap();

        let book = &objects["Book"];
        assert_eq!(book.source.primary_key, vec!["id"]);
        assert_eq!(book.source.columns.len(), 4);

        let id = book.source.column("id").unwrap();
        assert!(id.is_autogenerated);
        assert!(!id.nullable);

        let publisher_id = book.source.column("publisher_id").unwrap();
        assert!(publisher_id.nullable);
    }

    #[tokio::test]
    async fn test_discover_foreign_keys_both_directions() {
        let pool = seed_pool().await;
        let objects = discover(&pool, &test_config(BOOKS_CONFIG)).await.unwrap();

        let book_rels = &objects["Book"].source.relationships["Publisher"];
        assert_eq!(book_rels.len(), 1);
        assert_eq!(book_rels[0].referencing_table, "books");
        assert_eq!(book_rels[0].referencing_columns, vec!["publisher_id"]);
        assert_eq!(book_rels[0].referenced_columns, vec!["id"]);

        // The same FK resolves the reverse relationship; the speculative
        // zero-column entry must not survive.
        let pub_rels = &objects["Publisher"].source.relationships["Book"];
        assert_eq!(pub_rels.len(), 1);
        assert_eq!(pub_rels[0].referencing_table, "books");
    }

    #[tokio::test]
    async fn test_discover_unknown_object_is_fatal() {
        let pool = seed_pool().await;
        let config = test_config(
            r#"{
                "data-source": { "database-type": "sqlite" },
                "entities": {
                    "Ghost": { "source": { "object": "ghosts" } }
                }
            }"#,
        );
        let err = discover(&pool, &config).await.unwrap_err();
        assert!(matches!(
            err,
            SchemaBuildError::UnknownDatabaseObject { .. }
        ));
    }

    #[tokio::test]
    async fn test_discover_unknown_relationship_target_is_fatal() {
        let pool = seed_pool().await;
        let config = test_config(
            r#"{
                "data-source": { "database-type": "sqlite" },
                "entities": {
                    "Book": {
                        "source": { "object": "books" },
                        "relationships": {
                            "publisher": { "cardinality": "one", "target-entity": "Nope" }
                        }
                    }
                }
            }"#,
        );
        let err = discover(&pool, &config).await.unwrap_err();
        assert!(matches!(
            err,
            SchemaBuildError::UnknownRelationshipTarget { .. }
        ));
    }

    #[tokio::test]
    async fn test_view_without_key_falls_back_to_id() {
        let pool = seed_pool().await;
        sqlx::query("CREATE VIEW book_titles AS SELECT id, title FROM books")
            .execute(&pool)
            .await
            .unwrap();
        let config = test_config(
            r#"{
                "data-source": { "database-type": "sqlite" },
                "entities": {
                    "BookTitle": { "source": { "object": "book_titles", "type": "view" } }
                }
            }"#,
        );
        let objects = discover(&pool, &config).await.unwrap();
        assert_eq!(objects["BookTitle"].source.primary_key, vec!["id"]);
    }

    #[tokio::test]
    async fn test_view_without_any_key_is_fatal() {
        let pool = seed_pool().await;
        sqlx::query("CREATE VIEW title_list AS SELECT title FROM books")
            .execute(&pool)
            .await
            .unwrap();
        let config = test_config(
            r#"{
                "data-source": { "database-type": "sqlite" },
                "entities": {
                    "TitleList": { "source": { "object": "title_list", "type": "view" } }
                }
            }"#,
        );
        let err = discover(&pool, &config).await.unwrap_err();
        assert!(matches!(err, SchemaBuildError::MissingPrimaryKey { .. }));
    }
}
