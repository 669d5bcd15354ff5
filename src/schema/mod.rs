//! Dynamic GraphQL schema generation
//!
//! The schema is derived at runtime from the runtime configuration plus
//! discovered metadata - nothing here is compile-time typed. Generation
//! runs in explicit stages per entity (fields, then relationships, then
//! finalization into `async_graphql::dynamic` types) so relationship
//! targets can be resolved against every entity's field plan.
//!
//! - `edm`: flat per-entity models for the OData translator
//! - `inputs`: shared scalar filter inputs, per-entity filter/order inputs
//! - `objects`: object and connection types, query and mutation roots
//! - `resolve`: the resolvers bridging generated fields to the query engine

pub mod edm;
pub mod inputs;
pub mod objects;
pub mod resolve;

use std::collections::HashMap;
use std::sync::Arc;

use async_graphql::dynamic::Schema;

use crate::auth::AuthorizationResolver;
use crate::config::{Cardinality, Operation, RuntimeConfig, SourceKind};
use crate::engine::QueryEngine;
use crate::error::SchemaBuildError;
use crate::metadata::{scalar_kind_of, DatabaseObject, MetadataProvider, ScalarKind};

/// Per-entity generation progress. Stages only ever advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildStage {
    Unprocessed,
    FieldsGenerated,
    RelationshipsGenerated,
    Finalized,
}

/// One generated scalar field: exposed name, backing column and the
/// structural metadata mutations need.
#[derive(Debug, Clone)]
pub struct FieldPlan {
    pub exposed: String,
    pub backing: String,
    pub kind: ScalarKind,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub is_autogenerated: bool,
    pub default_value: Option<serde_json::Value>,
}

/// One generated relationship field, annotated with the target type name
/// and cardinality for the resolver layer.
#[derive(Debug, Clone)]
pub struct RelationshipPlan {
    pub field_name: String,
    pub target_entity: String,
    pub target_type_name: String,
    pub cardinality: Cardinality,
    /// For to-one fields: whether the field may be null.
    pub nullable: bool,
    /// Backing FK columns on this entity's side, paired with
    /// `target_columns`.
    pub source_columns: Vec<String>,
    pub target_columns: Vec<String>,
}

/// Everything the generators and resolvers need to know about one entity.
#[derive(Debug, Clone)]
pub struct EntityPlan {
    pub entity: String,
    pub type_name: String,
    pub list_field: String,
    pub by_pk_field: String,
    pub object: Arc<DatabaseObject>,
    pub kind: SourceKind,
    pub is_linking: bool,
    pub graphql_enabled: bool,
    pub rest_enabled: bool,
    pub fields: Vec<FieldPlan>,
    pub relationships: Vec<RelationshipPlan>,
}

impl EntityPlan {
    pub fn field(&self, exposed: &str) -> Option<&FieldPlan> {
        self.fields.iter().find(|f| f.exposed == exposed)
    }

    pub fn key_fields(&self) -> Vec<&FieldPlan> {
        self.fields.iter().filter(|f| f.is_primary_key).collect()
    }

    /// Whether any role may read this entity. Permissions that grant only
    /// write actions leave the plan with no visible fields, and GraphQL
    /// object types must define at least one field, so such entities are
    /// omitted from the generated schema rather than registered empty.
    pub fn is_queryable(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn connection_type_name(&self) -> String {
        format!("{}Connection", self.type_name)
    }

    pub fn filter_input_name(&self) -> String {
        format!("{}FilterInput", self.type_name)
    }

    pub fn order_input_name(&self) -> String {
        format!("{}OrderByInput", self.type_name)
    }

    /// `(backing, exposed)` projection pairs for the generated columns.
    pub fn projection(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .map(|f| (f.backing.clone(), f.exposed.clone()))
            .collect()
    }
}

fn lowercase_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Build every entity's plan, advancing all entities through each stage
/// together so relationship generation sees every target's fields.
pub fn build_plans(
    config: &RuntimeConfig,
    provider: &MetadataProvider,
    authorizer: &AuthorizationResolver,
) -> Result<HashMap<String, Arc<EntityPlan>>, SchemaBuildError> {
    let mut plans: HashMap<String, EntityPlan> = HashMap::new();
    let mut stages: HashMap<String, BuildStage> = HashMap::new();

    for (entity_name, entity) in &config.entities {
        let Some(object) = provider.object(entity_name) else {
            continue;
        };
        let type_name = entity
            .graphql
            .singular
            .clone()
            .unwrap_or_else(|| entity_name.clone());
        let list_field = entity
            .graphql
            .plural
            .clone()
            .unwrap_or_else(|| format!("{}s", lowercase_first(entity_name)));
        let by_pk_field = format!("{}_by_pk", lowercase_first(&type_name));

        plans.insert(
            entity_name.clone(),
            EntityPlan {
                entity: entity_name.clone(),
                type_name,
                list_field,
                by_pk_field,
                object: object.clone(),
                kind: entity.source.kind,
                is_linking: entity.is_linking_entity,
                graphql_enabled: entity.graphql.is_enabled(),
                rest_enabled: entity.rest.enabled,
                fields: Vec::new(),
                relationships: Vec::new(),
            },
        );
        stages.insert(entity_name.clone(), BuildStage::Unprocessed);
    }

    for (entity_name, plan) in &mut plans {
        plan.fields = generate_fields(entity_name, plan, provider, authorizer)?;
        stages.insert(entity_name.clone(), BuildStage::FieldsGenerated);
    }

    // Relationships need every plan's type name, so they run as a second
    // pass over an immutable view.
    let type_names: HashMap<String, String> = plans
        .iter()
        .map(|(name, plan)| (name.clone(), plan.type_name.clone()))
        .collect();
    let mut all_relationships: HashMap<String, Vec<RelationshipPlan>> = HashMap::new();
    for (entity_name, entity) in &config.entities {
        let Some(plan) = plans.get(entity_name) else {
            continue;
        };
        all_relationships.insert(
            entity_name.clone(),
            generate_relationships(entity_name, entity, plan, config, &type_names)?,
        );
    }
    for (entity_name, relationships) in all_relationships {
        if let Some(plan) = plans.get_mut(&entity_name) {
            plan.relationships = relationships;
            stages.insert(entity_name, BuildStage::RelationshipsGenerated);
        }
    }

    let finalized = plans
        .into_iter()
        .map(|(name, plan)| {
            stages.insert(name.clone(), BuildStage::Finalized);
            (name, Arc::new(plan))
        })
        .collect();
    debug_assert!(stages.values().all(|s| *s == BuildStage::Finalized));
    Ok(finalized)
}

fn generate_fields(
    entity_name: &str,
    plan: &EntityPlan,
    provider: &MetadataProvider,
    authorizer: &AuthorizationResolver,
) -> Result<Vec<FieldPlan>, SchemaBuildError> {
    // Stored procedures with no declared result set expose one opaque
    // field so the generated type is never empty.
    if plan.kind == SourceKind::StoredProcedure && plan.object.source.columns.is_empty() {
        return Ok(vec![FieldPlan {
            exposed: "result".to_string(),
            backing: "result".to_string(),
            kind: ScalarKind::String,
            nullable: true,
            is_primary_key: false,
            is_autogenerated: false,
            default_value: None,
        }]);
    }

    let visible_op = if plan.kind == SourceKind::StoredProcedure {
        Operation::Execute
    } else {
        Operation::Read
    };
    let readable = authorizer.columns_any_role(entity_name, visible_op);

    let mut fields = Vec::new();
    for (exposed, column) in provider.exposed_fields(entity_name) {
        // Columns no role may read are omitted from the schema entirely,
        // except on stored procedures and linking entities.
        if !plan.is_linking
            && plan.kind != SourceKind::StoredProcedure
            && !readable.contains(&exposed)
        {
            continue;
        }
        let kind = scalar_kind_of(&column.system_type).ok_or_else(|| {
            SchemaBuildError::UnmappedColumnType {
                entity: entity_name.to_string(),
                column: column.name.clone(),
                system_type: column.system_type.clone(),
            }
        })?;
        fields.push(FieldPlan {
            exposed,
            backing: column.name.clone(),
            kind,
            nullable: column.nullable,
            is_primary_key: plan.object.source.is_primary_key(&column.name),
            is_autogenerated: column.is_autogenerated,
            default_value: column.default_value.clone(),
        });
    }
    Ok(fields)
}

fn generate_relationships(
    entity_name: &str,
    entity: &crate::config::EntityConfig,
    plan: &EntityPlan,
    config: &RuntimeConfig,
    type_names: &HashMap<String, String>,
) -> Result<Vec<RelationshipPlan>, SchemaBuildError> {
    // Linking entities and stored procedures never grow relationship
    // fields of their own.
    if plan.is_linking || plan.kind == SourceKind::StoredProcedure {
        return Ok(Vec::new());
    }

    let mut relationships = Vec::new();
    for (rel_name, rel) in &entity.relationships {
        let cardinality = Cardinality::parse(&rel.cardinality).ok_or_else(|| {
            SchemaBuildError::UnsupportedCardinality {
                entity: entity_name.to_string(),
                relationship: rel_name.clone(),
                cardinality: rel.cardinality.clone(),
            }
        })?;
        if !config.entities.contains_key(&rel.target_entity) {
            return Err(SchemaBuildError::UnknownRelationshipTarget {
                entity: entity_name.to_string(),
                relationship: rel_name.clone(),
                target: rel.target_entity.clone(),
            });
        }
        let Some(target_type_name) = type_names.get(&rel.target_entity) else {
            continue;
        };

        let candidates = plan
            .object
            .source
            .relationships
            .get(&rel.target_entity)
            .cloned()
            .unwrap_or_default();

        let this_name = plan.object.qualified_name();
        let (source_columns, target_columns) = match candidates.first() {
            Some(fk) if fk.referencing_table == this_name => {
                (fk.referencing_columns.clone(), fk.referenced_columns.clone())
            }
            Some(fk) => (fk.referenced_columns.clone(), fk.referencing_columns.clone()),
            None => (rel.source_fields.clone(), rel.target_fields.clone()),
        };

        // To-one nullability comes from the FK columns on the side this
        // entity occupies; anything ambiguous stays nullable.
        let nullable = match (cardinality, candidates.as_slice()) {
            (Cardinality::Many, _) => true,
            (Cardinality::One, [fk]) if fk.referencing_table == this_name => {
                !fk.referencing_columns.iter().all(|col| {
                    plan.object
                        .source
                        .column(col)
                        .is_some_and(|c| !c.nullable)
                })
            }
            (Cardinality::One, _) => true,
        };

        relationships.push(RelationshipPlan {
            field_name: rel_name.clone(),
            target_entity: rel.target_entity.clone(),
            target_type_name: target_type_name.clone(),
            cardinality,
            nullable,
            source_columns,
            target_columns,
        });
    }
    Ok(relationships)
}

/// Shared services captured by every generated resolver.
pub struct ResolverServices {
    pub provider: Arc<MetadataProvider>,
    pub authorizer: Arc<AuthorizationResolver>,
    pub edm: Arc<edm::EdmModel>,
    pub engine: Arc<QueryEngine>,
    pub plans: HashMap<String, Arc<EntityPlan>>,
}

/// Assemble the executable schema from finalized plans.
pub fn build_schema(services: Arc<ResolverServices>) -> Result<Schema, SchemaBuildError> {
    let mut plans: Vec<&Arc<EntityPlan>> = services
        .plans
        .values()
        .filter(|plan| plan.graphql_enabled && !plan.is_linking && plan.is_queryable())
        .collect();
    plans.sort_by(|a, b| a.entity.cmp(&b.entity));

    // A mutation root with no fields is invalid, so it is only registered
    // when some entity actually grants create/update/delete.
    let mutation = objects::mutation_root(&plans, &services);
    let mut builder = Schema::build(
        "Query",
        mutation.as_ref().map(|_| "Mutation"),
        None,
    );

    for scalar in inputs::custom_scalars() {
        builder = builder.register(scalar);
    }
    for input in inputs::scalar_filter_inputs() {
        builder = builder.register(input);
    }
    builder = builder.register(inputs::order_direction_enum());

    for plan in &plans {
        if plan.kind != SourceKind::StoredProcedure {
            builder = builder.register(inputs::entity_filter_input(plan));
            builder = builder.register(inputs::entity_order_input(plan));
            builder = builder.register(objects::connection_type(plan));
        }
        builder = builder.register(objects::entity_object(plan, &services));
    }

    builder = builder.register(objects::query_root(&plans, &services));
    if let Some(mutation) = mutation {
        builder = builder.register(mutation);
        for input in objects::mutation_inputs(&plans, &services) {
            builder = builder.register(input);
        }
    }

    builder
        .data(services.clone())
        .finish()
        .map_err(|e| SchemaBuildError::Registration(e.to_string()))
}
