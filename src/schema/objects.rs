//! Generated object types and operation roots
//!
//! Entity object types resolve their scalar fields out of the JSON row the
//! parent resolver produced; relationship fields run a dependent query
//! against the target entity. Query fields exist for every readable
//! entity, mutation fields only where some role grants the operation.

use std::sync::Arc;

use async_graphql::dynamic::{
    Field, FieldFuture, FieldValue, InputObject, InputValue, Object, ResolverContext, TypeRef,
};
use async_graphql::Value;
use serde_json::Value as JsonValue;

use crate::auth::{AuthUser, ROLE_ANONYMOUS};
use crate::config::{Cardinality, Operation, SourceKind};
use crate::error::RequestError;
use crate::metadata::default_literal;
use crate::schema::resolve::{
    create_row, delete_row, execute_procedure, fetch_by_pk, fetch_list, fetch_related,
    update_row, ConnectionPage, ListArgs, Related, RequestRole,
};
use crate::schema::{EntityPlan, FieldPlan, ResolverServices};

fn scalar_type_ref(field: &FieldPlan) -> TypeRef {
    if field.nullable {
        TypeRef::named(field.kind.graphql_type_name())
    } else {
        TypeRef::named_nn(field.kind.graphql_type_name())
    }
}

fn request_identity(ctx: &ResolverContext<'_>) -> (String, AuthUser) {
    let user = ctx
        .ctx
        .data_opt::<AuthUser>()
        .cloned()
        .unwrap_or_else(AuthUser::anonymous);
    let role = ctx
        .ctx
        .data_opt::<RequestRole>()
        .map(|r| r.0.clone())
        .unwrap_or_else(|| ROLE_ANONYMOUS.to_string());
    (role, user)
}

fn list_args(ctx: &ResolverContext<'_>) -> ListArgs {
    let args = ctx.args.as_index_map();
    ListArgs {
        filter: args.get("filter").cloned(),
        order_by: args.get("orderBy").cloned(),
        first: args.get("first").and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }),
        after: args.get("after").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            _ => None,
        }),
    }
}

fn json_field_value<'a>(value: JsonValue) -> async_graphql::Result<Option<FieldValue<'a>>> {
    if value.is_null() {
        return Ok(None);
    }
    let value =
        Value::from_json(value).map_err(|e| async_graphql::Error::new(e.to_string()))?;
    Ok(Some(FieldValue::value(value)))
}

/// Pagination and filter arguments shared by list fields.
fn with_list_arguments(field: Field, target: &EntityPlan) -> Field {
    field
        .argument(InputValue::new(
            "filter",
            TypeRef::named(target.filter_input_name()),
        ))
        .argument(InputValue::new(
            "orderBy",
            TypeRef::named(target.order_input_name()),
        ))
        .argument(InputValue::new("first", TypeRef::named(TypeRef::INT)))
        .argument(InputValue::new("after", TypeRef::named(TypeRef::STRING)))
}

/// The object type for one entity: scalar fields plus relationship fields.
pub fn entity_object(plan: &Arc<EntityPlan>, services: &Arc<ResolverServices>) -> Object {
    let mut object = Object::new(&plan.type_name);

    for field in &plan.fields {
        let exposed = field.exposed.clone();
        object = object.field(Field::new(
            &field.exposed,
            scalar_type_ref(field),
            move |ctx| {
                let exposed = exposed.clone();
                FieldFuture::new(async move {
                    let row = ctx.parent_value.try_downcast_ref::<JsonValue>()?;
                    let value = row.get(&exposed).cloned().unwrap_or(JsonValue::Null);
                    json_field_value(value)
                })
            },
        ));
    }

    for rel in &plan.relationships {
        // A target outside the generated type set would leave the field
        // referencing an unregistered type.
        let Some(target_plan) = services.plans.get(&rel.target_entity) else {
            continue;
        };
        if !target_plan.graphql_enabled || target_plan.is_linking || !target_plan.is_queryable() {
            continue;
        }
        let type_ref = match rel.cardinality {
            Cardinality::Many => TypeRef::named_nn(target_plan.connection_type_name()),
            Cardinality::One if rel.nullable => TypeRef::named(&rel.target_type_name),
            Cardinality::One => TypeRef::named_nn(&rel.target_type_name),
        };

        let services = services.clone();
        let parent = plan.clone();
        let rel_plan = rel.clone();
        let mut field = Field::new(&rel.field_name, type_ref, move |ctx| {
            let services = services.clone();
            let parent = parent.clone();
            let rel_plan = rel_plan.clone();
            FieldFuture::new(async move {
                let row = ctx.parent_value.try_downcast_ref::<JsonValue>()?.clone();
                let (role, user) = request_identity(&ctx);
                let args = list_args(&ctx);
                match fetch_related(&services, &rel_plan, &parent, &row, &role, &user, args)
                    .await
                    .map_err(RequestError::into_graphql)?
                {
                    Related::Many(page) => Ok(Some(FieldValue::owned_any(page))),
                    Related::One(Some(row)) => Ok(Some(FieldValue::owned_any(row))),
                    Related::One(None) => Ok(None),
                }
            })
        });
        if rel.cardinality == Cardinality::Many {
            field = with_list_arguments(field, target_plan);
        }
        object = object.field(field);
    }

    object
}

/// `{Type}Connection`: items plus offset-cursor page info.
pub fn connection_type(plan: &Arc<EntityPlan>) -> Object {
    Object::new(plan.connection_type_name())
        .field(Field::new(
            "items",
            TypeRef::named_nn_list_nn(&plan.type_name),
            |ctx| {
                FieldFuture::new(async move {
                    let page = ctx.parent_value.try_downcast_ref::<ConnectionPage>()?;
                    Ok(Some(FieldValue::list(
                        page.items.iter().cloned().map(FieldValue::owned_any),
                    )))
                })
            },
        ))
        .field(Field::new(
            "endCursor",
            TypeRef::named(TypeRef::STRING),
            |ctx| {
                FieldFuture::new(async move {
                    let page = ctx.parent_value.try_downcast_ref::<ConnectionPage>()?;
                    Ok(page
                        .end_cursor
                        .clone()
                        .map(|c| FieldValue::value(Value::String(c))))
                })
            },
        ))
        .field(Field::new(
            "hasNextPage",
            TypeRef::named_nn(TypeRef::BOOLEAN),
            |ctx| {
                FieldFuture::new(async move {
                    let page = ctx.parent_value.try_downcast_ref::<ConnectionPage>()?;
                    Ok(Some(FieldValue::value(Value::Boolean(page.has_next_page))))
                })
            },
        ))
}

pub fn query_root(plans: &[&Arc<EntityPlan>], services: &Arc<ResolverServices>) -> Object {
    let mut query = Object::new("Query").field(Field::new(
        "apiVersion",
        TypeRef::named_nn(TypeRef::STRING),
        |_| {
            FieldFuture::new(async move {
                Ok::<_, async_graphql::Error>(Some(FieldValue::value(Value::String(
                    env!("CARGO_PKG_VERSION").to_string(),
                ))))
            })
        },
    ));

    for plan in plans {
        if plan.kind == SourceKind::StoredProcedure {
            query = query.field(procedure_field(plan, services));
            continue;
        }

        // List query with the connection wrapper.
        let list_services = services.clone();
        let list_plan = (*plan).clone();
        let list_field = Field::new(
            &plan.list_field,
            TypeRef::named_nn(plan.connection_type_name()),
            move |ctx| {
                let services = list_services.clone();
                let plan = list_plan.clone();
                FieldFuture::new(async move {
                    let (role, user) = request_identity(&ctx);
                    let args = list_args(&ctx);
                    let page = fetch_list(&services, &plan, &role, &user, args)
                        .await
                        .map_err(RequestError::into_graphql)?;
                    Ok(Some(FieldValue::owned_any(page)))
                })
            },
        );
        query = query.field(with_list_arguments(list_field, plan));

        // Single-row query addressed by primary key.
        let pk_services = services.clone();
        let pk_plan = (*plan).clone();
        let mut pk_field = Field::new(
            &plan.by_pk_field,
            TypeRef::named(&plan.type_name),
            move |ctx| {
                let services = pk_services.clone();
                let plan = pk_plan.clone();
                FieldFuture::new(async move {
                    let (role, user) = request_identity(&ctx);
                    let keys = ctx.args.as_index_map().clone();
                    match fetch_by_pk(&services, &plan, &role, &user, &keys)
                        .await
                        .map_err(RequestError::into_graphql)?
                    {
                        Some(row) => Ok(Some(FieldValue::owned_any(row))),
                        None => Ok(None),
                    }
                })
            },
        );
        for key in plan.key_fields() {
            pk_field = pk_field.argument(InputValue::new(
                &key.exposed,
                TypeRef::named_nn(key.kind.graphql_type_name()),
            ));
        }
        query = query.field(pk_field);
    }

    query
}

fn procedure_field(plan: &Arc<EntityPlan>, services: &Arc<ResolverServices>) -> Field {
    let services = services.clone();
    let plan_ref = plan.clone();
    Field::new(
        &plan.list_field,
        TypeRef::named_nn_list_nn(&plan.type_name),
        move |ctx| {
            let services = services.clone();
            let plan = plan_ref.clone();
            FieldFuture::new(async move {
                let (role, _user) = request_identity(&ctx);
                let rows = execute_procedure(&services, &plan, &role)
                    .await
                    .map_err(RequestError::into_graphql)?;
                Ok(Some(FieldValue::list(
                    rows.into_iter().map(FieldValue::owned_any),
                )))
            })
        },
    )
}

// =============================================================================
// Mutations
// =============================================================================

fn has_role_for(services: &ResolverServices, plan: &EntityPlan, operation: Operation) -> bool {
    plan.kind == SourceKind::Table
        && !services.authorizer.roles_for(&plan.entity, operation).is_empty()
}

/// `None` when no entity grants any write operation.
pub fn mutation_root(
    plans: &[&Arc<EntityPlan>],
    services: &Arc<ResolverServices>,
) -> Option<Object> {
    let mut mutation = Object::new("Mutation");
    let mut any = false;

    for plan in plans {
        if has_role_for(services, plan, Operation::Create) {
            any = true;
            let create_services = services.clone();
            let create_plan = (*plan).clone();
            mutation = mutation.field(
                Field::new(
                    format!("create{}", plan.type_name),
                    TypeRef::named_nn(&plan.type_name),
                    move |ctx| {
                        let services = create_services.clone();
                        let plan = create_plan.clone();
                        FieldFuture::new(async move {
                            let (role, _user) = request_identity(&ctx);
                            let args = ctx.args.as_index_map();
                            let Some(Value::Object(item)) = args.get("item") else {
                                return Err(async_graphql::Error::new("item must be an object"));
                            };
                            let row = create_row(&services, &plan, &role, item)
                                .await
                                .map_err(RequestError::into_graphql)?;
                            Ok(Some(FieldValue::owned_any(row)))
                        })
                    },
                )
                .argument(InputValue::new(
                    "item",
                    TypeRef::named_nn(format!("{}CreateInput", plan.type_name)),
                )),
            );
        }

        if has_role_for(services, plan, Operation::Update) {
            any = true;
            let update_services = services.clone();
            let update_plan = (*plan).clone();
            let mut field = Field::new(
                format!("update{}", plan.type_name),
                TypeRef::named(&plan.type_name),
                move |ctx| {
                    let services = update_services.clone();
                    let plan = update_plan.clone();
                    FieldFuture::new(async move {
                        let (role, user) = request_identity(&ctx);
                        let args = ctx.args.as_index_map().clone();
                        let Some(Value::Object(item)) = args.get("item") else {
                            return Err(async_graphql::Error::new("item must be an object"));
                        };
                        match update_row(&services, &plan, &role, &user, &args, item)
                            .await
                            .map_err(RequestError::into_graphql)?
                        {
                            Some(row) => Ok(Some(FieldValue::owned_any(row))),
                            None => Ok(None),
                        }
                    })
                },
            )
            .argument(InputValue::new(
                "item",
                TypeRef::named_nn(format!("{}UpdateInput", plan.type_name)),
            ));
            for key in plan.key_fields() {
                field = field.argument(InputValue::new(
                    &key.exposed,
                    TypeRef::named_nn(key.kind.graphql_type_name()),
                ));
            }
            mutation = mutation.field(field);
        }

        if has_role_for(services, plan, Operation::Delete) {
            any = true;
            let delete_services = services.clone();
            let delete_plan = (*plan).clone();
            let mut field = Field::new(
                format!("delete{}", plan.type_name),
                TypeRef::named(&plan.type_name),
                move |ctx| {
                    let services = delete_services.clone();
                    let plan = delete_plan.clone();
                    FieldFuture::new(async move {
                        let (role, user) = request_identity(&ctx);
                        let keys = ctx.args.as_index_map().clone();
                        match delete_row(&services, &plan, &role, &user, &keys)
                            .await
                            .map_err(RequestError::into_graphql)?
                        {
                            Some(row) => Ok(Some(FieldValue::owned_any(row))),
                            None => Ok(None),
                        }
                    })
                },
            );
            for key in plan.key_fields() {
                field = field.argument(InputValue::new(
                    &key.exposed,
                    TypeRef::named_nn(key.kind.graphql_type_name()),
                ));
            }
            mutation = mutation.field(field);
        }
    }

    any.then_some(mutation)
}

/// Create/update input objects for mutation-capable entities.
pub fn mutation_inputs(
    plans: &[&Arc<EntityPlan>],
    services: &Arc<ResolverServices>,
) -> Vec<InputObject> {
    let mut inputs = Vec::new();
    for plan in plans {
        if has_role_for(services, plan, Operation::Create) {
            let mut input = InputObject::new(format!("{}CreateInput", plan.type_name));
            for field in &plan.fields {
                if field.is_autogenerated {
                    continue;
                }
                // Required unless the database can fill it in.
                let type_ref = if !field.nullable && field.default_value.is_none() {
                    TypeRef::named_nn(field.kind.graphql_type_name())
                } else {
                    TypeRef::named(field.kind.graphql_type_name())
                };
                let mut value = InputValue::new(&field.exposed, type_ref);
                if let Some(literal) = field
                    .default_value
                    .as_ref()
                    .and_then(|raw| default_literal(field.kind, raw))
                {
                    value = value.default_value(literal);
                }
                input = input.field(value);
            }
            inputs.push(input);
        }

        if has_role_for(services, plan, Operation::Update) {
            let mut input = InputObject::new(format!("{}UpdateInput", plan.type_name));
            for field in &plan.fields {
                if field.is_autogenerated || field.is_primary_key {
                    continue;
                }
                input = input.field(InputValue::new(
                    &field.exposed,
                    TypeRef::named(field.kind.graphql_type_name()),
                ));
            }
            inputs.push(input);
        }
    }
    inputs
}
