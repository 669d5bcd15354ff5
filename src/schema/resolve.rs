//! Resolver layer
//!
//! Rows travel through the generated schema as plain `serde_json::Value`
//! objects keyed by exposed field name; connections as [`ConnectionPage`].
//! Every resolver assembles a predicate from the request filter, the
//! caller's database policy and any structural condition (primary key or
//! relationship join), then hands rendered SQL to the query engine.

use async_graphql::{Name, Value};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::auth::policy::policy_predicate;
use crate::auth::{AuthUser, ROLE_ANONYMOUS};
use crate::config::{Operation, SourceKind};
use crate::engine::{build_delete, build_insert, build_select, build_update, SelectSpec};
use crate::error::RequestError;
use crate::query::filter::FilterParser;
use crate::query::orderby::{with_primary_key_tiebreak, OrderByColumn, OrderDirection};
use crate::query::params::{ParamStore, SqlValue};
use crate::query::predicate::{Predicate, PredicateOperation};
use crate::schema::{EntityPlan, RelationshipPlan, ResolverServices};

pub const DEFAULT_PAGE_SIZE: i64 = 25;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Active role for the request, selected from the caller's token and the
/// `X-API-ROLE` header before execution starts.
#[derive(Debug, Clone)]
pub struct RequestRole(pub String);

/// One page of list results.
#[derive(Debug, Clone)]
pub struct ConnectionPage {
    pub items: Vec<JsonValue>,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

impl ConnectionPage {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            end_cursor: None,
            has_next_page: false,
        }
    }
}

pub fn encode_cursor(offset: i64) -> String {
    BASE64.encode(format!("cursor:{}", offset))
}

pub fn decode_cursor(cursor: &str) -> Result<i64, RequestError> {
    let invalid = || RequestError::InvalidQueryParameter("'after' is not a valid cursor".into());
    let decoded = BASE64.decode(cursor).map_err(|_| invalid())?;
    let text = String::from_utf8(decoded).map_err(|_| invalid())?;
    let offset = text.strip_prefix("cursor:").ok_or_else(invalid)?;
    offset.parse().map_err(|_| invalid())
}

/// Pagination arguments common to list queries and relationship fields.
#[derive(Debug, Clone, Default)]
pub struct ListArgs {
    pub filter: Option<Value>,
    pub order_by: Option<Value>,
    pub first: Option<i64>,
    pub after: Option<String>,
}

pub(crate) fn page_bounds(args: &ListArgs) -> Result<(i64, i64), RequestError> {
    let limit = match args.first {
        None => DEFAULT_PAGE_SIZE,
        Some(n) if n > 0 => n.min(MAX_PAGE_SIZE),
        Some(_) => {
            return Err(RequestError::InvalidQueryParameter(
                "'first' must be a positive integer".into(),
            ));
        }
    };
    let offset = match &args.after {
        Some(cursor) => decode_cursor(cursor)? + 1,
        None => 0,
    };
    Ok((limit, offset))
}

/// Operation gate: entities readable by the anonymous system role carry no
/// runtime check at all; everything else requires the active role to be
/// permitted.
pub fn check_operation(
    services: &ResolverServices,
    plan: &EntityPlan,
    role: &str,
    operation: Operation,
) -> Result<(), RequestError> {
    if services.authorizer.anonymous_allowed(&plan.entity, operation) {
        return Ok(());
    }
    if services
        .authorizer
        .is_operation_allowed(&plan.entity, role, operation)
    {
        Ok(())
    } else {
        Err(RequestError::Forbidden(role.to_string()))
    }
}

/// The columns the active role may read, as `(backing, exposed)` pairs in
/// field order. Falls back to the anonymous role's columns when the active
/// role has no rule of its own (possible when the entity is
/// anonymous-readable).
pub(crate) fn read_projection(
    services: &ResolverServices,
    plan: &EntityPlan,
    role: &str,
    operation: Operation,
) -> Result<Vec<(String, String)>, RequestError> {
    if plan.kind == SourceKind::StoredProcedure {
        return Ok(plan.projection());
    }
    let allowed = services
        .authorizer
        .columns_allowed(&plan.entity, role, operation)
        .or_else(|| {
            services
                .authorizer
                .columns_allowed(&plan.entity, ROLE_ANONYMOUS, operation)
        })
        .ok_or_else(|| RequestError::Forbidden(role.to_string()))?;

    Ok(plan
        .fields
        .iter()
        .filter(|f| allowed.contains(&f.exposed))
        .map(|f| (f.backing.clone(), f.exposed.clone()))
        .collect())
}

/// AND together the optional conjuncts of a request predicate.
pub(crate) fn conjoin(parts: Vec<Option<Predicate>>) -> Option<Predicate> {
    let mut result: Option<Predicate> = None;
    for part in parts.into_iter().flatten() {
        result = Some(match result {
            Some(existing) => Predicate::and(existing, part),
            None => part,
        });
    }
    result
}

pub(crate) fn policy_conjunct(
    services: &ResolverServices,
    plan: &EntityPlan,
    role: &str,
    user: &AuthUser,
    operation: Operation,
    params: &mut ParamStore,
) -> Result<Option<Predicate>, RequestError> {
    let Some(policy) = services
        .authorizer
        .database_policy(&plan.entity, role, operation)
    else {
        return Ok(None);
    };
    let edm = services
        .edm
        .for_entity(&plan.entity)
        .ok_or_else(|| RequestError::EntityNotFound(plan.entity.clone()))?;
    policy_predicate(policy, user, edm, params).map(Some)
}

fn order_columns(
    plan: &EntityPlan,
    order_by: Option<&Value>,
) -> Result<Vec<OrderByColumn>, RequestError> {
    let mut columns = Vec::new();
    if let Some(value) = order_by {
        let Value::Object(entries) = value else {
            return Err(RequestError::InvalidOrderBy(
                "orderBy must be an input object".into(),
            ));
        };
        for (field_name, direction) in entries {
            let field = plan.field(field_name.as_str()).ok_or_else(|| {
                RequestError::UnknownField {
                    entity: plan.entity.clone(),
                    field: field_name.to_string(),
                }
            })?;
            let direction = match direction {
                Value::Enum(name) if name == "DESC" => OrderDirection::Desc,
                Value::Enum(_) => OrderDirection::Asc,
                Value::Null => continue,
                other => {
                    return Err(RequestError::InvalidOrderBy(format!(
                        "'{}' is not a valid direction",
                        other
                    )));
                }
            };
            columns.push(OrderByColumn::new(&plan.object, &field.backing, direction));
        }
    }
    Ok(with_primary_key_tiebreak(columns, &plan.object))
}

// =============================================================================
// Read resolvers
// =============================================================================

pub async fn fetch_list(
    services: &ResolverServices,
    plan: &EntityPlan,
    role: &str,
    user: &AuthUser,
    args: ListArgs,
) -> Result<ConnectionPage, RequestError> {
    check_operation(services, plan, role, Operation::Read)?;
    fetch_page(services, plan, role, user, args, None, ParamStore::new()).await
}

pub async fn fetch_by_pk(
    services: &ResolverServices,
    plan: &EntityPlan,
    role: &str,
    user: &AuthUser,
    keys: &IndexMap<Name, Value>,
) -> Result<Option<JsonValue>, RequestError> {
    check_operation(services, plan, role, Operation::Read)?;

    let mut params = ParamStore::new();
    let key_predicate = key_predicate(plan, keys, &mut params)?;
    let policy = policy_conjunct(services, plan, role, user, Operation::Read, &mut params)?;
    let predicate = conjoin(vec![Some(key_predicate), policy])
        .unwrap_or_else(Predicate::always_false);

    let projection = read_projection(services, plan, role, Operation::Read)?;
    let sql = build_select(
        &SelectSpec {
            object: &plan.object,
            columns: &projection,
            predicate: Some(&predicate),
            order_by: &[],
            limit: Some(1),
            offset: 0,
        },
        services.engine.dialect(),
    );
    services.engine.fetch_optional(&sql, params.values()).await
}

fn key_predicate(
    plan: &EntityPlan,
    keys: &IndexMap<Name, Value>,
    params: &mut ParamStore,
) -> Result<Predicate, RequestError> {
    let mut conditions = Vec::new();
    for field in plan.key_fields() {
        let value = keys
            .get(field.exposed.as_str())
            .ok_or_else(|| RequestError::InvalidQueryParameter(format!(
                "missing key field '{}'",
                field.exposed
            )))?;
        let param = params.add_graphql(field.kind, value)?;
        conditions.push(Predicate::comparison(
            field.backing.clone(),
            PredicateOperation::Equal,
            param,
        ));
    }
    if conditions.is_empty() {
        return Err(RequestError::EntityNotFound(plan.entity.clone()));
    }
    Ok(Predicate::chain(conditions, PredicateOperation::And, true))
}

/// What a relationship field resolves to.
pub enum Related {
    One(Option<JsonValue>),
    Many(ConnectionPage),
}

pub async fn fetch_related(
    services: &ResolverServices,
    rel: &RelationshipPlan,
    parent_plan: &EntityPlan,
    parent_row: &JsonValue,
    role: &str,
    user: &AuthUser,
    args: ListArgs,
) -> Result<Related, RequestError> {
    let target = services
        .plans
        .get(&rel.target_entity)
        .ok_or_else(|| RequestError::EntityNotFound(rel.target_entity.clone()))?;
    check_operation(services, target, role, Operation::Read)?;

    let mut params = ParamStore::new();
    let mut joins = Vec::new();
    for (source_col, target_col) in rel.source_columns.iter().zip(&rel.target_columns) {
        let exposed = services
            .provider
            .try_exposed_name(&parent_plan.entity, source_col)
            .unwrap_or(source_col);
        let value = &parent_row[exposed];
        let Some(value) = sql_value_from_json(value) else {
            // A null FK can never join to anything.
            return Ok(match rel.cardinality {
                crate::config::Cardinality::One => Related::One(None),
                crate::config::Cardinality::Many => Related::Many(ConnectionPage::empty()),
            });
        };
        let param = params.add(value);
        joins.push(Predicate::comparison(
            target_col.clone(),
            PredicateOperation::Equal,
            param,
        ));
    }
    let join = Predicate::chain(joins, PredicateOperation::And, true);

    match rel.cardinality {
        crate::config::Cardinality::Many => {
            // Join params were added first; the page fetch appends its own.
            let page =
                fetch_page(services, target, role, user, args, Some(join), params).await?;
            Ok(Related::Many(page))
        }
        crate::config::Cardinality::One => {
            let policy =
                policy_conjunct(services, target, role, user, Operation::Read, &mut params)?;
            let predicate = conjoin(vec![Some(join), policy])
                .unwrap_or_else(Predicate::always_false);
            let projection = read_projection(services, target, role, Operation::Read)?;
            let sql = build_select(
                &SelectSpec {
                    object: &target.object,
                    columns: &projection,
                    predicate: Some(&predicate),
                    order_by: &[],
                    limit: Some(1),
                    offset: 0,
                },
                services.engine.dialect(),
            );
            let row = services.engine.fetch_optional(&sql, params.values()).await?;
            Ok(Related::One(row))
        }
    }
}

/// Shared by list queries and to-many relationship fields; `join` is the
/// structural condition a relationship adds, with its bind values already
/// in `params`.
async fn fetch_page(
    services: &ResolverServices,
    plan: &EntityPlan,
    role: &str,
    user: &AuthUser,
    args: ListArgs,
    join: Option<Predicate>,
    mut params: ParamStore,
) -> Result<ConnectionPage, RequestError> {
    let (limit, offset) = page_bounds(&args)?;

    let filter = match &args.filter {
        Some(value) => Some(
            FilterParser::new(&plan.entity, &services.provider).parse(value, &mut params)?,
        ),
        None => None,
    };
    let policy = policy_conjunct(services, plan, role, user, Operation::Read, &mut params)?;
    let predicate = conjoin(vec![join, filter, policy]);

    let order_by = order_columns(plan, args.order_by.as_ref())?;
    let projection = read_projection(services, plan, role, Operation::Read)?;

    let sql = build_select(
        &SelectSpec {
            object: &plan.object,
            columns: &projection,
            predicate: predicate.as_ref(),
            order_by: &order_by,
            limit: Some((limit + 1) as u64),
            offset: offset as u64,
        },
        services.engine.dialect(),
    );
    let mut items = services.engine.fetch_all(&sql, params.values()).await?;

    let has_next_page = items.len() as i64 > limit;
    items.truncate(limit as usize);
    let end_cursor = if items.is_empty() {
        None
    } else {
        Some(encode_cursor(offset + items.len() as i64 - 1))
    };
    Ok(ConnectionPage {
        items,
        end_cursor,
        has_next_page,
    })
}

// =============================================================================
// Stored procedures
// =============================================================================

pub async fn execute_procedure(
    services: &ResolverServices,
    plan: &EntityPlan,
    role: &str,
) -> Result<Vec<JsonValue>, RequestError> {
    check_operation(services, plan, role, Operation::Execute)?;
    services.engine.execute_procedure(&plan.entity).await
}

// =============================================================================
// Mutations
// =============================================================================

pub async fn create_row(
    services: &ResolverServices,
    plan: &EntityPlan,
    role: &str,
    item: &IndexMap<Name, Value>,
) -> Result<JsonValue, RequestError> {
    check_operation(services, plan, role, Operation::Create)?;
    let writable = writable_columns(services, plan, role, Operation::Create)?;

    let mut params = ParamStore::new();
    let mut columns = Vec::new();
    for (name, value) in item {
        let field = plan
            .field(name.as_str())
            .ok_or_else(|| RequestError::UnknownField {
                entity: plan.entity.clone(),
                field: name.to_string(),
            })?;
        if field.is_autogenerated {
            return Err(RequestError::Unsupported(format!(
                "field '{}' is generated by the database and cannot be written",
                name
            )));
        }
        if !writable.contains(&field.exposed) {
            return Err(RequestError::Forbidden(role.to_string()));
        }
        let param = params.add_graphql(field.kind, value)?;
        columns.push((field.backing.clone(), param));
    }

    let projection = read_projection(services, plan, role, Operation::Read)
        .unwrap_or_else(|_| plan.projection());
    let sql = build_insert(&plan.object, &columns, &projection, services.engine.dialect());
    services
        .engine
        .fetch_optional(&sql, params.values())
        .await?
        .ok_or(RequestError::Database(sqlx::Error::RowNotFound))
}

pub async fn update_row(
    services: &ResolverServices,
    plan: &EntityPlan,
    role: &str,
    user: &AuthUser,
    keys: &IndexMap<Name, Value>,
    item: &IndexMap<Name, Value>,
) -> Result<Option<JsonValue>, RequestError> {
    check_operation(services, plan, role, Operation::Update)?;
    let writable = writable_columns(services, plan, role, Operation::Update)?;

    let mut params = ParamStore::new();
    let mut assignments = Vec::new();
    for (name, value) in item {
        let field = plan
            .field(name.as_str())
            .ok_or_else(|| RequestError::UnknownField {
                entity: plan.entity.clone(),
                field: name.to_string(),
            })?;
        if field.is_primary_key || field.is_autogenerated {
            return Err(RequestError::Unsupported(format!(
                "field '{}' cannot be updated",
                name
            )));
        }
        if !writable.contains(&field.exposed) {
            return Err(RequestError::Forbidden(role.to_string()));
        }
        let param = params.add_graphql(field.kind, value)?;
        assignments.push((field.backing.clone(), param));
    }
    if assignments.is_empty() {
        return Err(RequestError::InvalidQueryParameter(
            "update requires at least one field".into(),
        ));
    }

    let key_predicate = key_predicate(plan, keys, &mut params)?;
    let policy = policy_conjunct(services, plan, role, user, Operation::Update, &mut params)?;
    let predicate = conjoin(vec![Some(key_predicate), policy])
        .unwrap_or_else(Predicate::always_false);

    let projection = read_projection(services, plan, role, Operation::Read)
        .unwrap_or_else(|_| plan.projection());
    let sql = build_update(
        &plan.object,
        &assignments,
        &predicate,
        &projection,
        services.engine.dialect(),
    );
    services.engine.fetch_optional(&sql, params.values()).await
}

pub async fn delete_row(
    services: &ResolverServices,
    plan: &EntityPlan,
    role: &str,
    user: &AuthUser,
    keys: &IndexMap<Name, Value>,
) -> Result<Option<JsonValue>, RequestError> {
    check_operation(services, plan, role, Operation::Delete)?;

    let mut params = ParamStore::new();
    let key_predicate = key_predicate(plan, keys, &mut params)?;
    let policy = policy_conjunct(services, plan, role, user, Operation::Delete, &mut params)?;
    let predicate = conjoin(vec![Some(key_predicate), policy])
        .unwrap_or_else(Predicate::always_false);

    let projection = read_projection(services, plan, role, Operation::Read)
        .unwrap_or_else(|_| plan.projection());
    let sql = build_delete(&plan.object, &predicate, &projection, services.engine.dialect());
    services.engine.fetch_optional(&sql, params.values()).await
}

/// Convert a value read back from a row into a bind value. `None` for
/// JSON null (and anything non-scalar, which rows never contain).
fn sql_value_from_json(value: &JsonValue) -> Option<SqlValue> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(SqlValue::Bool(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(SqlValue::Int(i))
            } else {
                n.as_f64().map(SqlValue::Float)
            }
        }
        JsonValue::String(s) => Some(SqlValue::String(s.clone())),
        JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

fn writable_columns<'s>(
    services: &'s ResolverServices,
    plan: &EntityPlan,
    role: &str,
    operation: Operation,
) -> Result<&'s std::collections::BTreeSet<String>, RequestError> {
    services
        .authorizer
        .columns_allowed(&plan.entity, role, operation)
        .or_else(|| {
            services
                .authorizer
                .columns_allowed(&plan.entity, ROLE_ANONYMOUS, operation)
        })
        .ok_or_else(|| RequestError::Forbidden(role.to_string()))
}
