//! REST entity endpoints
//!
//! `GET /api/{entity}` lists rows; `GET /api/{entity}/{field}/{value}`
//! addresses a single row by a primary key field. Query parameters follow
//! the OData convention: `$select`, `$filter`, `$orderby`, `$first`,
//! `$after`. Any other key is rejected so typos fail loudly instead of
//! silently returning the unfiltered collection.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::header::AUTHORIZATION,
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value as JsonValue};

use crate::auth::{verify_token, AuthUser, CLIENT_ROLE_HEADER};
use crate::config::{Operation, SourceKind};
use crate::error::RequestError;
use crate::gateway::GatewaySnapshot;
use crate::query::odata::{parse_orderby, translate_filter};
use crate::query::{ParamStore, SqlValue};
use crate::engine::{build_select, SelectSpec};
use crate::schema::resolve::{
    check_operation, conjoin, encode_cursor, execute_procedure, page_bounds, policy_conjunct,
    read_projection, ListArgs,
};
use crate::schema::EntityPlan;
use crate::AppState;

const ALLOWED_KEYS: [&str; 5] = ["$select", "$filter", "$orderby", "$first", "$after"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{entity}", get(list_rows))
        .route("/{entity}/{field}/{value}", get(row_by_key))
}

/// Resolve the bearer token and requested role from the request headers.
pub fn request_identity(
    headers: &HeaderMap,
    jwt_secret: &str,
) -> Result<(String, AuthUser), RequestError> {
    let user = match bearer_token(headers) {
        Some(token) => verify_token(&token, jwt_secret)?,
        None => AuthUser::anonymous(),
    };
    let requested = headers
        .get(CLIENT_ROLE_HEADER)
        .and_then(|v| v.to_str().ok());
    let role = user.select_role(requested)?;
    Ok((role, user))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .filter(|h| h.starts_with("Bearer "))
        .map(|h| h[7..].to_string())
}

fn find_plan(
    snapshot: &GatewaySnapshot,
    entity: &str,
) -> Result<Arc<EntityPlan>, RequestError> {
    snapshot
        .plans()
        .get(entity)
        .filter(|p| p.rest_enabled && !p.is_linking)
        .cloned()
        .ok_or_else(|| RequestError::EntityNotFound(entity.to_string()))
}

fn validate_keys(query: &HashMap<String, String>) -> Result<(), RequestError> {
    for key in query.keys() {
        if !ALLOWED_KEYS.contains(&key.as_str()) {
            return Err(RequestError::InvalidQueryParameter(format!(
                "'{}' is not a recognized query parameter",
                key
            )));
        }
    }
    Ok(())
}

/// Apply `$select` on top of the role's readable projection.
fn apply_select(
    projection: Vec<(String, String)>,
    select: Option<&str>,
) -> Result<Vec<(String, String)>, RequestError> {
    let Some(raw) = select else {
        return Ok(projection);
    };
    let mut selected = Vec::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() || entry.eq_ignore_ascii_case("null") {
            return Err(RequestError::InvalidSelect(format!(
                "'{}' is not a selectable field",
                entry
            )));
        }
        let Some(column) = projection.iter().find(|(_, exposed)| exposed == entry) else {
            return Err(RequestError::InvalidSelect(format!(
                "'{}' is not a selectable field",
                entry
            )));
        };
        selected.push(column.clone());
    }
    Ok(selected)
}

fn parse_first(query: &HashMap<String, String>) -> Result<Option<i64>, RequestError> {
    match query.get("$first") {
        None => Ok(None),
        Some(raw) => raw.parse::<i64>().map(Some).map_err(|_| {
            RequestError::InvalidQueryParameter("'$first' must be an integer".into())
        }),
    }
}

fn next_link(
    entity: &str,
    query: &HashMap<String, String>,
    cursor: &str,
) -> String {
    let mut pairs: Vec<String> = ALLOWED_KEYS
        .iter()
        .filter(|k| **k != "$after")
        .filter_map(|k| query.get(*k).map(|v| format!("{}={}", k, v)))
        .collect();
    pairs.push(format!("$after={}", cursor));
    format!("/api/{}?{}", entity, pairs.join("&"))
}

async fn list_rows(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<JsonValue>, RequestError> {
    let snapshot = state.gateway.snapshot();
    let services = &snapshot.services;
    let plan = find_plan(&snapshot, &entity)?;
    let (role, user) = request_identity(&headers, &state.config.jwt_secret)?;
    validate_keys(&query)?;

    if plan.kind == SourceKind::StoredProcedure {
        let rows = execute_procedure(services, &plan, &role).await?;
        return Ok(Json(json!({ "value": rows })));
    }

    check_operation(services, &plan, &role, Operation::Read)?;
    let edm = services
        .edm
        .for_entity(&plan.entity)
        .ok_or_else(|| RequestError::EntityNotFound(plan.entity.clone()))?;

    let mut params = ParamStore::new();
    let filter = match query.get("$filter") {
        Some(raw) => Some(translate_filter(raw, edm, &mut params)?),
        None => None,
    };
    let policy = policy_conjunct(services, &plan, &role, &user, Operation::Read, &mut params)?;
    let predicate = conjoin(vec![filter, policy]);

    let order_by = match query.get("$orderby") {
        Some(raw) => parse_orderby(raw, edm)?,
        None => Vec::new(),
    };
    let order_by = crate::query::with_primary_key_tiebreak(order_by, &plan.object);

    let args = ListArgs {
        filter: None,
        order_by: None,
        first: parse_first(&query)?,
        after: query.get("$after").cloned(),
    };
    let (limit, offset) = page_bounds(&args)?;

    let projection = read_projection(services, &plan, &role, Operation::Read)?;
    let projection = apply_select(projection, query.get("$select").map(String::as_str))?;

    let sql = build_select(
        &SelectSpec {
            object: &plan.object,
            columns: &projection,
            predicate: predicate.as_ref(),
            order_by: &order_by,
            limit: Some(limit as u64 + 1),
            offset: offset as u64,
        },
        services.engine.dialect(),
    );
    let mut rows = services.engine.fetch_all(&sql, params.values()).await?;

    let has_next_page = rows.len() as i64 > limit;
    rows.truncate(limit as usize);

    let mut body = json!({ "value": rows });
    if has_next_page {
        let cursor = encode_cursor(offset + limit - 1);
        body["nextLink"] = JsonValue::String(next_link(&entity, &query, &cursor));
    }
    Ok(Json(body))
}

async fn row_by_key(
    State(state): State<AppState>,
    Path((entity, field, value)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<JsonValue>, RequestError> {
    let snapshot = state.gateway.snapshot();
    let services = &snapshot.services;
    let plan = find_plan(&snapshot, &entity)?;
    let (role, user) = request_identity(&headers, &state.config.jwt_secret)?;
    validate_keys(&query)?;

    check_operation(services, &plan, &role, Operation::Read)?;

    let key = plan
        .key_fields()
        .into_iter()
        .find(|f| f.exposed == field)
        .cloned()
        .ok_or_else(|| {
            RequestError::InvalidQueryParameter(format!(
                "'{}' is not a key field of '{}'",
                field, entity
            ))
        })?;

    let mut params = ParamStore::new();
    let typed = match key.kind.graphql_type_name() {
        "Int" => SqlValue::Int(value.parse::<i64>().map_err(|_| {
            RequestError::InvalidLiteral {
                literal: value.clone(),
                target_type: key.kind.graphql_type_name().to_string(),
            }
        })?),
        "Float" => SqlValue::Float(value.parse::<f64>().map_err(|_| {
            RequestError::InvalidLiteral {
                literal: value.clone(),
                target_type: key.kind.graphql_type_name().to_string(),
            }
        })?),
        "Boolean" => SqlValue::Bool(value.parse::<bool>().map_err(|_| {
            RequestError::InvalidLiteral {
                literal: value.clone(),
                target_type: key.kind.graphql_type_name().to_string(),
            }
        })?),
        _ => SqlValue::String(value.clone()),
    };
    let param = params.add(typed);
    let key_predicate = crate::query::Predicate::comparison(
        &key.backing,
        crate::query::PredicateOperation::Equal,
        param,
    );
    let policy = policy_conjunct(services, &plan, &role, &user, Operation::Read, &mut params)?;
    let predicate = conjoin(vec![Some(key_predicate), policy]);

    let projection = read_projection(services, &plan, &role, Operation::Read)?;
    let projection = apply_select(projection, query.get("$select").map(String::as_str))?;

    let sql = build_select(
        &SelectSpec {
            object: &plan.object,
            columns: &projection,
            predicate: predicate.as_ref(),
            order_by: &[],
            limit: Some(1),
            offset: 0,
        },
        services.engine.dialect(),
    );
    match services.engine.fetch_optional(&sql, params.values()).await? {
        Some(row) => Ok(Json(json!({ "value": [row] }))),
        None => Err(RequestError::EntityNotFound(format!(
            "{}/{}/{}",
            entity, field, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===== Query key validation =====

    #[test]
    fn test_unknown_query_key_rejected() {
        let mut query = HashMap::new();
        query.insert("$filter".to_string(), "id eq 1".to_string());
        query.insert("$top".to_string(), "5".to_string());
        let err = validate_keys(&query).unwrap_err();
        assert!(matches!(err, RequestError::InvalidQueryParameter(_)));
        assert!(err.to_string().contains("$top"));
    }

    #[test]
    fn test_all_recognized_keys_accepted() {
        let mut query = HashMap::new();
        for key in ALLOWED_KEYS {
            query.insert(key.to_string(), "x".to_string());
        }
        assert!(validate_keys(&query).is_ok());
    }

    // ===== $select =====

    fn projection() -> Vec<(String, String)> {
        vec![
            ("id".to_string(), "id".to_string()),
            ("title".to_string(), "title".to_string()),
            ("pub_year".to_string(), "publicationYear".to_string()),
        ]
    }

    #[test]
    fn test_select_filters_projection_in_order() {
        let cols =
            apply_select(projection(), Some("publicationYear,id")).unwrap();
        assert_eq!(
            cols,
            vec![
                ("pub_year".to_string(), "publicationYear".to_string()),
                ("id".to_string(), "id".to_string()),
            ]
        );
    }

    #[test]
    fn test_select_rejects_blank_and_null_entries() {
        assert!(matches!(
            apply_select(projection(), Some("id,,title")),
            Err(RequestError::InvalidSelect(_))
        ));
        assert!(matches!(
            apply_select(projection(), Some("null")),
            Err(RequestError::InvalidSelect(_))
        ));
    }

    #[test]
    fn test_select_rejects_unauthorized_field() {
        let err = apply_select(projection(), Some("secret")).unwrap_err();
        assert!(matches!(err, RequestError::InvalidSelect(_)));
        assert!(err.to_string().contains("secret"));
    }

    #[test]
    fn test_no_select_keeps_full_projection() {
        assert_eq!(apply_select(projection(), None).unwrap().len(), 3);
    }

    // ===== nextLink =====

    #[test]
    fn test_next_link_preserves_parameters_and_replaces_cursor() {
        let mut query = HashMap::new();
        query.insert("$filter".to_string(), "id gt 5".to_string());
        query.insert("$after".to_string(), "old".to_string());
        let link = next_link("Book", &query, "newcursor");
        assert!(link.starts_with("/api/Book?"));
        assert!(link.contains("$filter=id gt 5"));
        assert!(link.contains("$after=newcursor"));
        assert!(!link.contains("old"));
    }
}
