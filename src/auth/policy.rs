//! Database policy predicates
//!
//! A policy is an OData-style boolean expression over `@claims.x` (values
//! from the caller's token) and `@item.field` (columns of the row under
//! evaluation). Claims are substituted as typed literals, `@item.`
//! references become plain field names, and the result goes through the
//! regular `$filter` pipeline so it lands in the query as one more
//! parenthesized conjunct.

use serde_json::Value as JsonValue;

use crate::auth::AuthUser;
use crate::error::RequestError;
use crate::query::odata;
use crate::query::params::ParamStore;
use crate::query::predicate::Predicate;
use crate::schema::edm::EntityEdm;

/// Substitute claims and item references, then translate the policy into a
/// predicate against `edm`.
pub fn policy_predicate(
    policy: &str,
    user: &AuthUser,
    edm: &EntityEdm,
    params: &mut ParamStore,
) -> Result<Predicate, RequestError> {
    let substituted = substitute(policy, user)?;
    odata::translate_filter(&substituted, edm, params)
}

fn substitute(policy: &str, user: &AuthUser) -> Result<String, RequestError> {
    let mut out = String::with_capacity(policy.len());
    let mut rest = policy;

    while let Some(at) = rest.find('@') {
        out.push_str(&rest[..at]);
        rest = &rest[at..];

        if let Some(tail) = rest.strip_prefix("@claims.") {
            let (name, remainder) = split_identifier(tail);
            if name.is_empty() {
                return Err(RequestError::InvalidFilter(
                    "policy has a '@claims.' reference with no claim name".to_string(),
                ));
            }
            let value = user.claim(name).ok_or_else(|| {
                RequestError::Forbidden(format!("claim '{}' is not present in the token", name))
            })?;
            out.push_str(&claim_literal(name, value)?);
            rest = remainder;
        } else if let Some(tail) = rest.strip_prefix("@item.") {
            let (name, remainder) = split_identifier(tail);
            if name.is_empty() {
                return Err(RequestError::InvalidFilter(
                    "policy has an '@item.' reference with no field name".to_string(),
                ));
            }
            out.push_str(name);
            rest = remainder;
        } else {
            return Err(RequestError::InvalidFilter(
                "policy references must start with '@claims.' or '@item.'".to_string(),
            ));
        }
    }

    out.push_str(rest);
    Ok(out)
}

fn split_identifier(input: &str) -> (&str, &str) {
    let end = input
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .unwrap_or(input.len());
    input.split_at(end)
}

/// Render a claim as an OData literal. Strings are single-quoted with
/// embedded quotes doubled, so claim values cannot break out of the
/// expression.
fn claim_literal(name: &str, value: &JsonValue) -> Result<String, RequestError> {
    match value {
        JsonValue::String(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::Bool(b) => Ok(b.to_string()),
        JsonValue::Null => Ok("null".to_string()),
        JsonValue::Array(_) | JsonValue::Object(_) => Err(RequestError::InvalidFilter(format!(
            "claim '{}' is not a scalar value",
            name
        ))),
    }
}
