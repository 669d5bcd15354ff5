//! Authentication and authorization
//!
//! - token verification and role selection (`AuthUser`)
//! - per-entity, per-operation role and column resolution (`resolver`)
//! - database policy substitution (`policy`)
//!
//! Requests carry a bearer token (HS256 JWT) and may select an active role
//! via the `X-API-ROLE` header. Unauthenticated requests run as the
//! `anonymous` role.

pub mod policy;
pub mod resolver;

pub use resolver::AuthorizationResolver;

use std::collections::HashMap;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value as JsonValue;

use crate::error::RequestError;

pub const ROLE_ANONYMOUS: &str = "anonymous";
pub const ROLE_AUTHENTICATED: &str = "authenticated";

/// Header used to select one of the caller's roles for this request.
pub const CLIENT_ROLE_HEADER: &str = "x-api-role";

/// The caller's identity for one request: verified claims plus the roles
/// those claims grant. Anonymous callers get the `anonymous` role only.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Option<String>,
    pub roles: Vec<String>,
    /// Raw verified claims, for `@claims.x` policy substitution.
    pub claims: HashMap<String, JsonValue>,
}

impl AuthUser {
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            roles: vec![ROLE_ANONYMOUS.to_string()],
            claims: HashMap::new(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Choose the active role for this request.
    ///
    /// Without an `X-API-ROLE` header, authenticated callers act as
    /// `authenticated` and anonymous callers as `anonymous`. A requested
    /// role must be one the caller actually holds.
    pub fn select_role(&self, requested: Option<&str>) -> Result<String, RequestError> {
        let Some(requested) = requested else {
            return Ok(if self.is_authenticated() {
                ROLE_AUTHENTICATED.to_string()
            } else {
                ROLE_ANONYMOUS.to_string()
            });
        };

        let granted = requested.eq_ignore_ascii_case(ROLE_ANONYMOUS)
            || (self.is_authenticated() && requested.eq_ignore_ascii_case(ROLE_AUTHENTICATED))
            || self
                .roles
                .iter()
                .any(|role| role.eq_ignore_ascii_case(requested));
        if granted {
            Ok(requested.to_string())
        } else {
            Err(RequestError::Forbidden(format!(
                "role '{}' is not available to this caller",
                requested
            )))
        }
    }

    pub fn claim(&self, name: &str) -> Option<&JsonValue> {
        self.claims.get(name)
    }
}

/// Verify a bearer token and build the caller's identity from its claims.
///
/// `sub` becomes the user id; `roles` (array) or `role` (string) become the
/// granted roles, with `authenticated` always implied.
pub fn verify_token(token: &str, secret: &str) -> Result<AuthUser, RequestError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.validate_aud = false;
    // Tokens must carry an expiry; without this, a token minted with no
    // exp claim would validate forever.
    validation.set_required_spec_claims(&["exp"]);

    let token_data = decode::<HashMap<String, JsonValue>>(
        token,
        &DecodingKey::from_secret(secret.trim().as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "token verification failed");
        RequestError::Unauthenticated
    })?;
    let claims = token_data.claims;

    let user_id = claims
        .get("sub")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    if user_id.is_none() {
        tracing::debug!("token has no sub claim");
        return Err(RequestError::Unauthenticated);
    }

    let mut roles: Vec<String> = match claims.get("roles") {
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    if roles.is_empty() {
        if let Some(role) = claims.get("role").and_then(|v| v.as_str()) {
            roles.push(role.to_string());
        }
    }
    if !roles
        .iter()
        .any(|r| r.eq_ignore_ascii_case(ROLE_AUTHENTICATED))
    {
        roles.push(ROLE_AUTHENTICATED.to_string());
    }

    Ok(AuthUser {
        user_id,
        roles,
        claims,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn token(claims: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn future_exp() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn test_verify_token_extracts_roles() {
        let token = token(json!({
            "sub": "u1",
            "roles": ["author", "editor"],
            "exp": future_exp(),
        }));
        let user = verify_token(&token, SECRET).unwrap();
        assert_eq!(user.user_id.as_deref(), Some("u1"));
        assert_eq!(user.roles, vec!["author", "editor", "authenticated"]);
    }

    #[test]
    fn test_verify_token_rejects_bad_signature() {
        let token = token(json!({ "sub": "u1", "exp": future_exp() }));
        assert!(matches!(
            verify_token(&token, "other-secret"),
            Err(RequestError::Unauthenticated)
        ));
    }

    #[test]
    fn test_verify_token_requires_exp() {
        let token = token(json!({ "sub": "u1", "roles": ["author"] }));
        assert!(matches!(
            verify_token(&token, SECRET),
            Err(RequestError::Unauthenticated)
        ));
    }

    #[test]
    fn test_verify_token_requires_sub() {
        let token = token(json!({ "exp": future_exp() }));
        assert!(matches!(
            verify_token(&token, SECRET),
            Err(RequestError::Unauthenticated)
        ));
    }

    #[test]
    fn test_role_selection_defaults() {
        let anonymous = AuthUser::anonymous();
        assert_eq!(anonymous.select_role(None).unwrap(), "anonymous");

        let user = AuthUser {
            user_id: Some("u1".into()),
            roles: vec!["author".into(), "authenticated".into()],
            claims: HashMap::new(),
        };
        assert_eq!(user.select_role(None).unwrap(), "authenticated");
        assert_eq!(user.select_role(Some("author")).unwrap(), "author");
        assert!(matches!(
            user.select_role(Some("admin")),
            Err(RequestError::Forbidden(_))
        ));
    }

    #[test]
    fn test_anonymous_cannot_claim_authenticated() {
        let anonymous = AuthUser::anonymous();
        assert!(anonymous.select_role(Some("authenticated")).is_err());
        assert_eq!(anonymous.select_role(Some("anonymous")).unwrap(), "anonymous");
    }
}
