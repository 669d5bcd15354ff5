//! Error taxonomies for the gateway
//!
//! Two distinct families, matching how failures propagate:
//! - `SchemaBuildError`: fatal at startup/reload. A snapshot that fails to
//!   build is discarded wholesale; the previous snapshot keeps serving.
//! - `RequestError`: terminal for a single request, surfaced as a 400-class
//!   JSON response. Never retried or recovered locally.

use async_graphql::ErrorExtensions;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Fatal errors raised while building a gateway snapshot (metadata discovery,
/// authorization resolution, GraphQL schema generation).
#[derive(Debug, Error)]
pub enum SchemaBuildError {
    #[error("column '{column}' on entity '{entity}' has unmapped system type '{system_type}'")]
    UnmappedColumnType {
        entity: String,
        column: String,
        system_type: String,
    },

    #[error("entity '{entity}' has no primary key and no 'id' field to fall back on")]
    MissingPrimaryKey { entity: String },

    #[error("entity '{entity}' maps to unknown database object '{object}'")]
    UnknownDatabaseObject { entity: String, object: String },

    #[error(
        "relationship '{relationship}' on entity '{entity}' targets entity '{target}' \
         which is absent from the configuration"
    )]
    UnknownRelationshipTarget {
        entity: String,
        relationship: String,
        target: String,
    },

    #[error("relationship '{relationship}' on entity '{entity}' has unsupported cardinality '{cardinality}'")]
    UnsupportedCardinality {
        entity: String,
        relationship: String,
        cardinality: String,
    },

    #[error("mapping on entity '{entity}' references unknown backing column '{column}'")]
    InvalidMapping { entity: String, column: String },

    #[error("invalid database policy on entity '{entity}': {message}")]
    InvalidPolicy { entity: String, message: String },

    #[error("failed to register generated GraphQL schema: {0}")]
    Registration(String),

    #[error("metadata discovery failed: {0}")]
    Introspection(#[from] sqlx::Error),
}

/// Request-scoped errors. Each maps to an HTTP status and a stable error code;
/// the message is safe to show to the API caller.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("unsupported operation '{op}' on {type_name}")]
    UnsupportedOperator { op: String, type_name: String },

    #[error("'{literal}' is not a valid value for type {target_type}")]
    InvalidLiteral {
        literal: String,
        target_type: String,
    },

    #[error("Invalid Query Parameter: {0}")]
    InvalidQueryParameter(String),

    #[error("invalid $filter expression: {0}")]
    InvalidFilter(String),

    #[error("invalid $orderby expression: {0}")]
    InvalidOrderBy(String),

    #[error("invalid $select entry: {0}")]
    InvalidSelect(String),

    #[error("field '{field}' does not exist on entity '{entity}' or is not accessible")]
    UnknownField { entity: String, field: String },

    #[error("entity '{0}' not found")]
    EntityNotFound(String),

    #[error("authentication required")]
    Unauthenticated,

    #[error("role '{0}' is not permitted to perform this operation")]
    Forbidden(String),

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl RequestError {
    /// HTTP status for the REST surface.
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::EntityNotFound(_) => StatusCode::NOT_FOUND,
            RequestError::Unauthenticated => StatusCode::UNAUTHORIZED,
            RequestError::Forbidden(_) => StatusCode::FORBIDDEN,
            RequestError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Stable machine-readable code, also attached to GraphQL error extensions.
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::UnsupportedOperator { .. } => "UNSUPPORTED_OPERATOR",
            RequestError::InvalidLiteral { .. } => "INVALID_LITERAL",
            RequestError::InvalidQueryParameter(_) => "INVALID_QUERY_PARAMETER",
            RequestError::InvalidFilter(_) => "INVALID_FILTER",
            RequestError::InvalidOrderBy(_) => "INVALID_ORDERBY",
            RequestError::InvalidSelect(_) => "INVALID_SELECT",
            RequestError::UnknownField { .. } => "UNKNOWN_FIELD",
            RequestError::EntityNotFound(_) => "ENTITY_NOT_FOUND",
            RequestError::Unauthenticated => "UNAUTHORIZED",
            RequestError::Forbidden(_) => "FORBIDDEN",
            RequestError::Unsupported(_) => "UNSUPPORTED",
            RequestError::Database(_) => "DATABASE_ERROR",
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        // Internal failures are logged with detail but reported generically.
        if let RequestError::Database(ref e) = self {
            tracing::error!(error = %e, "database error while serving request");
        }

        let status = self.status();
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

impl RequestError {
    /// Conversion for the GraphQL surface, carrying the stable code in the
    /// error extensions. An inherent method rather than `From`, which the
    /// blanket `Display` conversion in async-graphql already claims.
    pub fn into_graphql(self) -> async_graphql::Error {
        let code = self.code();
        async_graphql::Error::new(self.to_string())
            .extend_with(|_, e| e.set("code", code))
    }
}
