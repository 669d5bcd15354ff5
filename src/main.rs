//! Datagate - configuration-driven data API gateway
//!
//! The declarative runtime configuration maps database objects to entities;
//! everything else (GraphQL schema, REST routes, authorization) is derived
//! from it at startup and on reload. Queries are exposed via GraphQL at
//! /graphql and via REST under /api.

mod api;
mod auth;
mod config;
mod engine;
mod error;
mod gateway;
mod metadata;
mod query;
mod schema;

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::entities::request_identity;
use crate::config::Config;
use crate::gateway::Gateway;
use crate::schema::resolve::RequestRole;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Arc<Gateway>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let config = Arc::new(config);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "datagate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Datagate");

    let options =
        SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(false);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    tracing::info!("Database connected");

    // Startup fails hard on a broken configuration; reloads later keep the
    // previous snapshot on failure.
    let gateway = Arc::new(Gateway::initialize(&config.runtime_config_path, pool).await?);
    tracing::info!(
        config = %config.runtime_config_path,
        "Gateway initialized"
    );

    let state = AppState {
        config: config.clone(),
        gateway,
    };

    let app = Router::new()
        // Health endpoints (no auth required)
        .merge(api::health::router())
        // Generated REST entity endpoints
        .nest("/api", api::entities::router())
        // Administrative endpoints
        .nest("/admin", api::admin::router())
        // GraphQL endpoint (queries and mutations)
        .route("/graphql", get(graphiql).post(graphql_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);
    tracing::info!("GraphQL playground: http://localhost:{}/graphql", config.port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// GraphQL query/mutation handler with auth context
async fn graphql_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    // Token and role failures surface as GraphQL errors rather than a
    // transport-level rejection.
    let (role, user) = match request_identity(&headers, &state.config.jwt_secret) {
        Ok(identity) => identity,
        Err(err) => {
            let err = err.into_graphql();
            return async_graphql::Response::from_errors(vec![err.into_server_error(
                async_graphql::Pos::default(),
            )])
            .into();
        }
    };

    let request = req.into_inner().data(user).data(RequestRole(role));
    state.gateway.snapshot().schema.execute(request).await.into()
}

/// GraphiQL interactive playground (only for browsers)
async fn graphiql(headers: HeaderMap) -> impl IntoResponse {
    // Check if this is a browser request (accepts HTML)
    let accepts_html = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/html"))
        .unwrap_or(false);

    if accepts_html {
        axum::response::Html(GraphiQLSource::build().endpoint("/graphql").finish())
            .into_response()
    } else {
        (
            axum::http::StatusCode::METHOD_NOT_ALLOWED,
            axum::Json(serde_json::json!({
                "error": "GET requests are not supported for GraphQL queries. Use POST with Content-Type: application/json"
            })),
        )
            .into_response()
    }
}
