//! Gateway assembly and hot reload
//!
//! Everything derived from the runtime configuration lives in one
//! immutable [`GatewaySnapshot`]. Requests grab an `Arc` to the current
//! snapshot and keep using it even if an admin reload swaps in a new one
//! mid-flight. A failed reload leaves the current snapshot untouched.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_graphql::dynamic::Schema;
use parking_lot::RwLock;
use sqlx::SqlitePool;
use tracing::{error, info};

use crate::auth::AuthorizationResolver;
use crate::config::RuntimeConfig;
use crate::engine::QueryEngine;
use crate::metadata::{introspect, MetadataProvider};
use crate::schema::edm::EdmModel;
use crate::schema::{build_plans, build_schema, EntityPlan, ResolverServices};

/// One fully built generation of the gateway.
pub struct GatewaySnapshot {
    pub config: Arc<RuntimeConfig>,
    pub services: Arc<ResolverServices>,
    pub schema: Schema,
}

impl GatewaySnapshot {
    /// Introspect the database and build all derived structures for `config`.
    pub async fn build(config: RuntimeConfig, pool: SqlitePool) -> Result<Self> {
        let database_type = config.data_source.database_type;
        let objects = introspect::discover(&pool, &config)
            .await
            .context("database introspection failed")?;
        let provider = Arc::new(
            MetadataProvider::build(&config, objects)
                .context("metadata validation failed")?,
        );
        let authorizer = Arc::new(
            AuthorizationResolver::build(&config, &provider)
                .context("permission resolution failed")?,
        );
        let edm = Arc::new(EdmModel::build(&provider).context("model generation failed")?);
        let plans = build_plans(&config, &provider, &authorizer)
            .context("entity plan generation failed")?;

        let engine = Arc::new(QueryEngine::new(pool, database_type));
        let services = Arc::new(ResolverServices {
            provider,
            authorizer,
            edm,
            engine,
            plans,
        });
        let schema =
            build_schema(services.clone()).context("dynamic schema construction failed")?;

        info!(
            entities = config.entities.len(),
            "gateway snapshot built"
        );
        Ok(Self {
            config: Arc::new(config),
            services,
            schema,
        })
    }

    pub fn plans(&self) -> &HashMap<String, Arc<EntityPlan>> {
        &self.services.plans
    }
}

/// Shared handle the HTTP layer holds on to.
pub struct Gateway {
    config_path: String,
    pool: SqlitePool,
    current: RwLock<Arc<GatewaySnapshot>>,
}

impl Gateway {
    /// Build the first snapshot. Startup fails if the configuration or the
    /// database it points at is invalid.
    pub async fn initialize(config_path: &str, pool: SqlitePool) -> Result<Self> {
        let config = RuntimeConfig::from_file(config_path)?;
        let snapshot = GatewaySnapshot::build(config, pool.clone()).await?;
        Ok(Self {
            config_path: config_path.to_string(),
            pool,
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// The snapshot serving requests right now.
    pub fn snapshot(&self) -> Arc<GatewaySnapshot> {
        self.current.read().clone()
    }

    /// Re-read the configuration file and swap in a new snapshot.
    ///
    /// On any error the previous snapshot keeps serving.
    pub async fn reload(&self) -> Result<()> {
        let config = RuntimeConfig::from_file(&self.config_path)?;
        match GatewaySnapshot::build(config, self.pool.clone()).await {
            Ok(snapshot) => {
                *self.current.write() = Arc::new(snapshot);
                info!("runtime configuration reloaded");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "configuration reload failed, keeping previous snapshot");
                Err(err)
            }
        }
    }
}
