//! Application configuration management

pub mod runtime;

use std::env;

use anyhow::{Context, Result};

pub use runtime::{
    ActionConfig, Cardinality, DataSourceConfig, DatabaseType, EntityConfig, EntitySource,
    FieldsConfig, Operation, PermissionConfig, PolicyConfig, RelationshipConfig, RuntimeConfig,
    SourceKind,
};

/// Process-level configuration loaded from environment variables.
///
/// The declarative entity configuration lives in a separate JSON file
/// (see [`runtime::RuntimeConfig`]) and can be reloaded without a restart;
/// everything here is fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Path to the runtime (entity/permission) configuration file
    pub runtime_config_path: String,

    /// Database URL or path (SQLite)
    pub database_url: String,

    /// JWT secret for bearer token verification
    pub jwt_secret: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // For SQLite, prefer DATABASE_PATH, fall back to DATABASE_URL
        let database_url = env::var("DATABASE_PATH")
            .or_else(|_| env::var("DATABASE_URL"))
            .unwrap_or_else(|_| "./data/datagate.db".to_string());

        // JWT_SECRET is always required - generate a random one if not provided in dev
        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            use std::collections::hash_map::DefaultHasher;
            use std::hash::{Hash, Hasher};
            let mut hasher = DefaultHasher::new();
            std::time::SystemTime::now().hash(&mut hasher);
            format!("dev-secret-{}", hasher.finish())
        });

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .context("Invalid PORT")?,

            runtime_config_path: env::var("DATAGATE_CONFIG")
                .unwrap_or_else(|_| "./datagate-config.json".to_string()),

            database_url,

            jwt_secret,
        })
    }
}
