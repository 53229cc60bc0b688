//! SurrealDB connection setup
//!
//! Resolves where the judging database lives:
//! - SurrealDB Cloud / remote server with credentials (`CloudConfig`)
//! - an explicit `SURREALDB_URL`
//! - otherwise a local `surrealkv://` directory
//!
//! Every path selects the namespace/database and runs schema migrations
//! before returning.

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

use crate::error::StateError;
use crate::migrations;
use crate::Result;

/// Default namespace for judging data
pub const DEFAULT_NAMESPACE: &str = "awards";
/// Default database for judging data
pub const DEFAULT_DATABASE: &str = "judging";
/// Local persistence directory used when nothing else is configured
pub const DEFAULT_LOCAL_PATH: &str = ".awards/db";

/// Configuration for an authenticated SurrealDB connection
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// WebSocket endpoint URL (e.g., "wss://xxx.aws-use1.surrealdb.cloud")
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

impl CloudConfig {
    /// Create from environment variables
    ///
    /// Reads:
    /// - SURREALDB_ENDPOINT (required)
    /// - SURREALDB_USERNAME (required)
    /// - SURREALDB_PASSWORD (required)
    /// - SURREALDB_NAMESPACE (optional, default: "awards")
    /// - SURREALDB_DATABASE (optional, default: "judging")
    /// - SURREALDB_ROOT (optional, default: "false")
    pub fn from_env() -> std::result::Result<Self, String> {
        let endpoint =
            std::env::var("SURREALDB_ENDPOINT").map_err(|_| "SURREALDB_ENDPOINT not set")?;
        let username =
            std::env::var("SURREALDB_USERNAME").map_err(|_| "SURREALDB_USERNAME not set")?;
        let password =
            std::env::var("SURREALDB_PASSWORD").map_err(|_| "SURREALDB_PASSWORD not set")?;
        let namespace = std::env::var("SURREALDB_NAMESPACE")
            .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());
        let database =
            std::env::var("SURREALDB_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.to_string());
        let is_root = std::env::var("SURREALDB_ROOT")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

/// Connect to `url` without credentials, select the default ns/db and migrate.
#[instrument]
pub async fn connect_url(url: &str) -> Result<Surreal<Any>> {
    let db = surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StateError::Connection(format!("Failed to connect to {url}: {e}")))?;

    db.use_ns(DEFAULT_NAMESPACE)
        .use_db(DEFAULT_DATABASE)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    migrations::init_schema(&db).await?;
    Ok(db)
}

/// Connect with credentials, select the configured ns/db and migrate.
#[instrument(
    skip(config),
    fields(
        endpoint = %config.endpoint,
        namespace = %config.namespace,
        database = %config.database
    )
)]
pub async fn connect_cloud(config: &CloudConfig) -> Result<Surreal<Any>> {
    info!("Connecting to SurrealDB (root={})", config.is_root);

    let db = surrealdb::engine::any::connect(&config.endpoint)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
        })?;

    if config.is_root {
        db.signin(Root {
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Root authentication failed: {e}")))?;
    } else {
        db.signin(Database {
            namespace: &config.namespace,
            database: &config.database,
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Database authentication failed: {e}")))?;
    }

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to select namespace/database: {e}"))
        })?;

    migrations::init_schema(&db).await?;
    Ok(db)
}

/// Resolve the connection from the environment.
///
/// Cloud credentials win, then `SURREALDB_URL`, then local `surrealkv://`
/// persistence under [`DEFAULT_LOCAL_PATH`].
#[instrument(skip_all)]
pub async fn connect_from_env() -> Result<Surreal<Any>> {
    if let Ok(config) = CloudConfig::from_env() {
        info!("Cloud config found, connecting to SurrealDB Cloud");
        return connect_cloud(&config).await;
    }

    if let Ok(url) = std::env::var("SURREALDB_URL") {
        info!("SURREALDB_URL found, connecting to {}", url);
        return connect_url(&url).await;
    }

    std::fs::create_dir_all(DEFAULT_LOCAL_PATH).map_err(|e| {
        StateError::Connection(format!(
            "Failed to create database directory {DEFAULT_LOCAL_PATH}: {e}"
        ))
    })?;
    let url = format!("surrealkv://{DEFAULT_LOCAL_PATH}");
    info!("No cloud config or SURREALDB_URL found, using local persistence: {}", url);
    connect_url(&url).await
}
