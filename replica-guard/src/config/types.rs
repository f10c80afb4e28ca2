//! Configuration type definitions.

use crate::catalog::RelationMap;
use crate::environment::Environment;
use crate::security::SecureString;
use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    /// Path to the schema document holding primary-key declarations.
    pub schema_path: PathBuf,

    /// Tables validated when the caller does not pass a list.
    #[serde(default)]
    pub default_tables: Vec<String>,

    /// Transactional source (PostgreSQL).
    pub source: SourceConfig,

    /// Dataset namespace per environment.
    #[serde(default)]
    pub datasets: DatasetNames,

    /// Destination engines.
    #[serde(default)]
    pub destination: DestinationConfig,

    /// Check tuning.
    #[serde(default)]
    pub checks: CheckSettings,

    /// Curated foreign-key table: `child -> fk column -> parent`.
    #[serde(default)]
    pub relations: RelationMap,
}

/// Source database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub username: String,

    /// Password. Falls back to `REPLICA_GUARD_SOURCE_PASSWORD`.
    #[serde(default)]
    pub password: Option<SecureString>,

    /// Schema to search first (default: the server's search path).
    #[serde(default)]
    pub schema: Option<String>,

    /// Connect timeout in seconds (default: 10).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Destination dataset (schema) name for each environment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatasetNames {
    #[serde(default = "default_local_dataset")]
    pub local: String,
    #[serde(default = "default_staging_dataset")]
    pub staging: String,
    #[serde(default = "default_production_dataset")]
    pub production: String,
}

impl Default for DatasetNames {
    fn default() -> Self {
        Self {
            local: default_local_dataset(),
            staging: default_staging_dataset(),
            production: default_production_dataset(),
        }
    }
}

impl DatasetNames {
    /// Returns the dataset the environment's destination tables live in.
    pub fn for_env(&self, env: Environment) -> &str {
        match env {
            Environment::Local => &self.local,
            Environment::Staging => &self.staging,
            Environment::Production => &self.production,
        }
    }
}

/// Destination engine settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DestinationConfig {
    /// Embedded engine, used by `local`.
    #[serde(default)]
    pub local: Option<LocalDestination>,

    /// Distributed query service, used by `staging` and `production`.
    #[serde(default)]
    pub remote: Option<RemoteDestination>,
}

/// Local warehouse location.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalDestination {
    /// Directory of Parquet data, one entry per table.
    pub data_dir: PathBuf,
}

/// Distributed query service connection.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteDestination {
    /// Base URL of the service.
    pub endpoint: String,

    /// User reported to the service.
    pub user: String,

    /// Basic-auth password. Falls back to `REPLICA_GUARD_REMOTE_PASSWORD`.
    #[serde(default)]
    pub password: Option<SecureString>,

    /// Catalog holding the datasets (default: "awsdatacatalog").
    #[serde(default = "default_catalog")]
    pub catalog: String,

    /// Delay between status polls in milliseconds (default: 500).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum time to wait for one query in seconds (default: 600).
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,

    /// Timeout of each HTTP request in seconds (default: 30).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Tuning of the individual checks.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckSettings {
    /// Column read by the freshness check (default: "updated_at").
    #[serde(default = "default_freshness_column")]
    pub freshness_column: String,

    /// Freshness window in hours (default: 48).
    #[serde(default = "default_freshness_lookback_hours")]
    pub freshness_lookback_hours: u32,

    /// Maximum number of duplicated keys listed per table (default: 100).
    #[serde(default = "default_max_reported_keys")]
    pub max_reported_keys: usize,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            freshness_column: default_freshness_column(),
            freshness_lookback_hours: default_freshness_lookback_hours(),
            max_reported_keys: default_max_reported_keys(),
        }
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_local_dataset() -> String {
    "raw_local".to_string()
}

fn default_staging_dataset() -> String {
    "raw_staging".to_string()
}

fn default_production_dataset() -> String {
    "raw_production".to_string()
}

fn default_catalog() -> String {
    "awsdatacatalog".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_wait_secs() -> u64 {
    600
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_freshness_column() -> String {
    "updated_at".to_string()
}

fn default_freshness_lookback_hours() -> u32 {
    48
}

fn default_max_reported_keys() -> usize {
    100
}
