//! Configuration loading and validation.
//!
//! Configuration is a TOML file. Passwords may be left out of the file and
//! supplied through `REPLICA_GUARD_SOURCE_PASSWORD` and
//! `REPLICA_GUARD_REMOTE_PASSWORD` instead. Relative paths are resolved
//! against the directory containing the configuration file.

mod connector;
mod types;
mod validation;

pub use connector::ConfiguredConnector;
pub use types::*;

use crate::backend::{DistributedConfig, EmbeddedConfig, PostgresConfig};
use crate::environment::Environment;
use crate::error::{GuardError, Result};
use crate::security::SecureString;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Environment variable holding the source password.
pub const SOURCE_PASSWORD_ENV: &str = "REPLICA_GUARD_SOURCE_PASSWORD";
/// Environment variable holding the distributed service password.
pub const REMOTE_PASSWORD_ENV: &str = "REPLICA_GUARD_REMOTE_PASSWORD";

impl ValidationConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GuardError::Configuration(format!("cannot read '{}': {e}", path.display()))
        })?;
        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: ValidationConfig = toml::from_str(text)
            .map_err(|e| GuardError::Configuration(format!("malformed configuration: {e}")))?;
        config.apply_env_passwords();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    fn apply_env_passwords(&mut self) {
        if self.source.password.as_ref().is_none_or(SecureString::is_empty) {
            self.source.password = env_password(SOURCE_PASSWORD_ENV);
        }
        if let Some(remote) = self.destination.remote.as_mut() {
            if remote.password.as_ref().is_none_or(SecureString::is_empty) {
                remote.password = env_password(REMOTE_PASSWORD_ENV);
            }
        }
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.schema_path.is_relative() {
            self.schema_path = base.join(&self.schema_path);
        }
        if let Some(local) = self.destination.local.as_mut() {
            if local.data_dir.is_relative() {
                local.data_dir = base.join(&local.data_dir);
            }
        }
    }

    /// Connection settings for the source.
    pub fn postgres_config(&self) -> PostgresConfig {
        let source = &self.source;
        let password = source
            .password
            .clone()
            .unwrap_or_else(|| SecureString::new(""));
        let mut config = PostgresConfig::new(
            &source.host,
            source.port,
            &source.database,
            &source.username,
            password,
        );
        if let Some(schema) = &source.schema {
            config = config.with_schema(schema);
        }
        config.connect_timeout = Duration::from_secs(source.connect_timeout_secs);
        config
    }

    /// Settings for the embedded destination, if configured.
    pub fn embedded_config(&self) -> Option<EmbeddedConfig> {
        self.destination
            .local
            .as_ref()
            .map(|local| EmbeddedConfig::new(&local.data_dir, &self.datasets.local))
    }

    /// Settings for the distributed destination of `env`, if configured.
    pub fn distributed_config(&self, env: Environment) -> Option<DistributedConfig> {
        self.destination.remote.as_ref().map(|remote| {
            let mut config = DistributedConfig::new(
                &remote.endpoint,
                &remote.user,
                &remote.catalog,
                self.datasets.for_env(env),
            )
            .with_poll_interval(Duration::from_millis(remote.poll_interval_ms))
            .with_max_wait(Duration::from_secs(remote.max_wait_secs));
            config.request_timeout = Duration::from_secs(remote.request_timeout_secs);
            config.password = remote.password.clone();
            config
        })
    }
}

/// An unset or empty variable means no password.
fn env_password(name: &str) -> Option<SecureString> {
    std::env::var(name)
        .ok()
        .map(SecureString::from)
        .filter(|password| !password.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FkRelation;
    use std::io::Write;

    const FULL: &str = r#"
schema_path = "schemas/sql_database.schema.yaml"
default_tables = ["accounts", "contents"]

[source]
host = "db.internal"
database = "app"
username = "reader"
password = "from-file"
schema = "public"

[datasets]
local = "raw_datavision_local"

[destination.local]
data_dir = "warehouse"

[destination.remote]
endpoint = "https://trino.example.net"
user = "validator"
password = "remote-secret"
max_wait_secs = 120

[checks]
freshness_lookback_hours = 24

[relations.accounts_subscription]
account_id = "accounts"
subscription_id = { table = "subscriptions", column = "id" }
"#;

    #[test]
    fn test_parse_full_config() {
        let config = ValidationConfig::from_toml(FULL).unwrap();

        assert_eq!(config.default_tables, vec!["accounts", "contents"]);
        assert_eq!(config.source.port, 5432);
        assert_eq!(config.datasets.for_env(Environment::Local), "raw_datavision_local");
        assert_eq!(config.datasets.for_env(Environment::Production), "raw_production");
        assert_eq!(config.checks.freshness_lookback_hours, 24);
        assert_eq!(config.checks.freshness_column, "updated_at");

        let edges = &config.relations["accounts_subscription"];
        assert_eq!(edges["account_id"], FkRelation::to("accounts"));
        assert_eq!(
            edges["subscription_id"],
            FkRelation::to_column("subscriptions", "id")
        );

        let remote = config.distributed_config(Environment::Staging).unwrap();
        assert_eq!(remote.schema, "raw_staging");
        assert_eq!(remote.max_wait, Duration::from_secs(120));
        assert_eq!(remote.poll_interval, Duration::from_millis(500));
        assert_eq!(remote.password.unwrap().expose(), "remote-secret");

        let source = config.postgres_config();
        assert_eq!(source.password.expose(), "from-file");
        assert_eq!(source.schema.as_deref(), Some("public"));
    }

    #[test]
    fn test_empty_password_counts_as_unset() {
        let text = FULL
            .replace("password = \"remote-secret\"", "password = \"\"")
            .replace("schema = \"public\"\n", "");
        let config = ValidationConfig::from_toml(&text).unwrap();

        let remote = config.distributed_config(Environment::Staging).unwrap();
        assert!(remote.password.as_ref().is_none_or(|p| !p.is_empty()));
        assert!(config.postgres_config().schema.is_none());
    }

    #[test]
    fn test_malformed_config_is_fatal() {
        let err = ValidationConfig::from_toml("schema_path = [").unwrap_err();
        assert!(err.is_fatal());

        let err = ValidationConfig::from_toml("schema_path = \"x.yaml\"").unwrap_err();
        assert!(err.to_string().contains("source"));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica-guard.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let config = ValidationConfig::load(&path).unwrap();
        assert_eq!(
            config.schema_path,
            dir.path().join("schemas/sql_database.schema.yaml")
        );
        assert_eq!(
            config.embedded_config().unwrap().data_dir,
            dir.path().join("warehouse")
        );
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = ValidationConfig::load("/nope/replica-guard.toml").unwrap_err();
        assert!(matches!(err, GuardError::Configuration(_)));
    }
}
