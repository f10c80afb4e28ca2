//! The four replica quality checks.
//!
//! Each validator opens its own connections through the context's
//! [`BackendConnector`], walks the table list in order and releases the
//! connections before returning. Connection failures abort the validator;
//! anything that goes wrong for a single table (or foreign-key edge) is
//! recorded as an `ERROR` result for that table and the loop moves on.
//!
//! The duplicate and referential checks only look at the destination. The
//! source is assumed to enforce its own primary and foreign keys.

mod count;
mod duplicates;
mod freshness;
mod referential;

pub use count::validate_counts;
pub use duplicates::validate_duplicates;
pub use freshness::{classify_freshness, validate_freshness};
pub use referential::validate_referential_integrity;

use crate::backend::{release, BackendConnector, QueryBackend, Row, Value};
use crate::catalog::SchemaCatalog;
use crate::config::{CheckSettings, DatasetNames};
use crate::environment::Environment;
use crate::error::{GuardError, Result};
use crate::logging::LogConfig;
use crate::result::ValidationResult;
use crate::security::SqlSecurity;
use tracing::{info, warn};

/// Everything a validator needs besides the environment and the table list.
#[derive(Clone, Copy)]
pub struct ValidationContext<'a> {
    pub connector: &'a dyn BackendConnector,
    pub catalog: &'a SchemaCatalog,
    pub datasets: &'a DatasetNames,
    pub settings: &'a CheckSettings,
    pub log: &'a LogConfig,
}

impl ValidationContext<'_> {
    /// `<dataset>.<table>` for the environment's destination.
    fn destination_table(&self, env: Environment, table: &str) -> Result<String> {
        SqlSecurity::qualified(&[self.datasets.for_env(env), table])
    }
}

/// Extracts the single value of a one-column aggregate row.
fn single_value(row: Option<Row>) -> Result<Value> {
    let row = row.ok_or_else(|| GuardError::Parse("query returned no rows".to_string()))?;
    row.into_iter()
        .next()
        .ok_or_else(|| GuardError::Parse("query returned an empty row".to_string()))
}

/// Like [`single_value`] for a non-negative count.
fn single_count(row: Option<Row>) -> Result<u64> {
    let count = single_value(row)?.as_i64()?;
    u64::try_from(count).map_err(|_| GuardError::Parse(format!("negative count {count}")))
}

/// Lazily opened destination handle shared across a validator's tables.
struct LazyDestination<'a> {
    connector: &'a dyn BackendConnector,
    env: Environment,
    handle: Option<Box<dyn QueryBackend>>,
}

impl<'a> LazyDestination<'a> {
    fn new(connector: &'a dyn BackendConnector, env: Environment) -> Self {
        Self {
            connector,
            env,
            handle: None,
        }
    }

    async fn get(&mut self) -> Result<&dyn QueryBackend> {
        if self.handle.is_none() {
            self.handle = Some(self.connector.connect_destination(self.env).await?);
        }
        match &self.handle {
            Some(handle) => Ok(handle.as_ref()),
            None => Err(GuardError::Internal("destination handle missing".to_string())),
        }
    }

    async fn release(self) {
        if let Some(handle) = self.handle {
            release(handle).await;
        }
    }
}

fn log_result(check: &str, table: &str, result: &ValidationResult) {
    match (&result.error, &result.message) {
        (Some(error), _) => warn!(check, table, status = %result.status, error = %error, "check failed"),
        (None, Some(message)) => info!(check, table, status = %result.status, message = %message, "check complete"),
        (None, None) => info!(check, table, status = %result.status, "check complete"),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Owns what a [`ValidationContext`] borrows besides the connector.

    use super::ValidationContext;
    use crate::backend::BackendConnector;
    use crate::catalog::SchemaCatalog;
    use crate::config::{CheckSettings, DatasetNames};
    use crate::logging::LogConfig;

    /// Owns the non-connector parts of a [`ValidationContext`].
    pub struct Fixture {
        pub catalog: SchemaCatalog,
        pub datasets: DatasetNames,
        pub settings: CheckSettings,
        pub log: LogConfig,
    }

    impl Fixture {
        pub fn new(catalog: SchemaCatalog) -> Self {
            Self {
                catalog,
                datasets: DatasetNames::default(),
                settings: CheckSettings::default(),
                log: LogConfig::verbose(),
            }
        }

        pub fn context<'a>(&'a self, connector: &'a dyn BackendConnector) -> ValidationContext<'a> {
            ValidationContext {
                connector,
                catalog: &self.catalog,
                datasets: &self.datasets,
                settings: &self.settings,
                log: &self.log,
            }
        }
    }
}
