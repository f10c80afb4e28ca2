//! The validation engine.
//!
//! [`ValidationEngine`] ties a [`BackendConnector`] to the schema catalog and
//! check settings and exposes one method per check kind plus [`run`] for a
//! full report.
//!
//! [`run`]: ValidationEngine::run

use crate::backend::BackendConnector;
use crate::catalog::SchemaCatalog;
use crate::config::{CheckSettings, ConfiguredConnector, DatasetNames, ValidationConfig};
use crate::environment::Environment;
use crate::error::Result;
use crate::logging::LogConfig;
use crate::result::{CheckKind, CheckSection, QualityReport, ReferentialResults, TableResults};
use crate::validators::{self, ValidationContext};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Runs replica quality checks for one deployment.
///
/// # Examples
///
/// ```rust,ignore
/// use replica_guard::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let config = Arc::new(ValidationConfig::load("replica-guard.toml")?);
/// let engine = ValidationEngine::from_config(config)?;
///
/// let tables = vec!["accounts".to_string(), "contents".to_string()];
/// let report = engine
///     .run(Environment::Staging, Some(&tables), &CheckKind::ALL)
///     .await?;
/// assert!(!report.has_errors());
/// # Ok(())
/// # }
/// ```
pub struct ValidationEngine {
    connector: Arc<dyn BackendConnector>,
    catalog: SchemaCatalog,
    datasets: DatasetNames,
    settings: CheckSettings,
    log: LogConfig,
}

impl std::fmt::Debug for ValidationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationEngine")
            .field("catalog", &self.catalog)
            .field("datasets", &self.datasets)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ValidationEngine {
    /// Creates a builder around a connector.
    pub fn builder(connector: Arc<dyn BackendConnector>) -> ValidationEngineBuilder {
        ValidationEngineBuilder::new(connector)
    }

    /// Builds an engine from configuration, loading the schema document.
    ///
    /// Fails if the schema document cannot be read or parsed.
    pub fn from_config(config: Arc<ValidationConfig>) -> Result<Self> {
        let catalog = SchemaCatalog::load(&config.schema_path, config.relations.clone())?;
        Ok(Self::builder(Arc::new(ConfiguredConnector::new(config.clone())))
            .catalog(catalog)
            .datasets(config.datasets.clone())
            .settings(config.checks.clone())
            .build())
    }

    /// Replaces the query logging configuration.
    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    fn context(&self) -> ValidationContext<'_> {
        ValidationContext {
            connector: self.connector.as_ref(),
            catalog: &self.catalog,
            datasets: &self.datasets,
            settings: &self.settings,
            log: &self.log,
        }
    }

    /// Row-count parity per table.
    pub async fn validate_counts(
        &self,
        env: Environment,
        tables: Option<&[String]>,
    ) -> Result<TableResults> {
        match requested(CheckKind::Count, tables) {
            Some(tables) => validators::validate_counts(&self.context(), env, tables).await,
            None => Ok(TableResults::new()),
        }
    }

    /// Duplicate primary keys per table.
    pub async fn validate_duplicates(
        &self,
        env: Environment,
        tables: Option<&[String]>,
    ) -> Result<TableResults> {
        match requested(CheckKind::Duplicates, tables) {
            Some(tables) => validators::validate_duplicates(&self.context(), env, tables).await,
            None => Ok(TableResults::new()),
        }
    }

    /// Orphaned foreign keys per table and edge.
    pub async fn validate_referential_integrity(
        &self,
        env: Environment,
        tables: Option<&[String]>,
    ) -> Result<ReferentialResults> {
        match requested(CheckKind::ReferentialIntegrity, tables) {
            Some(tables) => {
                validators::validate_referential_integrity(&self.context(), env, tables).await
            }
            None => Ok(ReferentialResults::new()),
        }
    }

    /// Newest update per table against the lookback window.
    pub async fn validate_freshness(
        &self,
        env: Environment,
        tables: Option<&[String]>,
    ) -> Result<TableResults> {
        match requested(CheckKind::Freshness, tables) {
            Some(tables) => validators::validate_freshness(&self.context(), env, tables).await,
            None => Ok(TableResults::new()),
        }
    }

    /// Runs the selected checks and collects a report.
    ///
    /// Checks always run in the order count, duplicates, referential
    /// integrity, freshness, regardless of the order in `checks`.
    #[instrument(skip_all, fields(env = %env, checks = checks.len()))]
    pub async fn run(
        &self,
        env: Environment,
        tables: Option<&[String]>,
        checks: &[CheckKind],
    ) -> Result<QualityReport> {
        let start = Instant::now();
        let mut report = QualityReport::new(env);

        for kind in CheckKind::ALL.into_iter().filter(|k| checks.contains(k)) {
            let section = match kind {
                CheckKind::Count => CheckSection::Count(self.validate_counts(env, tables).await?),
                CheckKind::Duplicates => {
                    CheckSection::Duplicates(self.validate_duplicates(env, tables).await?)
                }
                CheckKind::ReferentialIntegrity => CheckSection::ReferentialIntegrity(
                    self.validate_referential_integrity(env, tables).await?,
                ),
                CheckKind::Freshness => {
                    CheckSection::Freshness(self.validate_freshness(env, tables).await?)
                }
            };
            report.push(section);
        }

        let tally = report.tally();
        info!(
            ok = tally.ok,
            warning = tally.warning,
            error = tally.error,
            skip = tally.skip,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "validation run complete"
        );
        Ok(report)
    }
}

/// The engine never guesses a table universe.
fn requested(kind: CheckKind, tables: Option<&[String]>) -> Option<&[String]> {
    if tables.is_none() {
        warn!(check = %kind, "no tables requested; nothing to validate");
    }
    tables
}

/// Builder for constructing [`ValidationEngine`] instances.
pub struct ValidationEngineBuilder {
    connector: Arc<dyn BackendConnector>,
    catalog: SchemaCatalog,
    datasets: DatasetNames,
    settings: CheckSettings,
    log: LogConfig,
}

impl ValidationEngineBuilder {
    pub fn new(connector: Arc<dyn BackendConnector>) -> Self {
        Self {
            connector,
            catalog: SchemaCatalog::default(),
            datasets: DatasetNames::default(),
            settings: CheckSettings::default(),
            log: LogConfig::default(),
        }
    }

    pub fn catalog(mut self, catalog: SchemaCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn datasets(mut self, datasets: DatasetNames) -> Self {
        self.datasets = datasets;
        self
    }

    pub fn settings(mut self, settings: CheckSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets how much query text is logged.
    pub fn log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    pub fn build(self) -> ValidationEngine {
        ValidationEngine {
            connector: self.connector,
            catalog: self.catalog,
            datasets: self.datasets,
            settings: self.settings,
            log: self.log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RelationMap;
    use crate::test_helpers::SessionConnector;

    #[tokio::test]
    async fn test_absent_table_list_yields_empty_results_without_connecting() -> Result<()> {
        let connector = Arc::new(SessionConnector::unreachable_destination());
        let engine = ValidationEngine::builder(connector.clone()).build();

        assert!(engine.validate_counts(Environment::Local, None).await?.is_empty());
        assert!(engine
            .validate_referential_integrity(Environment::Local, None)
            .await?
            .is_empty());

        let report = engine.run(Environment::Local, None, &CheckKind::ALL).await?;
        assert_eq!(report.sections.len(), 4);
        assert_eq!(report.tally().total(), 0);
        assert_eq!(connector.connects(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_run_uses_fixed_order() -> Result<()> {
        let connector = Arc::new(SessionConnector::new("raw_local").await);
        connector.source_sql("CREATE TABLE accounts AS VALUES (1)").await;
        connector
            .destination_sql("CREATE TABLE raw_local.accounts AS VALUES (1)")
            .await;

        let engine = ValidationEngine::builder(connector)
            .catalog(SchemaCatalog::from_parts(Default::default(), RelationMap::new()))
            .build();
        let tables = vec!["accounts".to_string()];
        let report = engine
            .run(
                Environment::Local,
                Some(&tables),
                &[CheckKind::Freshness, CheckKind::Count],
            )
            .await?;

        let kinds: Vec<_> = report.sections.iter().map(CheckSection::kind).collect();
        assert_eq!(kinds, vec![CheckKind::Count, CheckKind::Freshness]);
        Ok(())
    }
}
