//! Embedded DataFusion backend over the local Parquet warehouse.

use super::{rows_from_batches, QueryBackend, Row};
use crate::environment::BackendKind;
use crate::error::{GuardError, Result};
use crate::security::SqlSecurity;
use async_trait::async_trait;
use datafusion::prelude::{ParquetReadOptions, SessionConfig, SessionContext};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Location of the local warehouse.
#[derive(Debug, Clone)]
pub struct EmbeddedConfig {
    /// Directory holding one `<table>.parquet` file or `<table>/` directory per table
    pub data_dir: PathBuf,
    /// Namespace the tables are registered under
    pub dataset: String,
}

impl EmbeddedConfig {
    pub fn new(data_dir: impl Into<PathBuf>, dataset: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            dataset: dataset.into(),
        }
    }
}

/// A DataFusion session acting as the local destination.
pub struct EmbeddedBackend {
    ctx: SessionContext,
    tables: Vec<String>,
    closed: bool,
}

impl std::fmt::Debug for EmbeddedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedBackend")
            .field("tables", &self.tables)
            .field("closed", &self.closed)
            .finish()
    }
}

impl EmbeddedBackend {
    /// Opens the warehouse directory and registers every table found in it.
    ///
    /// A missing directory is a connection failure. Entries whose names are
    /// not valid identifiers are skipped with a warning.
    #[instrument(skip(config), fields(data_dir = %config.data_dir.display(), dataset = %config.dataset))]
    pub async fn open(config: &EmbeddedConfig) -> Result<Self> {
        SqlSecurity::validate_identifier(&config.dataset)?;

        if !config.data_dir.is_dir() {
            return Err(GuardError::connection(
                BackendKind::Embedded.to_string(),
                format!(
                    "warehouse directory '{}' does not exist",
                    config.data_dir.display()
                ),
            ));
        }

        let ctx = SessionContext::new_with_config(SessionConfig::new().with_information_schema(true));
        create_schema(&ctx, &config.dataset).await?;

        let mut tables = Vec::new();
        for (table, path) in discover_tables(&config.data_dir)? {
            let reference = format!("{}.{}", config.dataset, table);
            ctx.register_parquet(reference.as_str(), path_str(&path)?, ParquetReadOptions::default())
                .await
                .map_err(|e| {
                    GuardError::connection_with_source(
                        BackendKind::Embedded.to_string(),
                        format!("failed to register '{reference}'"),
                        Box::new(e),
                    )
                })?;
            debug!(table = %reference, path = %path.display(), "registered table");
            tables.push(table);
        }

        info!(tables = tables.len(), "opened local warehouse");
        Ok(Self {
            ctx,
            tables,
            closed: false,
        })
    }

    /// Wraps an existing session. Tables must already be registered.
    pub fn from_context(ctx: SessionContext) -> Self {
        Self {
            ctx,
            tables: Vec::new(),
            closed: false,
        }
    }

    /// Names of the tables registered by [`EmbeddedBackend::open`].
    pub fn tables(&self) -> &[String] {
        &self.tables
    }
}

#[async_trait]
impl QueryBackend for EmbeddedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Embedded
    }

    async fn query_rows(&self, sql: &str) -> Result<Vec<Row>> {
        if self.closed {
            return Err(GuardError::query(
                BackendKind::Embedded.to_string(),
                "connection already closed",
            ));
        }
        let batches = self.ctx.sql(sql).await?.collect().await?;
        rows_from_batches(&batches)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

impl Drop for EmbeddedBackend {
    fn drop(&mut self) {
        if !self.closed {
            warn!("embedded backend dropped without being closed");
        }
    }
}

async fn create_schema(ctx: &SessionContext, dataset: &str) -> Result<()> {
    ctx.sql(&format!("CREATE SCHEMA IF NOT EXISTS {dataset}"))
        .await?
        .collect()
        .await?;
    Ok(())
}

/// Lists `(table, path)` pairs in the warehouse, sorted by table name.
fn discover_tables(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let table = if path.is_dir() {
            path.file_name().and_then(|n| n.to_str()).map(str::to_string)
        } else if path.extension().and_then(|e| e.to_str()) == Some("parquet") {
            path.file_stem().and_then(|n| n.to_str()).map(str::to_string)
        } else {
            None
        };

        let Some(table) = table else { continue };
        if table.starts_with('.') {
            continue;
        }
        if let Err(e) = SqlSecurity::validate_identifier(&table) {
            warn!(path = %path.display(), error = %e, "skipping warehouse entry");
            continue;
        }
        found.push((table, path));
    }
    found.sort();
    Ok(found)
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| GuardError::Configuration(format!("non UTF-8 path: {}", path.display())))
}
