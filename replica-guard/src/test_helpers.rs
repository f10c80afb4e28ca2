//! Test helpers: an in-memory connector backed by two DataFusion sessions.
//!
//! The source session holds tables under their bare names. The destination
//! session registers them under a dataset schema (`raw_local.accounts`), the
//! way the embedded warehouse does.

use crate::backend::{BackendConnector, EmbeddedBackend, QueryBackend};
use crate::environment::{BackendKind, Environment};
use crate::error::{GuardError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use datafusion::prelude::{SessionConfig, SessionContext};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A session with `information_schema` enabled for the freshness column lookup.
pub fn session() -> SessionContext {
    SessionContext::new_with_config(SessionConfig::new().with_information_schema(true))
}

/// Runs a statement to completion, panicking with the SQL on failure.
pub async fn exec(ctx: &SessionContext, sql: &str) {
    ctx.sql(sql)
        .await
        .unwrap_or_else(|e| panic!("planning '{sql}': {e}"))
        .collect()
        .await
        .unwrap_or_else(|e| panic!("executing '{sql}': {e}"));
}

/// A `TIMESTAMP` literal for `ts`, truncated to whole seconds.
pub fn timestamp_sql(ts: DateTime<Utc>) -> String {
    format!("CAST('{}' AS TIMESTAMP)", ts.format("%Y-%m-%dT%H:%M:%S"))
}

/// Connector over two in-process sessions that counts destination connects.
pub struct SessionConnector {
    pub source: SessionContext,
    pub destination: SessionContext,
    pub dataset: String,
    destination_reachable: bool,
    destination_connects: AtomicUsize,
}

impl SessionConnector {
    /// Creates both sessions and the `dataset` schema on the destination.
    pub async fn new(dataset: &str) -> Self {
        let destination = session();
        exec(&destination, &format!("CREATE SCHEMA {dataset}")).await;
        Self {
            source: session(),
            destination,
            dataset: dataset.to_string(),
            destination_reachable: true,
            destination_connects: AtomicUsize::new(0),
        }
    }

    /// A connector whose destination cannot be reached.
    pub fn unreachable_destination() -> Self {
        Self {
            source: session(),
            destination: session(),
            dataset: String::new(),
            destination_reachable: false,
            destination_connects: AtomicUsize::new(0),
        }
    }

    /// Number of destination connections attempted so far.
    pub fn connects(&self) -> usize {
        self.destination_connects.load(Ordering::SeqCst)
    }

    pub async fn source_sql(&self, sql: &str) {
        exec(&self.source, sql).await;
    }

    pub async fn destination_sql(&self, sql: &str) {
        exec(&self.destination, sql).await;
    }

    /// Creates the same table on both sides from a VALUES list.
    pub async fn replicate(&self, table: &str, columns: &str, values: &str) {
        self.source_table(table, columns, values).await;
        self.destination_table(table, columns, values).await;
    }

    pub async fn source_table(&self, table: &str, columns: &str, values: &str) {
        exec(&self.source, &table_sql(table, columns, values)).await;
    }

    pub async fn destination_table(&self, table: &str, columns: &str, values: &str) {
        let qualified = format!("{}.{table}", self.dataset);
        exec(&self.destination, &table_sql(&qualified, columns, values)).await;
    }
}

/// `CREATE TABLE t AS SELECT column1 AS a, column2 AS b FROM (VALUES ...)`
fn table_sql(table: &str, columns: &str, values: &str) -> String {
    let projection = columns
        .split(',')
        .enumerate()
        .map(|(i, name)| format!("column{} AS {}", i + 1, name.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {table} AS SELECT {projection} FROM (VALUES {values})")
}

#[async_trait]
impl BackendConnector for SessionConnector {
    async fn connect_source(&self, _env: Environment) -> Result<Box<dyn QueryBackend>> {
        Ok(Box::new(EmbeddedBackend::from_context(self.source.clone())))
    }

    async fn connect_destination(&self, _env: Environment) -> Result<Box<dyn QueryBackend>> {
        self.destination_connects.fetch_add(1, Ordering::SeqCst);
        if !self.destination_reachable {
            return Err(GuardError::connection(
                BackendKind::Embedded.to_string(),
                "destination unreachable",
            ));
        }
        Ok(Box::new(EmbeddedBackend::from_context(
            self.destination.clone(),
        )))
    }
}
