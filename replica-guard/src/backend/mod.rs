//! Query backends.
//!
//! Validators talk to three engines: the transactional source (PostgreSQL),
//! the embedded DataFusion engine used as the local warehouse, and a
//! Trino-compatible distributed query service used in staging and
//! production. All three implement [`QueryBackend`], and validators only
//! ever hold `Box<dyn QueryBackend>` handles obtained from a
//! [`BackendConnector`], so a new destination engine can be added without
//! touching any validator.
//!
//! ## Handle lifecycle
//!
//! A validator opens one source handle and/or one destination handle, uses
//! them for every table in its list, and hands them back to [`release`] on
//! the way out. Per-table failures never return early from a validator, so
//! release always runs; dropping a handle that was never closed still frees
//! its resources and logs a warning.

mod distributed;
mod embedded;
mod postgres;
mod value;

pub use distributed::{DistributedBackend, DistributedConfig, QueryState};
pub use embedded::{EmbeddedBackend, EmbeddedConfig};
pub use postgres::{PostgresBackend, PostgresConfig};
pub use value::{parse_timestamp, rows_from_batches, Row, Value};

use crate::environment::{BackendKind, Environment};
use crate::error::Result;
use crate::logging::{truncate_field, LogConfig};
use async_trait::async_trait;
use std::fmt::Debug;
use tracing::{debug, instrument, warn};

/// A connection handle to one query engine.
#[async_trait]
pub trait QueryBackend: Debug + Send + Sync {
    /// Returns the kind of engine behind this handle.
    fn kind(&self) -> BackendKind;

    /// Executes a read-only query and returns every result row.
    async fn query_rows(&self, sql: &str) -> Result<Vec<Row>>;

    /// Executes a read-only query and returns its first row, if any.
    async fn query_one(&self, sql: &str) -> Result<Option<Row>> {
        Ok(self.query_rows(sql).await?.into_iter().next())
    }

    /// Releases the connection. Further queries fail.
    async fn close(&mut self) -> Result<()>;
}

/// Opens source and destination handles for an environment.
///
/// Connection failures returned from here are fatal for a validation run.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    /// Opens a handle to the transactional source.
    async fn connect_source(&self, env: Environment) -> Result<Box<dyn QueryBackend>>;

    /// Opens a handle to the destination selected by `env`.
    async fn connect_destination(&self, env: Environment) -> Result<Box<dyn QueryBackend>>;
}

/// Runs a query against a destination handle and returns the first row.
///
/// This is the only entry point validators use for destination queries, so
/// the embedded/distributed split stays invisible to them.
#[instrument(skip_all, fields(env = %env, backend = %handle.kind()))]
pub async fn execute_destination_query(
    env: Environment,
    handle: &dyn QueryBackend,
    query: &str,
    log: &LogConfig,
) -> Result<Option<Row>> {
    if log.log_queries {
        debug!(query = %truncate_field(query, log.max_field_length), "destination query");
    }
    handle.query_one(query).await
}

/// Like [`execute_destination_query`] but returns every row.
#[instrument(skip_all, fields(env = %env, backend = %handle.kind()))]
pub async fn execute_destination_query_rows(
    env: Environment,
    handle: &dyn QueryBackend,
    query: &str,
    log: &LogConfig,
) -> Result<Vec<Row>> {
    if log.log_queries {
        debug!(query = %truncate_field(query, log.max_field_length), "destination query");
    }
    handle.query_rows(query).await
}

/// Runs a query against the source handle and returns the first row.
pub async fn execute_source_query(
    handle: &dyn QueryBackend,
    query: &str,
    log: &LogConfig,
) -> Result<Option<Row>> {
    if log.log_queries {
        debug!(query = %truncate_field(query, log.max_field_length), "source query");
    }
    handle.query_one(query).await
}

/// Closes a handle, logging instead of failing if the close itself errors.
pub async fn release(mut handle: Box<dyn QueryBackend>) {
    let kind = handle.kind();
    if let Err(e) = handle.close().await {
        warn!(backend = %kind, error = %e, "failed to close connection cleanly");
    }
}
