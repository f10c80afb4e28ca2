//! PostgreSQL source backend.

use super::{QueryBackend, Row, Value};
use crate::environment::BackendKind;
use crate::error::{GuardError, Result};
use crate::security::{SecureString, SqlSecurity};
use async_trait::async_trait;
use std::time::Duration;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};
use tracing::{debug, instrument, warn};

/// Connection parameters for the transactional source.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: SecureString,
    /// Schema placed first on the `search_path`
    pub schema: Option<String>,
    pub connect_timeout: Duration,
}

impl PostgresConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
        password: SecureString,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            username: username.into(),
            password,
            schema: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

/// A live connection to the source database.
///
/// Queries use the simple-query protocol, so every non-null value comes back
/// as [`Value::Text`]. Callers convert with [`Value::as_i64`] and friends.
pub struct PostgresBackend {
    client: Option<Client>,
    database: String,
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("database", &self.database)
            .field("open", &self.client.is_some())
            .finish()
    }
}

impl PostgresBackend {
    /// Connects and spawns the connection task on the current runtime.
    #[instrument(skip(config), fields(host = %config.host, database = %config.database))]
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .user(&config.username)
            .password(config.password.expose())
            .application_name("replica-guard")
            .connect_timeout(config.connect_timeout);

        let (client, connection) = pg.connect(NoTls).await.map_err(|e| {
            GuardError::connection_with_source(
                BackendKind::Postgres.to_string(),
                format!(
                    "cannot reach {}:{}/{}",
                    config.host, config.port, config.database
                ),
                Box::new(e),
            )
        })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "PostgreSQL connection terminated with error");
            }
        });

        if let Some(schema) = &config.schema {
            SqlSecurity::validate_identifier(schema)?;
            client
                .batch_execute(&format!("SET search_path TO {schema}"))
                .await
                .map_err(|e| {
                    GuardError::connection_with_source(
                        BackendKind::Postgres.to_string(),
                        format!("cannot select schema '{schema}'"),
                        Box::new(e),
                    )
                })?;
        }

        debug!("connected to source");
        Ok(Self {
            client: Some(client),
            database: config.database.clone(),
        })
    }
}

#[async_trait]
impl QueryBackend for PostgresBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn query_rows(&self, sql: &str) -> Result<Vec<Row>> {
        let client = self.client.as_ref().ok_or_else(|| {
            GuardError::query(BackendKind::Postgres.to_string(), "connection already closed")
        })?;

        let messages = client.simple_query(sql).await?;
        let mut rows = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                let values = (0..row.len())
                    .map(|idx| match row.get(idx) {
                        Some(text) => Value::Text(text.to_string()),
                        None => Value::Null,
                    })
                    .collect();
                rows.push(values);
            }
        }
        Ok(rows)
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the client ends the spawned connection task.
        self.client.take();
        Ok(())
    }
}

impl Drop for PostgresBackend {
    fn drop(&mut self) {
        if self.client.is_some() {
            warn!(database = %self.database, "source connection dropped without being closed");
        }
    }
}
