//! Distributed query service backend.
//!
//! Speaks the Trino client REST protocol: a statement is submitted with
//! `POST /v1/statement`, then the client follows `nextUri` until the
//! service stops returning one. Result pages may arrive on any response, so
//! columns and data are accumulated across the whole exchange.

use super::{parse_timestamp, QueryBackend, Row, Value};
use crate::environment::BackendKind;
use crate::error::{GuardError, Result};
use crate::security::SecureString;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(600);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the distributed query service.
#[derive(Debug, Clone)]
pub struct DistributedConfig {
    /// Base URL, e.g. `https://trino.example.net`
    pub endpoint: String,
    /// Value of the `X-Trino-User` header
    pub user: String,
    /// Enables HTTP basic authentication when set
    pub password: Option<SecureString>,
    /// Catalog the dataset lives in
    pub catalog: String,
    /// Default schema; the environment's dataset
    pub schema: String,
    /// Delay between polls of `nextUri`
    pub poll_interval: Duration,
    /// Upper bound on the whole exchange for one statement
    pub max_wait: Duration,
    /// Timeout for each individual HTTP request
    pub request_timeout: Duration,
}

impl DistributedConfig {
    pub fn new(
        endpoint: impl Into<String>,
        user: impl Into<String>,
        catalog: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            user: user.into(),
            password: None,
            catalog: catalog.into(),
            schema: schema.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_password(mut self, password: SecureString) -> Self {
        self.password = Some(password);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}

/// Execution state reported in `stats.state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Queued,
    WaitingForResources,
    Dispatching,
    Planning,
    Starting,
    Running,
    Finishing,
    Finished,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResults {
    id: String,
    next_uri: Option<String>,
    columns: Option<Vec<Column>>,
    data: Option<Vec<Vec<serde_json::Value>>>,
    stats: Option<QueryStats>,
    error: Option<QueryFailure>,
}

#[derive(Debug, Clone, Deserialize)]
struct Column {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
}

#[derive(Debug, Deserialize)]
struct QueryStats {
    state: QueryState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryFailure {
    message: String,
    error_name: Option<String>,
}

/// HTTP client for a Trino-compatible service.
pub struct DistributedBackend {
    config: DistributedConfig,
    client: Client,
    closed: bool,
}

impl std::fmt::Debug for DistributedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedBackend")
            .field("endpoint", &self.config.endpoint)
            .field("catalog", &self.config.catalog)
            .field("schema", &self.config.schema)
            .field("closed", &self.closed)
            .finish()
    }
}

impl DistributedBackend {
    /// Creates the HTTP client and checks that the service answers.
    ///
    /// `GET /v1/info` is sent once with the session headers, so an
    /// unreachable endpoint or rejected credentials fail here as a
    /// connection error rather than later as a per-table query error.
    pub async fn connect(config: DistributedConfig) -> Result<Self> {
        reqwest::Url::parse(&config.endpoint).map_err(|e| {
            GuardError::connection_with_source(
                BackendKind::Distributed.to_string(),
                format!("invalid endpoint '{}'", config.endpoint),
                Box::new(e),
            )
        })?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                GuardError::connection_with_source(
                    BackendKind::Distributed.to_string(),
                    "failed to create HTTP client",
                    Box::new(e),
                )
            })?;

        let mut backend = Self {
            config,
            client,
            closed: false,
        };
        if let Err(e) = backend.ping().await {
            backend.closed = true;
            return Err(e);
        }
        debug!(endpoint = %backend.config.endpoint, "connected to query service");
        Ok(backend)
    }

    async fn ping(&self) -> Result<()> {
        let url = format!("{}/v1/info", self.config.endpoint.trim_end_matches('/'));
        let response = self
            .with_headers(self.client.get(&url))
            .send()
            .await
            .map_err(|e| {
                GuardError::connection_with_source(
                    BackendKind::Distributed.to_string(),
                    format!("cannot reach {}", self.config.endpoint),
                    Box::new(e),
                )
            })?;

        let status = response.status();
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GuardError::connection(
                BackendKind::Distributed.to_string(),
                format!("authentication rejected for user '{}' (HTTP {status})", self.config.user),
            )),
            _ => Err(GuardError::connection(
                BackendKind::Distributed.to_string(),
                format!("service check failed with HTTP {status}"),
            )),
        }
    }

    fn with_headers(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .header("X-Trino-User", &self.config.user)
            .header("X-Trino-Catalog", &self.config.catalog)
            .header("X-Trino-Schema", &self.config.schema);
        match &self.config.password {
            Some(password) if !password.is_empty() => {
                request.basic_auth(&self.config.user, Some(password.expose()))
            }
            _ => request,
        }
    }

    #[instrument(skip(self, sql), fields(endpoint = %self.config.endpoint))]
    async fn run_statement(&self, sql: &str) -> Result<Vec<Row>> {
        let started = Instant::now();
        let url = format!("{}/v1/statement", self.config.endpoint.trim_end_matches('/'));

        let mut page = self
            .fetch(started, None, || {
                self.with_headers(self.client.post(&url)).body(sql.to_string())
            })
            .await?;
        debug!(query_id = %page.id, "statement submitted");

        let mut columns: Option<Vec<Column>> = None;
        let mut rows = Vec::new();

        loop {
            if let Some(failure) = page.error.take() {
                let name = failure.error_name.unwrap_or_else(|| "QUERY_FAILED".to_string());
                return Err(GuardError::query(
                    BackendKind::Distributed.to_string(),
                    format!("{name}: {}", failure.message),
                ));
            }
            if page.stats.as_ref().map(|s| s.state) == Some(QueryState::Failed) {
                return Err(GuardError::query(
                    BackendKind::Distributed.to_string(),
                    format!("query {} failed", page.id),
                ));
            }

            if columns.is_none() {
                columns = page.columns.take();
            }
            if let Some(data) = page.data.take() {
                let cols = columns.as_deref().ok_or_else(|| {
                    GuardError::query(
                        BackendKind::Distributed.to_string(),
                        "result data arrived before column metadata",
                    )
                })?;
                for raw in data {
                    rows.push(convert_row(cols, raw)?);
                }
            }

            let Some(next_uri) = page.next_uri.take() else {
                break;
            };
            if started.elapsed() >= self.config.max_wait {
                self.cancel(&next_uri).await;
                return Err(GuardError::QueryTimeout {
                    query_id: page.id,
                    waited_secs: self.config.max_wait.as_secs(),
                });
            }

            tokio::time::sleep(self.config.poll_interval).await;
            let query_id = page.id.clone();
            page = self
                .fetch(started, Some(&query_id), || {
                    self.with_headers(self.client.get(&next_uri))
                })
                .await?;
        }

        debug!(rows = rows.len(), "statement finished");
        Ok(rows)
    }

    /// Sends a request, retrying while the service answers 502/503/504.
    async fn fetch<F>(&self, started: Instant, query_id: Option<&str>, build: F) -> Result<QueryResults>
    where
        F: Fn() -> RequestBuilder,
    {
        loop {
            let response = build().send().await?;
            let status = response.status();

            if status.is_success() {
                return Ok(response.json::<QueryResults>().await?);
            }

            let retryable = matches!(
                status,
                StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
            );
            if retryable && started.elapsed() < self.config.max_wait {
                debug!(%status, "service busy, retrying");
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }
            if retryable {
                return Err(GuardError::QueryTimeout {
                    query_id: query_id.unwrap_or("unsubmitted").to_string(),
                    waited_secs: self.config.max_wait.as_secs(),
                });
            }

            let body = response.text().await.unwrap_or_default();
            return Err(GuardError::query(
                BackendKind::Distributed.to_string(),
                format!("HTTP {status}: {body}"),
            ));
        }
    }

    async fn cancel(&self, next_uri: &str) {
        match self.with_headers(self.client.delete(next_uri)).send().await {
            Ok(_) => debug!("cancelled query"),
            Err(e) => warn!(error = %e, "failed to cancel query"),
        }
    }
}

#[async_trait]
impl QueryBackend for DistributedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Distributed
    }

    async fn query_rows(&self, sql: &str) -> Result<Vec<Row>> {
        if self.closed {
            return Err(GuardError::query(
                BackendKind::Distributed.to_string(),
                "connection already closed",
            ));
        }
        self.run_statement(sql).await
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

impl Drop for DistributedBackend {
    fn drop(&mut self) {
        if !self.closed {
            warn!(endpoint = %self.config.endpoint, "distributed backend dropped without being closed");
        }
    }
}

fn convert_row(columns: &[Column], raw: Vec<serde_json::Value>) -> Result<Row> {
    if raw.len() != columns.len() {
        return Err(GuardError::query(
            BackendKind::Distributed.to_string(),
            format!("row has {} values for {} columns", raw.len(), columns.len()),
        ));
    }
    columns
        .iter()
        .zip(raw)
        .map(|(column, value)| convert_value(column, value))
        .collect()
}

/// Maps one JSON cell to a [`Value`] using the column's declared type.
///
/// Timestamps, dates and decimals travel as strings on the wire.
fn convert_value(column: &Column, value: serde_json::Value) -> Result<Value> {
    use serde_json::Value as Json;

    let type_name = column.type_name.to_ascii_lowercase();
    Ok(match value {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) if type_name.starts_with("timestamp") || type_name == "date" => {
            Value::Timestamp(parse_timestamp(&s).map_err(|e| {
                GuardError::Parse(format!("column '{}': {e}", column.name))
            })?)
        }
        Json::String(s) if type_name.starts_with("decimal") => match s.parse::<f64>() {
            Ok(f) => Value::Float(f),
            Err(_) => Value::Text(s),
        },
        Json::String(s) => Value::Text(s),
        other => Value::Text(other.to_string()),
    })
}
