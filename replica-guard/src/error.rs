//! Error types for replica-guard.
//!
//! Every fallible operation in the crate returns [`GuardError`]. Only a few
//! variants are fatal for a validation run (connections, configuration and
//! the schema document); everything raised while checking a single table is
//! caught by the validators and turned into an `ERROR` result.

use thiserror::Error;

/// The main error type for replica-guard.
#[derive(Error, Debug)]
pub enum GuardError {
    /// A source or destination connection could not be established.
    #[error("Connection to {backend} failed: {message}")]
    Connection {
        /// Backend being connected to (e.g. "PostgreSQL", "DataFusion", "Trino")
        backend: String,
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A query was accepted by the backend but failed to execute.
    #[error("Query failed on {backend}: {message}")]
    Query {
        /// Backend that executed the query
        backend: String,
        /// Detailed error message
        message: String,
    },

    /// The distributed query service did not finish within the allowed wait.
    #[error("Query {query_id} did not complete within {waited_secs}s")]
    QueryTimeout { query_id: String, waited_secs: u64 },

    /// The schema document is missing or malformed.
    #[error("Schema catalog error: {0}")]
    SchemaCatalog(String),

    /// Error related to configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Security-related error (rejected identifiers).
    #[error("Security error: {0}")]
    Security(String),

    /// Error from DataFusion operations.
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error from the PostgreSQL driver.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Error from the HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A value returned by a backend could not be interpreted.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, GuardError>`.
pub type Result<T> = std::result::Result<T, GuardError>;

impl GuardError {
    /// Creates a connection error without an underlying source.
    pub fn connection(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            backend: backend.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a connection error that keeps the underlying cause.
    pub fn connection_with_source(
        backend: impl Into<String>,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Connection {
            backend: backend.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a query error.
    pub fn query(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error must abort the whole validation run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GuardError::Connection { .. }
                | GuardError::SchemaCatalog(_)
                | GuardError::Configuration(_)
        )
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<GuardError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| match e.into() {
            GuardError::Internal(inner) => GuardError::Internal(format!("{msg}: {inner}")),
            other => GuardError::Internal(format!("{msg}: {other}")),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let msg = f();
            match e.into() {
                GuardError::Internal(inner) => GuardError::Internal(format!("{msg}: {inner}")),
                other => GuardError::Internal(format!("{msg}: {other}")),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_connection_error() {
        let err = GuardError::connection("PostgreSQL", "connection refused");
        assert_eq!(
            err.to_string(),
            "Connection to PostgreSQL failed: connection refused"
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_connection_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory");
        let err = GuardError::connection_with_source(
            "DataFusion",
            "warehouse directory missing",
            Box::new(source),
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_query_errors_are_not_fatal() {
        assert!(!GuardError::query("Trino", "table not found").is_fatal());
        assert!(!GuardError::QueryTimeout {
            query_id: "q1".to_string(),
            waited_secs: 600
        }
        .is_fatal());
        assert!(GuardError::SchemaCatalog("missing".to_string()).is_fatal());
    }

    #[test]
    fn test_timeout_message() {
        let err = GuardError::QueryTimeout {
            query_id: "20240101_abc".to_string(),
            waited_secs: 30,
        };
        assert_eq!(
            err.to_string(),
            "Query 20240101_abc did not complete within 30s"
        );
    }

    #[test]
    fn test_error_context() {
        fn failing_operation() -> Result<()> {
            Err(GuardError::Internal("Something went wrong".to_string()))
        }

        let result = failing_operation().context("While counting rows");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("While counting rows"));
        assert!(err.to_string().contains("Something went wrong"));
    }
}
