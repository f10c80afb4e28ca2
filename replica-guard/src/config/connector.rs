//! Connector that opens backends described by a [`ValidationConfig`].

use super::ValidationConfig;
use crate::backend::{
    BackendConnector, DistributedBackend, EmbeddedBackend, PostgresBackend, QueryBackend,
};
use crate::environment::{BackendKind, Environment};
use crate::error::{GuardError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Opens the PostgreSQL source and the environment's destination.
#[derive(Debug, Clone)]
pub struct ConfiguredConnector {
    config: Arc<ValidationConfig>,
}

impl ConfiguredConnector {
    pub fn new(config: Arc<ValidationConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BackendConnector for ConfiguredConnector {
    async fn connect_source(&self, _env: Environment) -> Result<Box<dyn QueryBackend>> {
        let backend = PostgresBackend::connect(&self.config.postgres_config()).await?;
        Ok(Box::new(backend))
    }

    async fn connect_destination(&self, env: Environment) -> Result<Box<dyn QueryBackend>> {
        match env.destination_kind() {
            BackendKind::Embedded => {
                let config = self.config.embedded_config().ok_or_else(|| {
                    GuardError::Configuration(format!(
                        "environment '{env}' needs [destination.local]"
                    ))
                })?;
                Ok(Box::new(EmbeddedBackend::open(&config).await?))
            }
            BackendKind::Distributed => {
                let config = self.config.distributed_config(env).ok_or_else(|| {
                    GuardError::Configuration(format!(
                        "environment '{env}' needs [destination.remote]"
                    ))
                })?;
                Ok(Box::new(DistributedBackend::connect(config).await?))
            }
            BackendKind::Postgres => Err(GuardError::Internal(
                "PostgreSQL is never a destination".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector(extra: &str) -> ConfiguredConnector {
        let text = format!(
            r#"
schema_path = "schema.yaml"

[source]
host = "localhost"
database = "app"
username = "reader"
{extra}
"#
        );
        ConfiguredConnector::new(Arc::new(ValidationConfig::from_toml(&text).unwrap()))
    }

    #[tokio::test]
    async fn test_missing_destination_section_is_fatal() {
        let connector = connector("");
        let err = connector
            .connect_destination(Environment::Production)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("destination.remote"));
    }

    #[tokio::test]
    async fn test_local_destination_opens_embedded_engine() {
        let dir = tempfile::tempdir().unwrap();
        let extra = format!(
            "[destination.local]\ndata_dir = {:?}\n",
            dir.path().display().to_string()
        );
        let connector = connector(&extra);
        let mut handle = connector
            .connect_destination(Environment::Local)
            .await
            .unwrap();
        assert_eq!(handle.kind(), BackendKind::Embedded);
        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_remote_destination_is_fatal() {
        let connector = connector(
            "[destination.remote]\nendpoint = \"http://127.0.0.1:1\"\nuser = \"validator\"\nrequest_timeout_secs = 2\n",
        );
        let err = connector
            .connect_destination(Environment::Staging)
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::Connection { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_remote_destination_checks_the_service() {
        let mut server = mockito::Server::new_async().await;
        let info = server
            .mock("GET", "/v1/info")
            .match_header("X-Trino-Schema", "raw_staging")
            .with_body(r#"{"starting":false}"#)
            .create_async()
            .await;
        let connector = connector(&format!(
            "[destination.remote]\nendpoint = {:?}\nuser = \"validator\"\n",
            server.url()
        ));
        let mut handle = connector
            .connect_destination(Environment::Staging)
            .await
            .unwrap();
        info.assert_async().await;
        assert_eq!(handle.kind(), BackendKind::Distributed);
        handle.close().await.unwrap();
    }
}
