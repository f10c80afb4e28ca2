//! Validation against a mocked distributed query service.

mod common;

use async_trait::async_trait;
use common::{catalog, SessionConnector, SCHEMA_YAML};
use mockito::{Matcher, Mock, ServerGuard};
use replica_guard::backend::{DistributedBackend, DistributedConfig};
use replica_guard::prelude::*;
use replica_guard::result::{CheckDetails, ReferentialOutcome};
use std::time::Duration;

struct ServiceConnector {
    source: SessionConnector,
    endpoint: String,
}

#[async_trait]
impl BackendConnector for ServiceConnector {
    async fn connect_source(&self, env: Environment) -> Result<Box<dyn QueryBackend>> {
        self.source.connect_source(env).await
    }

    async fn connect_destination(&self, env: Environment) -> Result<Box<dyn QueryBackend>> {
        let config = DistributedConfig::new(
            &self.endpoint,
            "validator",
            "awsdatacatalog",
            replica_guard::config::DatasetNames::default().for_env(env),
        )
        .with_poll_interval(Duration::from_millis(5))
        .with_max_wait(Duration::from_secs(5));
        Ok(Box::new(DistributedBackend::connect(config).await?))
    }
}

async fn statement(server: &mut ServerGuard, body_pattern: &str, response: &str) -> Mock {
    server
        .mock("POST", "/v1/statement")
        .match_header("X-Trino-Schema", "raw_staging")
        .match_body(Matcher::Regex(body_pattern.to_string()))
        .with_header("content-type", "application/json")
        .with_body(response)
        .create_async()
        .await
}

async fn service_info(server: &mut ServerGuard) -> Mock {
    server
        .mock("GET", "/v1/info")
        .match_header("X-Trino-User", "validator")
        .with_header("content-type", "application/json")
        .with_body(r#"{"starting":false}"#)
        .create_async()
        .await
}

fn finished(id: &str, columns: &str, data: &str) -> String {
    format!(r#"{{"id":"{id}","columns":{columns},"data":{data},"stats":{{"state":"FINISHED"}}}}"#)
}

async fn engine_for(server: &ServerGuard) -> ValidationEngine {
    let source = common::connector().await;
    source
        .source_table("accounts", "id, email", "(1, 'a'), (2, 'b'), (7, 'c')")
        .await;
    ValidationEngine::builder(Arc::new(ServiceConnector {
        source,
        endpoint: server.url(),
    }))
    .catalog(catalog())
    .build()
}

fn tables(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_counts_and_duplicates_through_the_service() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    let info = service_info(&mut server).await;
    let count = statement(
        &mut server,
        r"^SELECT COUNT\(\*\) FROM raw_staging\.accounts$",
        &finished("c1", r#"[{"name":"_col0","type":"bigint"}]"#, "[[4]]"),
    )
    .await;
    let duplicates = statement(
        &mut server,
        r"^SELECT CAST\(id AS VARCHAR\)",
        &finished(
            "d1",
            r#"[{"name":"key_value","type":"varchar"},{"name":"occurrences","type":"bigint"}]"#,
            r#"[["7", 2]]"#,
        ),
    )
    .await;

    let engine = engine_for(&server).await;
    let report = engine
        .run(
            Environment::Staging,
            Some(&tables(&["accounts"])),
            &[CheckKind::Count, CheckKind::Duplicates],
        )
        .await?;
    info.assert_async().await;
    count.assert_async().await;
    duplicates.assert_async().await;

    assert_eq!(report.environment, Environment::Staging);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["sections"][0]["results"]["accounts"]["status"], "WARNING");
    assert_eq!(json["sections"][0]["results"]["accounts"]["details"]["difference"], -1);
    assert_eq!(json["sections"][1]["results"]["accounts"]["status"], "WARNING");
    assert_eq!(
        json["sections"][1]["results"]["accounts"]["details"]["duplicate_keys"][0],
        "7"
    );
    Ok(())
}

#[tokio::test]
async fn test_service_failure_is_isolated_to_one_edge() -> Result<()> {
    let mut server = mockito::Server::new_async().await;
    service_info(&mut server).await;
    let failing = statement(
        &mut server,
        r"ON c\.account_id = p\.id",
        r#"{"id":"r1","error":{"message":"Table raw_staging.accounts does not exist","errorName":"TABLE_NOT_FOUND"},"stats":{"state":"FAILED"}}"#,
    )
    .await;
    let passing = statement(
        &mut server,
        r"ON c\.subscription_id = p\.id",
        &finished("r2", r#"[{"name":"orphan_count","type":"bigint"}]"#, "[[0]]"),
    )
    .await;

    let engine = engine_for(&server).await;
    let results = engine
        .validate_referential_integrity(
            Environment::Staging,
            Some(&tables(&["accounts_subscription", "audit_log"])),
        )
        .await?;
    failing.assert_async().await;
    passing.assert_async().await;

    let ReferentialOutcome::Edges(edges) = &results["accounts_subscription"] else {
        panic!("accounts_subscription declares relations");
    };
    assert_eq!(edges["account_id"].status, CheckStatus::Error);
    assert!(edges["account_id"]
        .error
        .as_deref()
        .unwrap()
        .contains("TABLE_NOT_FOUND"));
    assert_eq!(edges["subscription_id"].status, CheckStatus::Ok);
    assert!(matches!(
        edges["subscription_id"].details,
        Some(CheckDetails::Orphans { orphan_count: 0, .. })
    ));
    assert!(matches!(
        &results["audit_log"],
        ReferentialOutcome::Skipped(r) if r.status == CheckStatus::Skip
    ));
    Ok(())
}

#[tokio::test]
async fn test_engine_from_config_with_unreachable_service() -> Result<()> {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("schema.yaml"), SCHEMA_YAML).unwrap();
    let config_path = dir.path().join("replica-guard.toml");
    std::fs::write(
        &config_path,
        r#"
schema_path = "schema.yaml"

[source]
host = "127.0.0.1"
port = 1
database = "app"
username = "reader"

[destination.remote]
endpoint = "http://127.0.0.1:1"
user = "validator"
poll_interval_ms = 5
max_wait_secs = 2
request_timeout_secs = 2
"#,
    )
    .unwrap();

    let config = Arc::new(ValidationConfig::load(&config_path)?);
    let engine = ValidationEngine::from_config(config)?;
    assert_eq!(engine.catalog().primary_key("accounts"), Some("id"));

    let results = engine
        .validate_duplicates(Environment::Production, Some(&tables(&["audit_log"])))
        .await?;
    assert_eq!(results["audit_log"].status, CheckStatus::Skip);

    match engine
        .validate_duplicates(
            Environment::Production,
            Some(&tables(&["audit_log", "accounts"])),
        )
        .await
    {
        Err(e) => assert!(e.is_fatal(), "expected a connection error, got {e}"),
        Ok(results) => panic!("unreachable service produced results: {results:?}"),
    }

    let err = engine
        .validate_duplicates(Environment::Staging, Some(&tables(&["accounts"])))
        .await
        .unwrap_err();
    assert!(matches!(err, GuardError::Connection { .. }));
    assert!(err.is_fatal());
    Ok(())
}

#[tokio::test]
async fn test_rejected_credentials_abort_the_run() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v1/info")
        .with_status(403)
        .create_async()
        .await;
    let statements = server
        .mock("POST", "/v1/statement")
        .expect(0)
        .create_async()
        .await;

    let engine = engine_for(&server).await;
    let err = engine
        .validate_duplicates(Environment::Staging, Some(&tables(&["accounts"])))
        .await
        .unwrap_err();
    statements.assert_async().await;
    assert!(matches!(err, GuardError::Connection { .. }));
    assert!(err.is_fatal());
}
